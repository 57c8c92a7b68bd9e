//! Follow-graph and like operations.
//!
//! Follow/unfollow are strict toggles: a redundant call is a Conflict, not a
//! success. Like/unlike is a true toggle that always succeeds. The asymmetry
//! is intentional, observable API behavior.

use rusqlite::{params, TransactionBehavior};
use serde::Serialize;

use crate::db::models::{Profile, ProfileSummary};
use crate::error::{on_constraint, AppError, AppResult};
use crate::state::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeState {
    Liked,
    Unliked,
}

/// Create a follow edge from `follower_id` (user) to `profile_id`.
/// Following a profile twice is a Conflict.
pub fn follow(pool: &DbPool, follower_id: &str, profile_id: &str) -> AppResult<()> {
    let conn = pool.get()?;

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM profiles WHERE id = ?1",
        params![profile_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound);
    }

    // The UNIQUE(follower_id, following_id) index settles concurrent calls:
    // exactly one edge survives and the loser lands here.
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO follows (id, follower_id, following_id) VALUES (?1, ?2, ?3)",
        params![id, follower_id, profile_id],
    )
    .map_err(|e| {
        on_constraint(
            e,
            AppError::Conflict("You are already following this profile".into()),
        )
    })?;

    Ok(())
}

/// Remove the follow edge. Unfollowing a profile you do not follow is a
/// Conflict and leaves the edge set unchanged.
pub fn unfollow(pool: &DbPool, follower_id: &str, profile_id: &str) -> AppResult<()> {
    let conn = pool.get()?;

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM profiles WHERE id = ?1",
        params![profile_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound);
    }

    let deleted = conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
        params![follower_id, profile_id],
    )?;
    if deleted == 0 {
        return Err(AppError::Conflict(
            "You are not following this profile".into(),
        ));
    }

    Ok(())
}

/// Flip the like state of a post for a user. Existence check and mutation
/// run as one IMMEDIATE transaction so concurrent toggles cannot lose an
/// update.
pub fn like_toggle(pool: &DbPool, user_id: &str, post_id: &str) -> AppResult<LikeState> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound);
    }

    let deleted = tx.execute(
        "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
        params![post_id, user_id],
    )?;

    let state = if deleted > 0 {
        LikeState::Unliked
    } else {
        let id = uuid::Uuid::now_v7().to_string();
        tx.execute(
            "INSERT INTO likes (id, post_id, user_id) VALUES (?1, ?2, ?3)",
            params![id, post_id, user_id],
        )?;
        LikeState::Liked
    };

    tx.commit()?;
    Ok(state)
}

/// Profiles the user follows.
pub fn list_following(pool: &DbPool, follower_id: &str) -> AppResult<Vec<Profile>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT p.id, p.user_id, p.first_name, p.last_name, p.nick_name, u.email,
                p.sex, p.registered, p.bio, p.image
         FROM follows f
         JOIN profiles p ON p.id = f.following_id
         JOIN users u ON u.id = p.user_id
         WHERE f.follower_id = ?1
         ORDER BY p.last_name, p.nick_name",
    )?;
    let profiles = stmt
        .query_map(params![follower_id], Profile::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(profiles)
}

/// Profile summaries of the users following `user_id`'s profile.
/// NotFound when the user has no profile to be followed.
pub fn list_followers(pool: &DbPool, user_id: &str) -> AppResult<Vec<ProfileSummary>> {
    let conn = pool.get()?;

    let profile_id: String = conn
        .query_row(
            "SELECT id FROM profiles WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    let mut stmt = conn.prepare(
        "SELECT p.first_name, p.last_name, p.nick_name, u.email, p.image
         FROM follows f
         JOIN users u ON u.id = f.follower_id
         LEFT JOIN profiles p ON p.user_id = u.id
         WHERE f.following_id = ?1
         ORDER BY u.email",
    )?;
    let followers = stmt
        .query_map(params![profile_id], |row| {
            Ok(ProfileSummary {
                first_name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                last_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                nick_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                email: row.get(3)?,
                image: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(followers)
}
