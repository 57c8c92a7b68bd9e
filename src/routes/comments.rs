use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::db::models::Comment;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::policy::check_ownership;
use crate::state::AppState;

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, u.email, c.body, c.created_at, c.updated_at \
     FROM comments c JOIN users u ON u.id = c.user_id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/posts/{post_id}/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/posts/{post_id}/comments/{id}",
            get(get_comment)
                .patch(update_comment)
                .delete(delete_comment),
        )
}

// -- Request types --

/// A comment's post and author are fixed at creation; updates accept the
/// body and nothing else.
#[derive(Deserialize)]
pub struct CommentBody {
    pub body: String,
}

// -- Helpers --

fn ensure_post_exists(conn: &Connection, post_id: &str) -> AppResult<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

/// Looks up a comment strictly within its post scope; a valid comment id
/// under the wrong post is NotFound.
fn fetch_comment(conn: &Connection, post_id: &str, comment_id: &str) -> AppResult<Comment> {
    conn.query_row(
        &format!("{} WHERE c.post_id = ?1 AND c.id = ?2", COMMENT_SELECT),
        params![post_id, comment_id],
        Comment::from_row,
    )
    .map_err(|_| AppError::NotFound)
}

fn comment_author(conn: &Connection, post_id: &str, comment_id: &str) -> AppResult<String> {
    conn.query_row(
        "SELECT user_id FROM comments WHERE post_id = ?1 AND id = ?2",
        params![post_id, comment_id],
        |row| row.get(0),
    )
    .map_err(|_| AppError::NotFound)
}

// -- Handlers --

/// GET /posts/{post_id}/comments — newest first. A nonexistent post is
/// NotFound, not an empty list.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<Vec<Comment>>> {
    let conn = state.db.get()?;
    ensure_post_exists(&conn, &post_id)?;

    let mut stmt = conn.prepare(&format!(
        "{} WHERE c.post_id = ?1 ORDER BY c.created_at DESC, c.id DESC",
        COMMENT_SELECT
    ))?;
    let comments = stmt
        .query_map(params![post_id], Comment::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(comments))
}

/// POST /posts/{post_id}/comments — author comes from the acting identity,
/// post from the route.
pub async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<CommentBody>,
) -> AppResult<impl IntoResponse> {
    if req.body.trim().is_empty() {
        return Err(AppError::Validation("body is required".into()));
    }

    let conn = state.db.get()?;
    ensure_post_exists(&conn, &post_id)?;

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, body) VALUES (?1, ?2, ?3, ?4)",
        params![id, post_id, user.id, req.body],
    )?;

    let comment = fetch_comment(&conn, &post_id, &id)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /posts/{post_id}/comments/{id}
pub async fn get_comment(
    State(state): State<AppState>,
    Path((post_id, id)): Path<(String, String)>,
) -> AppResult<Json<Comment>> {
    let conn = state.db.get()?;
    Ok(Json(fetch_comment(&conn, &post_id, &id)?))
}

/// PATCH /posts/{post_id}/comments/{id} — author only; body only.
pub async fn update_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, id)): Path<(String, String)>,
    Json(req): Json<CommentBody>,
) -> AppResult<Json<Comment>> {
    if req.body.trim().is_empty() {
        return Err(AppError::Validation("body is required".into()));
    }

    let conn = state.db.get()?;
    let author = comment_author(&conn, &post_id, &id)?;
    check_ownership(&user, &author)?;

    conn.execute(
        "UPDATE comments SET body = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![req.body, id],
    )?;

    Ok(Json(fetch_comment(&conn, &post_id, &id)?))
}

/// DELETE /posts/{post_id}/comments/{id} — author only.
pub async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let author = comment_author(&conn, &post_id, &id)?;
    check_ownership(&user, &author)?;

    conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    Ok(StatusCode::NO_CONTENT)
}
