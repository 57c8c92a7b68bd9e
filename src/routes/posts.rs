use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::Post;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media;
use crate::policy::check_ownership;
use crate::routes::like_pattern;
use crate::routes::profiles::read_image_part;
use crate::social;
use crate::state::AppState;

/// Base post selection; like_count comes from a correlated subquery so the
/// result set never fans out.
const POST_SELECT: &str = "SELECT p.id, u.email, p.topic, p.body, p.image, p.created_at, p.updated_at, \
     (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) \
     FROM posts p JOIN users u ON u.id = p.user_id";

const POST_ORDER: &str = " ORDER BY p.updated_at DESC, p.id DESC";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/my_posts", get(my_posts).post(create_post))
        .route("/posts/following_posts", get(following_posts))
        .route("/posts/liked_posts", get(liked_posts))
        .route(
            "/posts/{id}",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/posts/{id}/image", put(upload_post_image))
        .route("/posts/{id}/like_unlike", get(like_unlike))
}

// -- Request types --

#[derive(Deserialize, Default)]
pub struct PostListQuery {
    pub hashtag: Option<String>,
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub topic: String,
    pub body: String,
}

#[derive(Deserialize, Default)]
pub struct UpdatePostRequest {
    pub topic: Option<String>,
    pub body: Option<String>,
}

// -- Helpers --

/// Fills in the liker emails for each post.
fn load_liked_by(conn: &Connection, posts: &mut [Post]) -> AppResult<()> {
    let mut stmt = conn.prepare(
        "SELECT u.email FROM likes l JOIN users u ON u.id = l.user_id
         WHERE l.post_id = ?1 ORDER BY u.email",
    )?;
    for post in posts.iter_mut() {
        post.liked_by = stmt
            .query_map(params![post.id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
    }
    Ok(())
}

fn fetch_post(conn: &Connection, post_id: &str) -> AppResult<Post> {
    let mut post = conn
        .query_row(
            &format!("{} WHERE p.id = ?1", POST_SELECT),
            params![post_id],
            Post::from_row,
        )
        .map_err(|_| AppError::NotFound)?;
    load_liked_by(conn, std::slice::from_mut(&mut post))?;
    Ok(post)
}

fn post_owner(conn: &Connection, post_id: &str) -> AppResult<String> {
    conn.query_row(
        "SELECT user_id FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )
    .map_err(|_| AppError::NotFound)
}

fn query_posts(
    conn: &Connection,
    where_clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> AppResult<Vec<Post>> {
    let sql = format!("{}{}{}", POST_SELECT, where_clause, POST_ORDER);
    let mut stmt = conn.prepare(&sql)?;
    let mut posts = stmt
        .query_map(args, Post::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    load_liked_by(conn, &mut posts)?;
    Ok(posts)
}

// -- Handlers --

/// GET /posts — all posts, optionally filtered by hashtag. The filter
/// matches the literal `#<tag>` as a substring of the topic or the body.
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;

    let posts = match query.hashtag.as_deref() {
        Some(tag) => {
            let pattern = like_pattern(&format!("#{}", tag.trim_start_matches('#')));
            query_posts(
                &conn,
                " WHERE (p.topic LIKE ?1 ESCAPE '\\' OR p.body LIKE ?1 ESCAPE '\\')",
                &[&pattern],
            )?
        }
        None => query_posts(&conn, "", &[])?,
    };

    Ok(Json(posts))
}

/// POST /posts (and /posts/my_posts) — create a post owned by the caller.
pub async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    if req.topic.trim().is_empty() {
        return Err(AppError::Validation("topic is required".into()));
    }
    if req.body.trim().is_empty() {
        return Err(AppError::Validation("body is required".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO posts (id, user_id, topic, body) VALUES (?1, ?2, ?3, ?4)",
        params![id, user.id, req.topic.trim(), req.body],
    )?;

    let post = fetch_post(&conn, &id)?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /posts/my_posts
pub async fn my_posts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    let posts = query_posts(&conn, " WHERE p.user_id = ?1", &[&user.id])?;
    Ok(Json(posts))
}

/// GET /posts/following_posts — posts by users whose profile the caller
/// follows.
pub async fn following_posts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    let posts = query_posts(
        &conn,
        " WHERE EXISTS (
             SELECT 1 FROM follows f
             JOIN profiles pr ON pr.id = f.following_id
             WHERE f.follower_id = ?1 AND pr.user_id = p.user_id)",
        &[&user.id],
    )?;
    Ok(Json(posts))
}

/// GET /posts/liked_posts — posts the caller currently likes.
pub async fn liked_posts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    let posts = query_posts(
        &conn,
        " WHERE EXISTS (
             SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?1)",
        &[&user.id],
    )?;
    Ok(Json(posts))
}

/// GET /posts/{id}
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let conn = state.db.get()?;
    Ok(Json(fetch_post(&conn, &id)?))
}

/// PATCH /posts/{id} — owner only; bumps updated_at, never created_at.
pub async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let conn = state.db.get()?;
    let owner = post_owner(&conn, &id)?;
    check_ownership(&user, &owner)?;

    conn.execute(
        "UPDATE posts SET
            topic = COALESCE(?1, topic),
            body = COALESCE(?2, body),
            updated_at = datetime('now')
         WHERE id = ?3",
        params![req.topic.as_deref().map(str::trim), req.body, id],
    )?;

    Ok(Json(fetch_post(&conn, &id)?))
}

/// DELETE /posts/{id} — owner only.
pub async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let owner = post_owner(&conn, &id)?;
    check_ownership(&user, &owner)?;

    conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /posts/{id}/image — owner only; multipart upload of one "image" part.
pub async fn upload_post_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<Json<Post>> {
    let conn = state.db.get()?;
    let owner = post_owner(&conn, &id)?;
    check_ownership(&user, &owner)?;

    let (original_name, content_type, data) = read_image_part(&mut multipart).await?;
    let path = media::save_post_image(
        state.config.uploads_path(),
        original_name.as_deref(),
        content_type.as_deref(),
        &data,
    )?;

    conn.execute(
        "UPDATE posts SET image = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![path, id],
    )?;

    Ok(Json(fetch_post(&conn, &id)?))
}

/// GET /posts/{id}/like_unlike — true toggle; always succeeds.
pub async fn like_unlike(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let status = social::like_toggle(&state.db, &user.id, &id)?;
    Ok(Json(json!({ "status": status })))
}
