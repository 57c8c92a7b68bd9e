use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use rusqlite::params;
use serde::Deserialize;
use serde_json::json;

use crate::auth::password::{hash_password, validate_email, validate_password, verify_password};
use crate::auth::session;
use crate::db::models::User;
use crate::error::{on_constraint, AppError, AppResult};
use crate::extractors::{bearer_token, CurrentUser};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateAccountRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

// -- Handlers --

/// POST /users/register — create an account.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    validate_email(&email)?;
    validate_password(&req.password)?;

    let password_hash = hash_password(&req.password)?;
    let id = uuid::Uuid::now_v7().to_string();

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO users (id, email, password_hash) VALUES (?1, ?2, ?3)",
        params![id, email, password_hash],
    )
    .map_err(|e| {
        on_constraint(
            e,
            AppError::Validation("A user with this email already exists".into()),
        )
    })?;

    tracing::info!("Registered user {}", email);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "email": email })),
    ))
}

/// POST /users/login — verify credentials and issue a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();

    let conn = state.db.get()?;
    let (user_id, password_hash): (String, String) = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE email = ?1",
            params![email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|_| AppError::Unauthorized)?;

    if !verify_password(&req.password, &password_hash) {
        return Err(AppError::Unauthorized);
    }

    let token = session::create_session(&state.db, &user_id, state.config.auth.token_hours)?;

    Ok(Json(json!({ "token": token })))
}

/// POST /users/logout — revoke the presented token.
pub async fn logout(
    State(state): State<AppState>,
    _user: CurrentUser,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    // CurrentUser already proved the token valid; revoke it
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    session::delete_session(&state.db, token)?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /users/me — the acting account.
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    let account = conn.query_row(
        "SELECT id, email, password_hash, is_admin, created_at FROM users WHERE id = ?1",
        params![user.id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                is_admin: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )?;

    Ok(Json(account))
}

/// PATCH /users/me — update email and/or password.
pub async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UpdateAccountRequest>,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;

    if let Some(ref email) = req.email {
        let email = email.trim().to_lowercase();
        validate_email(&email)?;
        conn.execute(
            "UPDATE users SET email = ?1 WHERE id = ?2",
            params![email, user.id],
        )
        .map_err(|e| {
            on_constraint(
                e,
                AppError::Validation("A user with this email already exists".into()),
            )
        })?;
    }

    if let Some(ref password) = req.password {
        validate_password(password)?;
        let password_hash = hash_password(password)?;
        conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user.id],
        )?;
    }

    let email: String = conn.query_row(
        "SELECT email FROM users WHERE id = ?1",
        params![user.id],
        |row| row.get(0),
    )?;

    Ok(Json(json!({ "id": user.id, "email": email })))
}

/// DELETE /users/me — remove the account; profile, posts, likes, comments,
/// and follow edges go with it.
pub async fn delete_me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    conn.execute("DELETE FROM users WHERE id = ?1", params![user.id])?;

    tracing::info!("Deleted account {}", user.email);

    Ok(StatusCode::NO_CONTENT)
}
