use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use rusqlite::{params, params_from_iter, Connection};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{Profile, ProfileSummary, Sex};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media;
use crate::policy::check_ownership;
use crate::routes::like_pattern;
use crate::social;
use crate::state::AppState;

const PROFILE_SELECT: &str = "SELECT p.id, p.user_id, p.first_name, p.last_name, p.nick_name, \
     u.email, p.sex, p.registered, p.bio, p.image \
     FROM profiles p JOIN users u ON u.id = p.user_id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles", get(list_profiles).post(create_profile))
        .route(
            "/profiles/me",
            get(my_profile)
                .patch(update_my_profile)
                .delete(delete_my_profile),
        )
        .route("/profiles/me/image", put(upload_profile_image))
        .route("/profiles/me/list_following", get(list_following))
        .route("/profiles/me/list_followers", get(list_followers))
        .route(
            "/profiles/{id}",
            get(get_profile).patch(update_profile).delete(delete_profile),
        )
        .route("/profiles/{id}/follow", get(follow_profile))
        .route("/profiles/{id}/unfollow", get(unfollow_profile))
}

// -- Request types --

#[derive(Deserialize, Default)]
pub struct ProfileListQuery {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub sex: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    pub sex: Option<String>,
    pub bio: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub sex: Option<String>,
    pub bio: Option<String>,
}

// -- Helpers --

fn parse_sex(value: &str) -> AppResult<Sex> {
    Sex::parse(value).ok_or_else(|| {
        AppError::Validation(format!(
            "Invalid sex '{}': expected Man, Woman or Other",
            value
        ))
    })
}

/// Distinguishes the two UNIQUE indexes on profiles: one profile per user
/// vs. the (last_name, nick_name) pair.
fn map_profile_constraint(err: rusqlite::Error) -> AppError {
    if let rusqlite::Error::SqliteFailure(e, Some(msg)) = &err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            if msg.contains("profiles.user_id") {
                return AppError::Conflict("You already have a profile".into());
            }
            return AppError::Validation(
                "A profile with this last name and nickname already exists".into(),
            );
        }
    }
    AppError::Database(err)
}

fn fetch_profile(conn: &Connection, profile_id: &str) -> AppResult<Profile> {
    conn.query_row(
        &format!("{} WHERE p.id = ?1", PROFILE_SELECT),
        params![profile_id],
        Profile::from_row,
    )
    .map_err(|_| AppError::NotFound)
}

fn fetch_profile_of_user(conn: &Connection, user_id: &str) -> AppResult<Profile> {
    conn.query_row(
        &format!("{} WHERE p.user_id = ?1", PROFILE_SELECT),
        params![user_id],
        Profile::from_row,
    )
    .map_err(|_| AppError::NotFound)
}

// -- Handlers --

/// GET /profiles — list profiles, optionally filtered. Filters combine
/// with AND; name filters are case-insensitive substrings, sex is exact.
pub async fn list_profiles(
    State(state): State<AppState>,
    Query(query): Query<ProfileListQuery>,
) -> AppResult<Json<Vec<Profile>>> {
    let mut sql = format!("{} WHERE 1=1", PROFILE_SELECT);
    let mut args: Vec<String> = Vec::new();

    if let Some(ref first_name) = query.first_name {
        args.push(like_pattern(first_name));
        sql.push_str(&format!(" AND p.first_name LIKE ?{} ESCAPE '\\'", args.len()));
    }
    if let Some(ref last_name) = query.last_name {
        args.push(like_pattern(last_name));
        sql.push_str(&format!(" AND p.last_name LIKE ?{} ESCAPE '\\'", args.len()));
    }
    if let Some(ref nick_name) = query.nick_name {
        args.push(like_pattern(nick_name));
        sql.push_str(&format!(" AND p.nick_name LIKE ?{} ESCAPE '\\'", args.len()));
    }
    if let Some(ref sex) = query.sex {
        args.push(parse_sex(sex)?.as_str().to_string());
        sql.push_str(&format!(" AND p.sex = ?{}", args.len()));
    }

    sql.push_str(" ORDER BY p.last_name, p.nick_name");

    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&sql)?;
    let profiles = stmt
        .query_map(params_from_iter(args), Profile::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(profiles))
}

/// POST /profiles — create the acting user's profile.
pub async fn create_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    for (field, value) in [
        ("first_name", &req.first_name),
        ("last_name", &req.last_name),
        ("nick_name", &req.nick_name),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{} is required", field)));
        }
    }
    let sex = match req.sex.as_deref() {
        Some(value) => parse_sex(value)?,
        None => Sex::Other,
    };

    let id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO profiles (id, user_id, first_name, last_name, nick_name, sex, bio)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            user.id,
            req.first_name.trim(),
            req.last_name.trim(),
            req.nick_name.trim(),
            sex.as_str(),
            req.bio.as_deref().unwrap_or(""),
        ],
    )
    .map_err(map_profile_constraint)?;

    let profile = fetch_profile(&conn, &id)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// GET /profiles/{id}
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Profile>> {
    let conn = state.db.get()?;
    Ok(Json(fetch_profile(&conn, &id)?))
}

/// GET /profiles/me
pub async fn my_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Profile>> {
    let conn = state.db.get()?;
    Ok(Json(fetch_profile_of_user(&conn, &user.id)?))
}

/// Applies a partial update. The registration date and the owning user are
/// not caller-settable.
fn apply_profile_update(
    conn: &Connection,
    profile_id: &str,
    req: &UpdateProfileRequest,
) -> AppResult<()> {
    let sex = match req.sex.as_deref() {
        Some(value) => Some(parse_sex(value)?),
        None => None,
    };

    conn.execute(
        "UPDATE profiles SET
            first_name = COALESCE(?1, first_name),
            last_name = COALESCE(?2, last_name),
            nick_name = COALESCE(?3, nick_name),
            sex = COALESCE(?4, sex),
            bio = COALESCE(?5, bio)
         WHERE id = ?6",
        params![
            req.first_name.as_deref().map(str::trim),
            req.last_name.as_deref().map(str::trim),
            req.nick_name.as_deref().map(str::trim),
            sex.map(|s| s.as_str()),
            req.bio,
            profile_id,
        ],
    )
    .map_err(map_profile_constraint)?;
    Ok(())
}

/// PATCH /profiles/me
pub async fn update_my_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<Profile>> {
    let conn = state.db.get()?;
    let profile = fetch_profile_of_user(&conn, &user.id)?;
    apply_profile_update(&conn, &profile.id, &req)?;
    Ok(Json(fetch_profile(&conn, &profile.id)?))
}

/// PATCH /profiles/{id} — owner only.
pub async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<Profile>> {
    let conn = state.db.get()?;
    let profile = fetch_profile(&conn, &id)?;
    check_ownership(&user, &profile.user_id)?;
    apply_profile_update(&conn, &profile.id, &req)?;
    Ok(Json(fetch_profile(&conn, &profile.id)?))
}

/// DELETE /profiles/me
pub async fn delete_my_profile(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let profile = fetch_profile_of_user(&conn, &user.id)?;
    conn.execute("DELETE FROM profiles WHERE id = ?1", params![profile.id])?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /profiles/{id} — owner only.
pub async fn delete_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let profile = fetch_profile(&conn, &id)?;
    check_ownership(&user, &profile.user_id)?;
    conn.execute("DELETE FROM profiles WHERE id = ?1", params![profile.id])?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /profiles/me/image — multipart upload of a single "image" part.
pub async fn upload_profile_image(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<Profile>> {
    let conn = state.db.get()?;
    let profile = fetch_profile_of_user(&conn, &user.id)?;

    let (original_name, content_type, data) = read_image_part(&mut multipart).await?;
    let path = media::save_profile_image(
        state.config.uploads_path(),
        &user.email,
        original_name.as_deref(),
        content_type.as_deref(),
        &data,
    )?;

    conn.execute(
        "UPDATE profiles SET image = ?1 WHERE id = ?2",
        params![path, profile.id],
    )?;

    Ok(Json(fetch_profile(&conn, &profile.id)?))
}

/// GET /profiles/{id}/follow — strict toggle: re-following is a Conflict.
pub async fn follow_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    social::follow(&state.db, &user.id, &id)?;
    Ok(Json(
        json!({ "message": "You are now following this profile" }),
    ))
}

/// GET /profiles/{id}/unfollow — strict toggle: redundant calls Conflict.
pub async fn unfollow_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    social::unfollow(&state.db, &user.id, &id)?;
    Ok(Json(
        json!({ "message": "You are no longer following this profile" }),
    ))
}

/// GET /profiles/me/list_following
pub async fn list_following(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(social::list_following(&state.db, &user.id)?))
}

/// GET /profiles/me/list_followers
pub async fn list_followers(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<ProfileSummary>>> {
    Ok(Json(social::list_followers(&state.db, &user.id)?))
}

/// Pulls the first "image" part out of a multipart body.
pub(crate) async fn read_image_part(
    multipart: &mut Multipart,
) -> AppResult<(Option<String>, Option<String>, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("image") {
            let original_name = field.file_name().map(|s| s.to_string());
            let content_type = field.content_type().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?;
            if data.is_empty() {
                return Err(AppError::Validation("Uploaded image is empty".into()));
            }
            return Ok((original_name, content_type, data.to_vec()));
        }
    }
    Err(AppError::Validation("Missing 'image' field".into()))
}
