use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(handlers::register))
        .route("/users/login", post(handlers::login))
        .route("/users/logout", post(handlers::logout))
        .route(
            "/users/me",
            get(handlers::me)
                .patch(handlers::update_me)
                .delete(handlers::delete_me),
        )
}
