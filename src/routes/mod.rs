pub mod comments;
pub mod posts;
pub mod profiles;
pub mod uploads;
pub mod users;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(users::router())
        .merge(profiles::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(uploads::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Escapes LIKE wildcards in a user-supplied term and wraps it for a
/// case-insensitive substring match. Use with `LIKE ?n ESCAPE '\'`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
