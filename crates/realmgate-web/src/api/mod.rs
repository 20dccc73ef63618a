mod auth_handlers;
mod realms;
pub mod users;

use axum::http::Uri;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::auth::middleware::{require_realm_admin, session_layer};
use crate::error::AppError;
use crate::middleware::rate_limit::rate_limit;
use crate::state::AppState;

/// All application routes with session and rate limit layers applied.
///
/// `/health` sits outside both layers.
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/users/{email}", delete(users::handle_delete))
        .route_layer(from_fn_with_state(state.clone(), require_realm_admin));

    Router::new()
        .route("/signin", post(auth_handlers::sign_in))
        .route("/signout", get(auth_handlers::sign_out))
        .route("/realm", get(realms::handle_show).post(realms::handle_select))
        .route("/users", get(users::handle_list))
        .merge(admin_routes)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), session_layer))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
