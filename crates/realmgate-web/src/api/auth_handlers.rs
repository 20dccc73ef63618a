use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;

use crate::auth::middleware::{set_session_cookie, CurrentSession};
use crate::dto::{SignInRequest, SignedOutPage};
use crate::error::AppError;
use crate::paths;
use crate::state::AppState;

pub async fn sign_in(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(body): Json<SignInRequest>,
) -> Result<Response, AppError> {
    let user = match state.db.find_user(&body.email).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Failed sign-in for {}: {e}", body.email);
            return Err(AppError::Auth("Invalid credentials".to_string()));
        }
    };

    let hash = user.password_hash.clone();
    let password = body.password;
    let valid = tokio::task::spawn_blocking(move || {
        crate::auth::password::verify_password(&hash, &password)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    if !valid {
        tracing::warn!("Failed sign-in for {}: invalid password", user.email);
        return Err(AppError::Auth("Invalid credentials".to_string()));
    }

    // New id on privilege change; the pre-auth id may have been planted.
    let session_id = state.sessions.rotate(&session.id);
    state.sessions.update(&session_id, |s| s.email = Some(user.email.clone()));
    tracing::info!("Signed in: {}", user.email);

    let mut response = Redirect::to(paths::REALM).into_response();
    set_session_cookie(&state, response.headers_mut(), &session_id);
    Ok(response)
}

/// Forgets the actor and realm but keeps pending notices for display.
pub async fn sign_out(State(state): State<AppState>, session: CurrentSession) -> Json<SignedOutPage> {
    state.sessions.update(&session.id, |s| {
        s.email = None;
        s.realm_id = None;
    });
    if let Some(actor) = &session.actor {
        tracing::info!("Signed out: {}", actor.email);
    }
    Json(SignedOutPage {
        flash: state.sessions.take_flash(&session.id),
    })
}
