use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use realmgate_core::{Realm, User};

use crate::auth::session::SessionStore;
use crate::error::AppError;
use crate::flash::Flash;
use crate::paths;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "realmgate_session";

/// Id of the session attached to the current request.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Sets the session cookie for `session_id` on a response.
pub fn set_session_cookie(state: &AppState, headers: &mut HeaderMap, session_id: &str) {
    let secure = if state.config.tls.is_enabled() { "; Secure" } else { "" };
    let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax{secure}");
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Failed to build session cookie: {e}"),
    }
}

/// Attaches a [`SessionId`] to every request.
///
/// Browsers without a live session get an unsaved id; the session is only
/// stored (and the cookie set) once a handler writes to it.
pub async fn session_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let existing = session_cookie(req.headers()).filter(|id| state.sessions.get(id).is_some());

    let (session_id, stored) = match existing {
        Some(id) => (id, true),
        None => (SessionStore::new_id(), false),
    };

    req.extensions_mut().insert(SessionId(session_id.clone()));
    let mut response = next.run(req).await;

    if !stored && state.sessions.contains(&session_id) {
        set_session_cookie(&state, response.headers_mut(), &session_id);
    }
    response
}

/// Actor and realm resolved from the session.
///
/// Either may be absent; handlers decide how to redirect.
pub struct CurrentSession {
    pub id: String,
    pub actor: Option<User>,
    pub realm: Option<Realm>,
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionId(id) = parts
            .extensions
            .get::<SessionId>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer not installed".to_string()))?;

        let Some(session) = state.sessions.get(&id) else {
            return Ok(CurrentSession { id, actor: None, realm: None });
        };

        let actor = match &session.email {
            Some(email) => match state.db.find_user(email).await {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!("Session user no longer resolvable: {e}");
                    None
                }
            },
            None => None,
        };

        let realm = match (&actor, session.realm_id) {
            (Some(user), Some(realm_id)) if user.can_view_realm(realm_id) => {
                state.db.find_realm(realm_id).await.ok()
            }
            _ => None,
        };

        Ok(CurrentSession { id, actor, realm })
    }
}

/// Route guard: the signed-in actor must administer the selected realm.
///
/// Requests without an actor or realm pass through so the handler can send
/// its own corrective redirect.
pub async fn require_realm_admin(
    State(state): State<AppState>,
    session: CurrentSession,
    req: Request,
    next: Next,
) -> Response {
    if let (Some(actor), Some(realm)) = (&session.actor, &session.realm) {
        if !actor.can_admin_realm(realm.id) {
            tracing::warn!("{} is not an admin of realm {}", actor.email, realm.id);
            let mut flash = Flash::default();
            flash.error("Unauthorized.");
            state.sessions.push_flash(&session.id, flash);
            return Redirect::to(paths::REALM).into_response();
        }
    }
    next.run(req).await
}
