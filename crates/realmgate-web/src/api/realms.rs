use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;

use crate::auth::middleware::CurrentSession;
use crate::dto::{RealmsPage, SelectRealmRequest};
use crate::error::AppError;
use crate::flash::Flash;
use crate::paths;
use crate::state::AppState;

/// Realm picker: lists the realms the actor belongs to.
pub async fn handle_show(State(state): State<AppState>, session: CurrentSession) -> Response {
    let Some(actor) = session.actor else {
        let mut flash = Flash::default();
        flash.error("Unauthorized.");
        state.sessions.push_flash(&session.id, flash);
        return Redirect::to(paths::SIGNOUT).into_response();
    };

    let realms = match state.db.realms_for(&actor).await {
        Ok(realms) => realms,
        Err(e) => return AppError::Internal(format!("Failed to list realms: {e}")).into_response(),
    };

    let mut flash = state.sessions.take_flash(&session.id);
    if realms.is_empty() {
        flash.warning("You are not a member of any realm.");
    }

    Json(RealmsPage {
        realms,
        selected: session.realm.map(|r| r.id),
        flash,
    })
    .into_response()
}

pub async fn handle_select(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(body): Json<SelectRealmRequest>,
) -> Redirect {
    let mut flash = Flash::default();

    let Some(actor) = session.actor else {
        flash.error("Unauthorized.");
        state.sessions.push_flash(&session.id, flash);
        return Redirect::to(paths::SIGNOUT);
    };

    if !actor.can_view_realm(body.realm_id) {
        flash.error("Failed to select realm: not a member.");
        state.sessions.push_flash(&session.id, flash);
        return Redirect::to(paths::REALM);
    }

    let realm = match state.db.find_realm(body.realm_id).await {
        Ok(realm) => realm,
        Err(e) => {
            flash.error(format!("Failed to select realm: {e}"));
            state.sessions.push_flash(&session.id, flash);
            return Redirect::to(paths::REALM);
        }
    };

    state.sessions.update(&session.id, |s| s.realm_id = Some(realm.id));
    tracing::debug!("{} selected realm {}", actor.email, realm.id);
    Redirect::to(paths::USERS)
}
