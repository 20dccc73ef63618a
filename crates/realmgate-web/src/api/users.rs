use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use realmgate_core::{Database, Realm, User};

use crate::auth::middleware::CurrentSession;
use crate::dto::{UserDto, UsersPage};
use crate::error::AppError;
use crate::flash::Flash;
use crate::paths;
use crate::state::AppState;

/// Removes the user identified by `email` from `realm`.
///
/// Every outcome is a redirect; what happened is recorded in `flash`.
pub async fn delete_user(
    db: &dyn Database,
    flash: &mut Flash,
    actor: Option<&User>,
    realm: Option<&Realm>,
    email: &str,
) -> Redirect {
    let Some(actor) = actor else {
        flash.error("Unauthorized.");
        return Redirect::to(paths::SIGNOUT);
    };

    let Some(realm) = realm else {
        flash.error("Select a realm to continue.");
        return Redirect::to(paths::REALM);
    };

    let user = match db.find_user(email).await {
        Ok(user) => user,
        Err(e) => {
            flash.error(format!("Failed to find user: {e}"));
            return Redirect::to(paths::USERS);
        }
    };

    if let Err(e) = db.delete_user_from_realm(realm, &user).await {
        tracing::error!("Failed to delete {} from realm {}: {e}", user.email, realm.id);
        flash.error(format!("Failed to delete user: {e}"));
        return Redirect::to(paths::USERS);
    }

    tracing::info!("{} deleted {} from realm {}", actor.email, user.email, realm.id);
    flash.alert(format!("Deleted User {}", user.email));
    Redirect::to(paths::USERS)
}

pub async fn handle_delete(
    State(state): State<AppState>,
    session: CurrentSession,
    // TODO: take the email from a form field; in the path it ends up in request logs.
    Path(email): Path<String>,
) -> Redirect {
    let mut flash = Flash::default();
    let redirect = delete_user(
        state.db.as_ref(),
        &mut flash,
        session.actor.as_ref(),
        session.realm.as_ref(),
        &email,
    )
    .await;
    state.sessions.push_flash(&session.id, flash);
    redirect
}

pub async fn handle_list(State(state): State<AppState>, session: CurrentSession) -> Response {
    let mut flash = Flash::default();
    if session.actor.is_none() {
        flash.error("Unauthorized.");
        state.sessions.push_flash(&session.id, flash);
        return Redirect::to(paths::SIGNOUT).into_response();
    }
    let Some(realm) = session.realm else {
        flash.error("Select a realm to continue.");
        state.sessions.push_flash(&session.id, flash);
        return Redirect::to(paths::REALM).into_response();
    };

    let users = match state.db.list_users(&realm).await {
        Ok(users) => users,
        Err(e) => return AppError::Internal(format!("Failed to list users: {e}")).into_response(),
    };

    Json(UsersPage {
        users: users.iter().map(|u| UserDto::from_user(u, &realm)).collect(),
        realm,
        flash: state.sessions.take_flash(&session.id),
    })
    .into_response()
}
