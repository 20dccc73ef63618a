use realmgate_core::{Realm, User};
use serde::{Deserialize, Serialize};

use crate::flash::Flash;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectRealmRequest {
    pub realm_id: u64,
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub email: String,
    pub name: String,
    pub admin: bool,
}

impl UserDto {
    pub fn from_user(user: &User, realm: &Realm) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
            admin: user.can_admin_realm(realm.id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsersPage {
    pub realm: Realm,
    pub users: Vec<UserDto>,
    pub flash: Flash,
}

#[derive(Debug, Serialize)]
pub struct RealmsPage {
    pub realms: Vec<Realm>,
    pub selected: Option<u64>,
    pub flash: Flash,
}

#[derive(Debug, Serialize)]
pub struct SignedOutPage {
    pub flash: Flash,
}
