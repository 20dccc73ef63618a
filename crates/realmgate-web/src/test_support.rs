//! Shared fixtures for router-level tests.

use std::sync::{Arc, OnceLock};

use realmgate_core::{MemoryDatabase, Realm, Store, User};

use crate::auth::password::hash_password;
use crate::auth::session::SessionStore;
use crate::config::ServerConfig;
use crate::state::AppState;

fn admin_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password("admin-pass").unwrap()).clone()
}

/// Realms North (1) and South (2); `admin@` administers North, `member@`
/// belongs to North, `target@` belongs to both.
pub fn test_state(limiter: Arc<dyn Store>) -> (AppState, Arc<MemoryDatabase>) {
    let db = Arc::new(MemoryDatabase::new());
    db.insert_realm(Realm { id: 1, name: "North".to_string() });
    db.insert_realm(Realm { id: 2, name: "South".to_string() });

    let mut admin = User::new("admin@example.com", "Admin")
        .with_admin_realm(1)
        .with_realm(2);
    admin.password_hash = admin_hash();
    db.insert_user(admin);
    db.insert_user(User::new("member@example.com", "Member").with_realm(1));
    db.insert_user(
        User::new("target@example.com", "Target")
            .with_realm(1)
            .with_realm(2),
    );

    let state = AppState {
        config: Arc::new(ServerConfig::default()),
        db: db.clone(),
        sessions: Arc::new(SessionStore::new(3600)),
        limiter,
    };
    (state, db)
}

/// Starts a session already signed in as `email`, optionally with a realm
/// selected, and returns its id.
pub fn sign_in_session(state: &AppState, email: &str, realm_id: Option<u64>) -> String {
    let id = state.sessions.create();
    state.sessions.update(&id, |s| {
        s.email = Some(email.to_string());
        s.realm_id = realm_id;
    });
    id
}
