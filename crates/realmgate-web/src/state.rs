use std::sync::Arc;

use realmgate_core::{Database, Store};

use crate::auth::session::SessionStore;
use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db: Arc<dyn Database>,
    pub sessions: Arc<SessionStore>,
    /// Shared rate limit store; built once at startup, closed at shutdown.
    pub limiter: Arc<dyn Store>,
}
