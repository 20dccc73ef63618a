use std::net::SocketAddr;
use std::path::PathBuf;

use realmgate_core::{MemoryDatabase, RateLimitConfig, Realm, User};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RealmConfig {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub password_hash: String,
    #[serde(default)]
    pub realms: Vec<u64>,
    #[serde(default)]
    pub admin_realms: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub realms: Vec<RealmConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

impl TlsConfig {
    pub fn is_enabled(&self) -> bool {
        self.cert_path.is_some() && self.key_path.is_some()
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_session_ttl_seconds() -> u64 { 3600 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            session_ttl_seconds: default_session_ttl_seconds(),
            tls: TlsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            realms: Vec::new(),
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Loads `REALMGATE_CONFIG` (if set) and applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset, as for the rate limit keys.
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut config = if let Some(path) = lookup("REALMGATE_CONFIG").map(PathBuf::from) {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
            toml::from_str(&contents)?
        } else {
            ServerConfig::default()
        };

        if let Some(addr) = lookup("REALMGATE_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }
        if let Some(cert) = lookup("REALMGATE_TLS_CERT") {
            config.tls.cert_path = Some(cert);
        }
        if let Some(key) = lookup("REALMGATE_TLS_KEY") {
            config.tls.key_path = Some(key);
        }
        if let Some(ttl) = lookup("REALMGATE_SESSION_TTL_SECONDS") {
            config.session_ttl_seconds = ttl.parse()?;
        }

        config.rate_limit.apply_overrides(&lookup)?;

        if config.users.is_empty() {
            tracing::warn!("No users configured; nobody will be able to sign in.");
        }

        Ok(config)
    }

    /// Builds the in-memory database from the configured realms and users.
    pub fn seed_database(&self) -> MemoryDatabase {
        let db = MemoryDatabase::new();
        for realm in &self.realms {
            db.insert_realm(Realm {
                id: realm.id,
                name: realm.name.clone(),
            });
        }

        for user in &self.users {
            let unknown: Vec<u64> = user
                .realms
                .iter()
                .chain(&user.admin_realms)
                .filter(|id| !self.realms.iter().any(|r| r.id == **id))
                .copied()
                .collect();
            if !unknown.is_empty() {
                tracing::warn!("User {} references unknown realms {:?}", user.email, unknown);
            }

            let name = if user.name.is_empty() { &user.email } else { &user.name };
            let mut seeded = User::new(user.email.clone(), name.clone());
            seeded.password_hash = user.password_hash.clone();
            for id in &user.realms {
                seeded = seeded.with_realm(*id);
            }
            for id in &user.admin_realms {
                seeded = seeded.with_admin_realm(*id);
            }
            db.insert_user(seeded);
        }
        db
    }
}
