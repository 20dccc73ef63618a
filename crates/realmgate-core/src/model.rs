//! Users and the realms they belong to.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A tenant scope within which users and permissions are defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm {
    pub id: u64,
    pub name: String,
}

/// An account that may be a member (and optionally an admin) of realms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(default)]
    pub realms: BTreeSet<u64>,
    #[serde(default)]
    pub admin_realms: BTreeSet<u64>,
}

impl User {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            password_hash: String::new(),
            realms: BTreeSet::new(),
            admin_realms: BTreeSet::new(),
        }
    }

    /// Returns a copy that is a member of `realm_id`.
    #[must_use]
    pub fn with_realm(mut self, realm_id: u64) -> Self {
        self.realms.insert(realm_id);
        self
    }

    /// Returns a copy that is a member and an admin of `realm_id`.
    #[must_use]
    pub fn with_admin_realm(mut self, realm_id: u64) -> Self {
        self.realms.insert(realm_id);
        self.admin_realms.insert(realm_id);
        self
    }

    pub fn can_view_realm(&self, realm_id: u64) -> bool {
        self.realms.contains(&realm_id)
    }

    pub fn can_admin_realm(&self, realm_id: u64) -> bool {
        self.admin_realms.contains(&realm_id)
    }
}
