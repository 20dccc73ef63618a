//! Persistence for users and realms.
//!
//! [`Database`] is the seam the web layer talks to. [`MemoryDatabase`] keeps
//! everything in process, seeded from configuration at startup.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{DbError, DbResult};
use crate::model::{Realm, User};

#[async_trait]
pub trait Database: Send + Sync {
    /// Looks up a user by email.
    async fn find_user(&self, email: &str) -> DbResult<User>;

    async fn find_realm(&self, id: u64) -> DbResult<Realm>;

    /// Realms `user` is a member of, ordered by id.
    async fn realms_for(&self, user: &User) -> DbResult<Vec<Realm>>;

    /// Members of `realm`, ordered by email.
    async fn list_users(&self, realm: &Realm) -> DbResult<Vec<User>>;

    /// Removes `user`'s membership and admin rights in `realm`. The account
    /// itself is kept. Removing a non-member succeeds.
    async fn delete_user_from_realm(&self, realm: &Realm, user: &User) -> DbResult<()>;
}

#[derive(Default)]
pub struct MemoryDatabase {
    users: DashMap<String, User>,
    realms: DashMap<u64, Realm>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_realm(&self, realm: Realm) {
        self.realms.insert(realm.id, realm);
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.email.clone(), user);
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn find_user(&self, email: &str) -> DbResult<User> {
        self.users
            .get(email)
            .map(|u| u.clone())
            .ok_or_else(|| DbError::UserNotFound(email.to_string()))
    }

    async fn find_realm(&self, id: u64) -> DbResult<Realm> {
        self.realms
            .get(&id)
            .map(|r| r.clone())
            .ok_or(DbError::RealmNotFound(id))
    }

    async fn realms_for(&self, user: &User) -> DbResult<Vec<Realm>> {
        Ok(user
            .realms
            .iter()
            .filter_map(|id| self.realms.get(id).map(|r| r.clone()))
            .collect())
    }

    async fn list_users(&self, realm: &Realm) -> DbResult<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|entry| entry.can_view_realm(realm.id))
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn delete_user_from_realm(&self, realm: &Realm, user: &User) -> DbResult<()> {
        let mut stored = self
            .users
            .get_mut(&user.email)
            .ok_or_else(|| DbError::UserNotFound(user.email.clone()))?;
        stored.realms.remove(&realm.id);
        stored.admin_realms.remove(&realm.id);
        tracing::info!("Removed {} from realm {}", user.email, realm.id);
        Ok(())
    }
}
