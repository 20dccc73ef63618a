use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::flash::Flash;

/// Browser session keyed by the `realmgate_session` cookie.
#[derive(Debug, Clone)]
pub struct Session {
    /// Signed-in user, if any.
    pub email: Option<String>,
    /// Realm selected through the realm picker.
    pub realm_id: Option<u64>,
    /// Notices waiting for the next rendered page.
    pub flash: Flash,
    pub last_seen: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            email: None,
            realm_id: None,
            flash: Flash::default(),
            last_seen: Instant::now(),
        }
    }
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// A fresh id that is not stored until something is written to it.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Starts an empty session and returns its id.
    pub fn create(&self) -> String {
        let session_id = Self::new_id();
        self.sessions.insert(session_id.clone(), Session::new());
        tracing::debug!("Session created, store size: {}", self.sessions.len());
        session_id
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Replaces `session_id` with a new session that keeps only the pending
    /// notices. The old id stops resolving.
    pub fn rotate(&self, session_id: &str) -> String {
        let flash = self
            .sessions
            .remove(session_id)
            .map(|(_, old)| old.flash)
            .unwrap_or_default();
        let new_id = self.create();
        self.update(&new_id, |session| session.flash = flash);
        new_id
    }

    /// Returns the session and refreshes its idle timer.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        let mut entry = self.sessions.get_mut(session_id)?;
        if entry.last_seen.elapsed() > self.ttl {
            tracing::debug!("Session expired: id={session_id}");
            drop(entry);
            self.sessions.remove(session_id);
            return None;
        }
        entry.last_seen = Instant::now();
        Some(entry.clone())
    }

    /// Applies `f` to the session. Returns `false` if the session is gone.
    pub fn update<F>(&self, session_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                f(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Queues notices for the next page render, storing the session first if
    /// this is its first write.
    pub fn push_flash(&self, session_id: &str, flash: Flash) {
        if flash.is_empty() {
            return;
        }
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(Session::new)
            .flash
            .merge(flash);
    }

    /// Returns and clears the pending notices.
    pub fn take_flash(&self, session_id: &str) -> Flash {
        self.sessions
            .get_mut(session_id)
            .map(|mut entry| std::mem::take(&mut entry.flash))
            .unwrap_or_default()
    }

    pub fn cleanup_expired(&self) {
        let ttl = self.ttl;
        self.sessions.retain(|_, session| session.last_seen.elapsed() <= ttl);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
