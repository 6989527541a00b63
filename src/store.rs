use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::session::Session;

/// In-process sessions keyed by a random id.
///
/// Sessions idle for longer than the TTL are dropped on the next access, and
/// when the store is full the least recently used session makes room.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<Uuid, Session>,
    max_sessions: usize,
    ttl: Duration,
    reset_clears_history: bool,
}

impl SessionStore {
    #[must_use]
    pub fn new(max_sessions: usize, ttl_seconds: i64, reset_clears_history: bool) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions: max_sessions.max(1),
            ttl: Duration::seconds(ttl_seconds.max(1)),
            reset_clears_history,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn create(&mut self, now: DateTime<Utc>) -> &mut Session {
        self.evict_expired(now);
        while self.sessions.len() >= self.max_sessions {
            let Some(oldest) = self
                .sessions
                .values()
                .min_by_key(|session| session.last_used())
                .map(Session::id)
            else {
                break;
            };
            self.sessions.remove(&oldest);
            info!(session = %oldest, "evicted least recently used session");
        }

        let id = Uuid::new_v4();
        let mut session = Session::new(id, self.reset_clears_history);
        session.touch(now);
        info!(session = %id, active = self.sessions.len() + 1, "created session");
        self.sessions.entry(id).or_insert(session)
    }

    /// Returns a live session and marks it as used.
    pub fn get_mut(&mut self, id: Uuid, now: DateTime<Utc>) -> Option<&mut Session> {
        self.evict_expired(now);
        let session = self.sessions.get_mut(&id)?;
        session.touch(now);
        Some(session)
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            info!(session = %id, "removed session");
        }
        removed
    }

    /// Drops idle sessions; their documents' temp files go with them.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now.signed_duration_since(session.last_used()) <= ttl);
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            info!(evicted, "expired idle sessions");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::SessionStore;

    #[test]
    fn idle_sessions_expire() {
        let now = Utc::now();
        let mut store = SessionStore::new(4, 60, true);
        let id = store.create(now).id();

        assert!(store.get_mut(id, now + Duration::seconds(30)).is_some());
        assert!(store.get_mut(id, now + Duration::seconds(80)).is_some());
        assert!(store.get_mut(id, now + Duration::seconds(200)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn full_store_evicts_least_recently_used() {
        let now = Utc::now();
        let mut store = SessionStore::new(2, 3600, true);
        let first = store.create(now).id();
        let second = store.create(now + Duration::seconds(1)).id();
        store.get_mut(first, now + Duration::seconds(2));

        let third = store.create(now + Duration::seconds(3)).id();

        assert_eq!(store.len(), 2);
        assert!(store.get_mut(second, now + Duration::seconds(4)).is_none());
        assert!(store.get_mut(first, now + Duration::seconds(4)).is_some());
        assert!(store.get_mut(third, now + Duration::seconds(4)).is_some());
    }

    #[test]
    fn remove_reports_unknown_ids() {
        let mut store = SessionStore::new(2, 3600, true);
        let id = store.create(Utc::now()).id();
        assert!(store.remove(id));
        assert!(!store.remove(id));
    }
}
