//! Server-side login sessions keyed by an opaque cookie token.
//!
//! A [`SessionStore`] is the only state shared between requests. It maps a
//! random token to the logged-in user's id, role name and last-activity time.
//! Sessions idle for longer than the configured lifetime are dropped on lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::security::hash;

/// Name of the cookie that carries the session token.
pub const COOKIE_NAME: &str = "captacion_session";

/// One logged-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: i64,
    pub role: String,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: i64, role: impl Into<String>) -> Self {
        Self {
            user_id,
            role: role.into(),
            last_activity: Utc::now(),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, lifetime: Duration) -> bool {
        let idle = now.signed_duration_since(self.last_activity);
        idle.to_std().is_ok_and(|idle| idle > lifetime)
    }
}

/// Cloneable handle to the process-wide session map.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            lifetime,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.sessions.lock().unwrap_or_else(|poisoned| {
            warn!("session store lock was poisoned");
            poisoned.into_inner()
        })
    }

    /// Stores `session` under a fresh random token and returns the token.
    pub fn create(&self, session: Session) -> String {
        let token = hash::token(32);
        debug!(user_id = session.user_id, "session created");
        self.lock().insert(token.clone(), session);
        token
    }

    /// The live session for `token`, with its activity refreshed.
    pub fn touch(&self, token: &str) -> Option<Session> {
        self.touch_at(token, Utc::now())
    }

    fn touch_at(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(token)?;

        if session.is_expired(now, self.lifetime) {
            debug!(user_id = session.user_id, "session expired");
            sessions.remove(token);
            return None;
        }

        session.last_activity = now;
        Some(session.clone())
    }

    /// Removes the session for `token`, returning it if it existed.
    pub fn destroy(&self, token: &str) -> Option<Session> {
        self.lock().remove(token)
    }

    /// Drops every expired session and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, self.lifetime));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
