//! Session registry with inactivity expiry.
//!
//! Expiry is a plain function of `last_activity` and a timeout, evaluated
//! against the injected [`Clock`]. Nothing here owns a timer: whoever hosts the
//! manager decides how often to call [`SessionManager::cleanup_expired`].

use lexfuse_core::{Clock, LexfuseError, LexfuseResult, SessionConfig, SessionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::session::Session;

/// Notified whenever a session leaves the registry, by expiry or explicit clear.
pub trait SessionListener: Send + Sync {
    /// Drop everything owned by `session`.
    fn on_session_removed(&self, session: &SessionId);
}

/// Tracks live sessions and hands out unguessable ids.
pub struct SessionManager {
    clock: Arc<dyn Clock>,
    timeout: Duration,
    sessions: Mutex<HashMap<SessionId, Session>>,
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl SessionManager {
    /// Create a manager using the configured inactivity timeout.
    pub fn new(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_timeout(config.inactivity_timeout(), clock)
    }

    /// Create a manager with an explicit inactivity timeout.
    pub fn with_timeout(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timeout,
            sessions: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Inactivity timeout applied by [`get_or_create`](Self::get_or_create).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a listener for session removal.
    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.write().push(listener);
    }

    /// Resolve a client-supplied id to a live session, touching it, or start a
    /// new session.
    ///
    /// Ids that are missing, malformed, unknown or expired are never adopted;
    /// the caller always gets a server-generated id in those cases.
    pub fn get_or_create(&self, requested: Option<&str>) -> Session {
        let requested = requested.and_then(|raw| match raw.parse::<SessionId>() {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(error = %e, "ignoring malformed session id");
                None
            }
        });

        let now = self.clock.now();
        let mut expired = None;
        let session = {
            let mut sessions = self.sessions.lock();
            if let Some(id) = requested {
                let live = sessions
                    .get(&id)
                    .map(|s| !s.is_expired_at(now, self.timeout));
                match live {
                    Some(true) => {
                        if let Some(s) = sessions.get_mut(&id) {
                            s.touch(now);
                            return s.clone();
                        }
                    }
                    Some(false) => {
                        sessions.remove(&id);
                        expired = Some(id);
                    }
                    None => {}
                }
            }
            let session = Session::new(now);
            sessions.insert(session.id, session.clone());
            session
        };

        if let Some(id) = expired {
            info!(session = %id, "session expired on access");
            self.notify(&[id]);
        }
        debug!(session = %session.id, "session created");
        session
    }

    /// Look up a live session without touching it.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        let now = self.clock.now();
        self.sessions
            .lock()
            .get(id)
            .filter(|s| !s.is_expired_at(now, self.timeout))
            .cloned()
    }

    /// Mark a session as active now.
    ///
    /// A session that was already removed is not brought back.
    pub fn touch(&self, id: &SessionId) -> LexfuseResult<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(id) {
            Some(s) if !s.is_expired_at(now, self.timeout) => {
                s.touch(now);
                Ok(s.clone())
            }
            _ => Err(LexfuseError::NotFound(format!("session {id}"))),
        }
    }

    /// Whether `session` has been idle for at least `timeout`.
    pub fn is_expired(&self, session: &Session, timeout: Duration) -> bool {
        session.is_expired_at(self.clock.now(), timeout)
    }

    /// Remove every session idle for at least `timeout` and notify listeners.
    /// Returns the removed ids.
    pub fn cleanup_expired(&self, timeout: Duration) -> Vec<SessionId> {
        let removed: Vec<SessionId> = {
            let mut sessions = self.sessions.lock();
            // Read the clock under the lock so a session touched concurrently
            // is judged against a time no earlier than its touch.
            let now = self.clock.now();
            let expired: Vec<SessionId> = sessions
                .values()
                .filter(|s| s.is_expired_at(now, timeout))
                .map(|s| s.id)
                .collect();
            for id in &expired {
                sessions.remove(id);
            }
            expired
        };

        if !removed.is_empty() {
            info!(count = removed.len(), "expired sessions removed");
            self.notify(&removed);
        }
        removed
    }

    /// Explicitly end a session. Listeners are notified even if the session
    /// was already gone. Returns whether it was present.
    pub fn clear(&self, id: &SessionId) -> bool {
        let existed = self.sessions.lock().remove(id).is_some();
        debug!(session = %id, existed, "session cleared");
        self.notify(std::slice::from_ref(id));
        existed
    }

    /// Number of tracked sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Ids of all tracked sessions.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.lock().keys().copied().collect()
    }

    fn notify(&self, ids: &[SessionId]) {
        let listeners = self.listeners.read().clone();
        for id in ids {
            for listener in &listeners {
                listener.on_session_removed(id);
            }
        }
    }
}
