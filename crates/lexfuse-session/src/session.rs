use chrono::{DateTime, Utc};
use lexfuse_core::clock::has_elapsed;
use lexfuse_core::SessionId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One isolated interaction context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unguessable identifier; also the mandatory prefix of its cache keys.
    pub id: SessionId,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last time the session was used.
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// A fresh session with a newly generated id.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            created_at: now,
            last_activity: now,
        }
    }

    /// Record activity at `now`. Never moves `last_activity` backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Whether the session has been idle for at least `timeout` at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        has_elapsed(self.last_activity, now, timeout)
    }
}
