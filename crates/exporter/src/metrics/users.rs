use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::parser::{KnownField, LogFields};

/// How often a pipeline prunes its tracker.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(15);

/// Composite client identity: `remote_addr::http_user_agent`.
///
/// Both parts must be present and non-empty.
pub fn user_identity(fields: &LogFields) -> Option<String> {
    let addr = fields.known(KnownField::RemoteAddr).filter(|v| !v.is_empty())?;
    let agent = fields.known(KnownField::HttpUserAgent).filter(|v| !v.is_empty())?;
    Some(format!("{}::{}", addr, agent))
}

/// Last-seen times of the distinct users of one pipeline.
#[derive(Debug)]
pub struct UserTracker {
    window: Duration,
    users: HashMap<String, Instant>,
}

impl UserTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            users: HashMap::new(),
        }
    }

    /// Record a sighting and return the number of tracked users.
    pub fn observe(&mut self, identity: String, now: Instant) -> usize {
        self.users.insert(identity, now);
        self.users.len()
    }

    /// Evict users not seen for longer than the window.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.users.len();
        let window = self.window;
        self.users
            .retain(|_, seen| now.saturating_duration_since(*seen) <= window);
        before - self.users.len()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
