//! Registry of active call sessions, keyed by call SID.

use std::sync::Arc;

use dashmap::{DashMap, Entry};
use tracing::{debug, warn};

use super::CallSession;

/// Concurrent map of active calls.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<CallSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. A duplicate call SID is rejected and the
    /// existing session kept; the carrier should never reuse a SID while
    /// a call is live.
    pub fn insert(&self, session: Arc<CallSession>) -> bool {
        let call_sid = session.call_sid.clone();
        match self.sessions.entry(call_sid) {
            Entry::Occupied(entry) => {
                warn!("Rejected duplicate session for call {}", entry.key());
                false
            }
            Entry::Vacant(entry) => {
                debug!("Registered session for call {}", entry.key());
                entry.insert(session);
                true
            }
        }
    }

    pub fn get(&self, call_sid: &str) -> Option<Arc<CallSession>> {
        self.sessions.get(call_sid).map(|entry| entry.clone())
    }

    /// Remove and return the session. Safe to call twice; the second call
    /// returns `None`.
    pub fn remove(&self, call_sid: &str) -> Option<Arc<CallSession>> {
        let removed = self.sessions.remove(call_sid).map(|(_, session)| session);
        if removed.is_some() {
            debug!("Removed session for call {}", call_sid);
        }
        removed
    }

    /// Snapshot of every active session, used to finalize remaining calls
    /// on server shutdown.
    pub fn sessions(&self) -> Vec<Arc<CallSession>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
