use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tracing::{debug, warn};

use crate::session::{ChatSession, ConnId, SessionError};

/// Process-wide index of live sessions by connection id.
///
/// The registry only holds weak references: a session stays alive as long as
/// its callers hold it, and a dropped or closed session frees its id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<ConnId, Weak<ChatSession>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnId, Weak<ChatSession>>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnId, Weak<ChatSession>>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a session. Fails if another open session already holds the id;
    /// a stale entry for a dropped or closed session is replaced.
    pub fn add(&self, session: &Arc<ChatSession>) -> Result<(), SessionError> {
        let conn_id = session.conn_id();
        let mut sessions = self.write();

        if let Some(existing) = sessions.get(&conn_id).and_then(Weak::upgrade) {
            if !existing.is_closed() {
                warn!(conn_id, "Rejected duplicate connection id");
                return Err(SessionError::DuplicateConnection(conn_id));
            }
            debug!(conn_id, "Replacing closed connection");
        }

        sessions.insert(conn_id, Arc::downgrade(session));
        Ok(())
    }

    pub fn get(&self, conn_id: ConnId) -> Option<Arc<ChatSession>> {
        self.read().get(&conn_id).and_then(Weak::upgrade)
    }

    pub fn remove(&self, conn_id: ConnId) -> Option<Arc<ChatSession>> {
        self.write().remove(&conn_id).and_then(|weak| weak.upgrade())
    }

    /// Ids of sessions that are still alive and open, in ascending order.
    pub fn live_ids(&self) -> Vec<ConnId> {
        let mut ids: Vec<ConnId> = self
            .read()
            .iter()
            .filter(|(_, weak)| weak.upgrade().is_some_and(|s| !s.is_closed()))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.live_ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries whose session no longer exists. Returns how many went.
    pub fn prune(&self) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, weak| weak.strong_count() > 0);
        before - sessions.len()
    }
}
