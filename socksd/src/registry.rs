use crate::Destination;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Stable identifier of one accepted connection.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActiveSession {
    pub id: SessionId,
    pub peer_addr: Option<SocketAddr>,
    pub destination: Destination,
}

/// Sessions that have started CONNECT processing. Bookkeeping only; nothing
/// consults it before admitting a connection.
#[derive(Clone, Debug, Default)]
pub struct SessionRegistry {
    next_id: Arc<AtomicU64>,
    sessions: Arc<Mutex<BTreeMap<SessionId, ActiveSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    ///
    ///
    ///
    pub fn next_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Adds a session. It is removed again when the returned guard drops.
    pub fn register(
        &self,
        session: ActiveSession,
    ) -> RegistryGuard {
        let id = session.id;
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id, session);
        }

        RegistryGuard {
            id,
            sessions: Arc::clone(&self.sessions),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active sessions, oldest first.
    pub fn snapshot(&self) -> Vec<ActiveSession> {
        self.sessions
            .lock()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct RegistryGuard {
    id: SessionId,
    sessions: Arc<Mutex<BTreeMap<SessionId, ActiveSession>>>,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(&self.id);
        }
    }
}
