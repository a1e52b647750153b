//! Live per-connection session records.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;

/// Opaque id of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Monotonic session id allocator.
#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    next: AtomicU64,
}

impl SessionIdGenerator {
    pub fn next(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Items queued to a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A pre-serialized JSON frame.
    Frame(String),
    /// A transport-level ping from the liveness sweep.
    Ping,
    /// Flush the close handshake and tear the connection down.
    Close,
}

/// A registered peer. Owned exclusively by the hub's session table;
/// everything else refers to sessions by id or identity.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub username: String,
    pub ip: String,
    pub is_admin: bool,
    /// ISO-8601 instant of registration, as shown in rosters.
    pub joined_at: String,
    pub last_ping: Instant,
    pub tx: mpsc::Sender<Outbound>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let generator = SessionIdGenerator::default();
        let a = generator.next();
        let b = generator.next();
        assert_ne!(a, b);
        assert!(a < b);
    }
}
