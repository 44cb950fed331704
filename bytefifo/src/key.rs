use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a calling client (a process id in the device model)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId {
    id: u32,
}

impl ClientId {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl From<u32> for ClientId {
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

/// Registry placement of a buffer
///
/// `Shared` sorts before every client key, so a teardown drain visits the
/// shared buffer first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClientKey {
    Shared,
    Client(ClientId),
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKey::Shared => write!(f, "shared buffer"),
            ClientKey::Client(client) => write!(f, "client {}", client.id()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Thread-safe session id generator
#[derive(Debug)]
pub struct IdGen {
    next_id: AtomicU64,
}

impl IdGen {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the next unique session id
    pub fn get_next(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}
