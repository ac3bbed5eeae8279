//! Session identity
//!
//! Every accepted socket gets a `SessionId` before it says anything, so the
//! registry can track a connection that has not logged in yet.

use std::fmt;

use uuid::Uuid;

/// Identity of one accepted connection
///
/// Stable for the life of the socket and never reused, unlike the username,
/// which is bound late and released on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
