//! Session identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// In-process correlation key for a conversion session. Distinct from the
/// timestamp stamped into a session's on-disk filename (§6): this is the
/// identifier the message bus and event bus use to correlate a burst of
/// activity back to one session, and it persists across a session's
/// lifetime even if its JSON file is rewritten many times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
