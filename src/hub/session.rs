use std::fmt;
use uuid::Uuid;

/// Opaque identity of one live connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live connection and the display name it registered, if any
#[derive(Clone, Debug)]
pub struct Session {
    pub id: ConnId,
    pub display_name: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: ConnId::new(),
            display_name: None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
