use indexmap::IndexMap;

use super::session::ConnId;

/// Connections currently composing a chat message
#[derive(Debug, Default)]
pub struct TypingTracker {
    typing: IndexMap<ConnId, String>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, conn: ConnId, name: String) {
        self.typing.insert(conn, name);
    }

    /// Returns `true` if `conn` was typing
    pub fn stop(&mut self, conn: ConnId) -> bool {
        self.typing.shift_remove(&conn).is_some()
    }

    /// Update the name of a typing connection. Returns `true` if it was typing.
    pub fn rename(&mut self, conn: ConnId, name: &str) -> bool {
        match self.typing.get_mut(&conn) {
            Some(current) if current != name => {
                *current = name.to_string();
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn connections(&self) -> impl Iterator<Item = &ConnId> {
        self.typing.keys()
    }

    pub fn names(&self) -> Vec<String> {
        self.typing.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.typing.len()
    }
}
