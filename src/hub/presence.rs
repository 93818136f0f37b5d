use indexmap::IndexMap;

use super::session::ConnId;

/// Online display names keyed by connection, in registration order.
///
/// Names are not deduplicated: two connections may register the same name.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: IndexMap<ConnId, String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or rename the entry for `conn`. A rename keeps its position.
    pub fn register(&mut self, conn: ConnId, name: String) {
        self.online.insert(conn, name);
    }

    /// Returns `true` if an entry was removed
    pub fn remove(&mut self, conn: ConnId) -> bool {
        self.online.shift_remove(&conn).is_some()
    }

    #[cfg(test)]
    pub fn contains(&self, conn: ConnId) -> bool {
        self.online.contains_key(&conn)
    }

    pub fn names(&self) -> Vec<String> {
        self.online.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }
}
