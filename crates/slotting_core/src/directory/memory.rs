//! In-memory room/bin directory.

use crate::directory::{BinDirectory, DirectoryError, RoomDirectory};
use std::collections::BTreeMap;

/// Fixed room and bin tables, typically built once at startup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    rooms: BTreeMap<String, String>,
    bins: BTreeMap<String, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_room(mut self, room_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.rooms.insert(room_id.into(), name.into());
        self
    }

    pub fn with_bin(mut self, bin_id: impl Into<String>, label: impl Into<String>) -> Self {
        self.bins.insert(bin_id.into(), label.into());
        self
    }
}

impl RoomDirectory for InMemoryDirectory {
    fn resolve_room_name(&self, room_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.rooms.get(room_id).cloned())
    }
}

impl BinDirectory for InMemoryDirectory {
    fn resolve_bin_label(&self, bin_id: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.bins.get(bin_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryDirectory;
    use crate::directory::{BinDirectory, RoomDirectory};

    #[test]
    fn resolves_known_ids_only() {
        let directory = InMemoryDirectory::new()
            .with_room("R1", "Cold Room")
            .with_bin("B1", "Bay 1");

        assert_eq!(
            directory.resolve_room_name("R1").unwrap().as_deref(),
            Some("Cold Room")
        );
        assert_eq!(directory.resolve_room_name("R2").unwrap(), None);
        assert_eq!(
            directory.resolve_bin_label("B1").unwrap().as_deref(),
            Some("Bay 1")
        );
        assert_eq!(directory.resolve_bin_label("B9").unwrap(), None);
    }
}
