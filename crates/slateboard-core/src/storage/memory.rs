//! In-memory room snapshot storage, mainly for tests.

use super::{BoxFuture, Storage, StorageError, StorageResult, sanitize_snapshot};
use crate::store::RoomSnapshot;
use std::collections::HashMap;
use std::sync::RwLock;

/// Volatile storage backed by a map. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
    rooms: RwLock<HashMap<String, RoomSnapshot>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn save(&self, room: &str, snapshot: &RoomSnapshot) -> BoxFuture<'_, StorageResult<()>> {
        let room = room.to_string();
        let snapshot = sanitize_snapshot(snapshot);
        Box::pin(async move {
            self.rooms
                .write()
                .map_err(|_| StorageError::Io("storage lock poisoned".to_string()))?
                .insert(room, snapshot);
            Ok(())
        })
    }

    fn load(&self, room: &str) -> BoxFuture<'_, StorageResult<RoomSnapshot>> {
        let room = room.to_string();
        Box::pin(async move {
            self.rooms
                .read()
                .map_err(|_| StorageError::Io("storage lock poisoned".to_string()))?
                .get(&room)
                .cloned()
                .ok_or(StorageError::NotFound(room))
        })
    }

    fn delete(&self, room: &str) -> BoxFuture<'_, StorageResult<()>> {
        let room = room.to_string();
        Box::pin(async move {
            self.rooms
                .write()
                .map_err(|_| StorageError::Io("storage lock poisoned".to_string()))?
                .remove(&room);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            Ok(self
                .rooms
                .read()
                .map_err(|_| StorageError::Io("storage lock poisoned".to_string()))?
                .keys()
                .cloned()
                .collect())
        })
    }

    fn exists(&self, room: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let room = room.to_string();
        Box::pin(async move {
            Ok(self
                .rooms
                .read()
                .map_err(|_| StorageError::Io("storage lock poisoned".to_string()))?
                .contains_key(&room))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DisplayObject;
    use pollster::block_on;

    #[test]
    fn test_memory_roundtrip() {
        let storage = MemoryStorage::new();
        let obj = DisplayObject::circle("alice", [0.0, 0.0], "blue", 2.0);
        let snapshot: RoomSnapshot = [(obj.id.clone(), obj)].into_iter().collect();

        block_on(storage.save("room", &snapshot)).unwrap();
        assert_eq!(block_on(storage.load("room")).unwrap(), snapshot);

        block_on(storage.delete("room")).unwrap();
        assert!(matches!(
            block_on(storage.load("room")),
            Err(StorageError::NotFound(_))
        ));
    }
}
