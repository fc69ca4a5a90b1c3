//! Storage abstraction for room persistence.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::store::RoomSnapshot;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("room not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async storage operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for room snapshot backends.
///
/// A snapshot is the whole id-to-object mapping of one room; saves are
/// wholesale overwrites, there is no incremental persistence. Implementors
/// must strip the transient `activeRendering` flag before writing (see
/// [`sanitize_snapshot`]).
pub trait Storage: Send + Sync {
    /// Overwrite a room's snapshot.
    fn save(&self, room: &str, snapshot: &RoomSnapshot) -> BoxFuture<'_, StorageResult<()>>;

    /// Load a room's snapshot.
    fn load(&self, room: &str) -> BoxFuture<'_, StorageResult<RoomSnapshot>>;

    /// Delete a room's snapshot.
    fn delete(&self, room: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// List all stored room identifiers.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;

    /// Check if a room snapshot exists.
    fn exists(&self, room: &str) -> BoxFuture<'_, StorageResult<bool>>;
}

/// Copy of a snapshot with the transient live-construction flag cleared.
/// Objects mid-gesture are persisted, but never with the flag set.
pub fn sanitize_snapshot(snapshot: &RoomSnapshot) -> RoomSnapshot {
    snapshot
        .iter()
        .map(|(id, obj)| {
            let mut obj = obj.clone();
            obj.active_rendering = false;
            (id.clone(), obj)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DisplayObject;

    #[test]
    fn test_sanitize_clears_active_flag() {
        let mut obj = DisplayObject::marker("alice", [0.0, 0.0], "black", 4.0);
        obj.active_rendering = true;
        let id = obj.id.clone();
        let snapshot: RoomSnapshot = [(id.clone(), obj)].into_iter().collect();

        let clean = sanitize_snapshot(&snapshot);
        assert!(!clean[&id].active_rendering);
        // the object itself is kept
        assert_eq!(clean.len(), 1);
    }
}
