//! File-based room snapshot storage.

use super::{BoxFuture, Storage, StorageError, StorageResult, sanitize_snapshot};
use crate::store::RoomSnapshot;
use log::warn;
use std::fs;
use std::path::PathBuf;

/// One JSON file per room in a base directory.
///
/// Saves are synchronous whole-file overwrites; the last completed write
/// is the only durability guarantee.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create file storage rooted at `base_path`, creating the directory
    /// if needed.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn room_path(&self, room: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", encode_room_id(room)))
    }
}

/// Filesystem-safe encoding of a room identifier. Alphanumerics and `-`
/// pass through; every other byte becomes `_` plus two hex digits, so
/// distinct rooms never share a file and [`Storage::list`] can recover
/// the original identifier.
fn encode_room_id(room: &str) -> String {
    let mut out = String::with_capacity(room.len());
    for byte in room.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("_{:02x}", byte)),
        }
    }
    out
}

/// Inverse of [`encode_room_id`]; `None` for file names not produced by it.
fn decode_room_id(name: &str) -> Option<String> {
    let mut bytes = name.bytes();
    let mut out = Vec::with_capacity(name.len());
    while let Some(byte) = bytes.next() {
        if byte == b'_' {
            let pair = [bytes.next()?, bytes.next()?];
            let pair = std::str::from_utf8(&pair).ok()?;
            out.push(u8::from_str_radix(pair, 16).ok()?);
        } else {
            out.push(byte);
        }
    }
    String::from_utf8(out).ok()
}

impl Storage for FileStorage {
    fn save(&self, room: &str, snapshot: &RoomSnapshot) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.room_path(room);
        let json = serde_json::to_string(&sanitize_snapshot(snapshot));
        Box::pin(async move {
            let json = json.map_err(|e| StorageError::Serialization(e.to_string()))?;
            fs::write(&path, json)
                .map_err(|e| StorageError::Io(format!("failed to write {}: {}", path.display(), e)))
        })
    }

    fn load(&self, room: &str) -> BoxFuture<'_, StorageResult<RoomSnapshot>> {
        let path = self.room_path(room);
        let room = room.to_string();
        Box::pin(async move {
            if !path.exists() {
                return Err(StorageError::NotFound(room));
            }
            let json = fs::read_to_string(&path)
                .map_err(|e| StorageError::Io(format!("failed to read {}: {}", path.display(), e)))?;
            serde_json::from_str(&json).map_err(|e| {
                StorageError::Serialization(format!("failed to parse {}: {}", path.display(), e))
            })
        })
    }

    fn delete(&self, room: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.room_path(room);
        Box::pin(async move {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::Io(format!("failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        let base = self.base_path.clone();
        Box::pin(async move {
            if !base.exists() {
                return Ok(vec![]);
            }
            let entries = fs::read_dir(&base)
                .map_err(|e| StorageError::Io(format!("failed to read directory: {}", e)))?;
            let mut rooms = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        match decode_room_id(stem) {
                            Some(room) => rooms.push(room),
                            None => {
                                warn!("skipping unrecognized snapshot file {}", path.display())
                            }
                        }
                    }
                }
            }
            Ok(rooms)
        })
    }

    fn exists(&self, room: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let path = self.room_path(room);
        Box::pin(async move { Ok(path.exists()) })
    }
}
