//! Room state: authoritative stores, merge pipeline, fan-out.

use dashmap::DashMap;
use slateboard_core::object::DisplayObject;
use slateboard_core::protocol::Message;
use slateboard_core::storage::Storage;
use slateboard_core::store::ObjectStore;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{error, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// Identifier of one live connection, used to suppress echo on broadcast.
pub type ConnId = Uuid;

/// One room: the authoritative object store plus its broadcast channel.
///
/// The store mutex is the room's serialization point: merge, persist, and
/// broadcast happen as one atomic step under it, so on-disk state and
/// broadcast order can never diverge from merge order.
pub struct Room {
    store: Mutex<ObjectStore>,
    tx: broadcast::Sender<(ConnId, String)>,
}

impl Room {
    fn new(store: ObjectStore) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            store: Mutex::new(store),
            tx,
        }
    }

    pub fn store(&self) -> &Mutex<ObjectStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(ConnId, String)> {
        self.tx.subscribe()
    }

    /// Subscribe and read the snapshot as one step under the store lock.
    /// Broadcasts are sent under the same lock, so every frame merged
    /// before this call is in the snapshot and every frame merged after
    /// arrives on the receiver — never both.
    pub async fn attach(&self) -> (broadcast::Receiver<(ConnId, String)>, Vec<DisplayObject>) {
        let store = self.store.lock().await;
        let rx = self.tx.subscribe();
        (rx, store.objects().cloned().collect())
    }
}

/// Shared application state.
pub struct AppState {
    rooms: DashMap<String, Arc<Room>>,
    storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            rooms: DashMap::new(),
            storage,
        }
    }

    /// Load every persisted room snapshot into memory. Called once at
    /// startup; unparseable snapshots are skipped with an error log.
    pub async fn load_rooms(&self) -> usize {
        let rooms = match self.storage.list().await {
            Ok(rooms) => rooms,
            Err(e) => {
                error!("failed to list stored rooms: {}", e);
                return 0;
            }
        };
        let mut loaded = 0;
        for room_id in rooms {
            match self.storage.load(&room_id).await {
                Ok(snapshot) => {
                    self.rooms.insert(
                        room_id,
                        Arc::new(Room::new(ObjectStore::from_snapshot(snapshot))),
                    );
                    loaded += 1;
                }
                Err(e) => error!("failed to load room {}: {}", room_id, e),
            }
        }
        loaded
    }

    /// Get a room, creating it empty if this is its first connection.
    pub fn room(&self, room_id: &str) -> Arc<Room> {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Room::new(ObjectStore::new())))
            .clone()
    }

    /// Process one inbound frame for a room: merge into the authoritative
    /// store, persist if anything mutated, then forward the original frame
    /// verbatim to every other connection — all under the room's lock.
    ///
    /// A malformed frame is a local error for the sending connection: it
    /// is logged, dropped without touching the room, and answered with an
    /// error frame returned to the caller for direct delivery.
    pub async fn process_frame(
        &self,
        room_id: &str,
        room: &Room,
        from: ConnId,
        frame: &str,
    ) -> Option<String> {
        let msg = match Message::decode(frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("connection {}: {}", from, e);
                return Message::error(e.to_string()).encode().ok();
            }
        };

        let mut store = room.store.lock().await;
        let mutated = match &msg {
            Message::Update { types, object_data } => {
                let mut any = false;
                for record in object_data {
                    match store.apply(types, record) {
                        Ok(()) => any = true,
                        Err(e) => warn!("room {}: {}", room_id, e),
                    }
                }
                any
            }
            Message::Delete { object_data } => {
                let mut any = false;
                for id in object_data {
                    any |= store.remove(id).is_some();
                }
                any
            }
            Message::Sync { data } => {
                // Reconciliation is not implemented; the catalog is
                // received and dropped.
                warn!(
                    "room {}: sync catalog with {} entries not supported",
                    room_id,
                    data.len()
                );
                false
            }
            Message::Error { message } => {
                warn!("connection {}: unexpected error frame: {}", from, message);
                false
            }
        };

        if mutated {
            // In-memory state is already updated, so a failed write is a
            // temporary durability gap, not a rejected edit.
            if let Err(e) = self.storage.save(room_id, store.snapshot()).await {
                error!("failed to persist room {}: {}", room_id, e);
            }
        }

        // Exact pass-through, no re-serialization. Send while still
        // holding the lock so receivers observe merge order.
        let _ = room.tx.send((from, frame.to_string()));
        None
    }
}
