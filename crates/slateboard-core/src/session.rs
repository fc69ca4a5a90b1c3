//! Client-side sync engine.
//!
//! [`BoardSession`] owns the local replica of one room, originates edits,
//! and buffers outgoing frames while the transport is down. It is an
//! explicit context object with a construct/teardown lifecycle; nothing in
//! here is global. The transport itself lives in [`crate::sync`] — the
//! session only produces and consumes text frames.

use log::warn;
use std::collections::VecDeque;

use crate::object::{DisplayObject, ObjectId};
use crate::protocol::{FieldKind, Message, ProtocolError};
use crate::store::ObjectStore;

/// Local replica plus edit origination for one client in one room.
///
/// The replica is best-effort and eventually converging: every inbound
/// frame goes through the same revision-gated merge the server uses, and a
/// transport loss throws the whole replica away in anticipation of the
/// server's connect-time full push.
pub struct BoardSession {
    /// Identifier of this client, stamped as `owner` on created objects.
    client_id: String,
    store: ObjectStore,
    selected: Vec<ObjectId>,
    active: Option<ObjectId>,
    transport_open: bool,
    /// Strictly ordered outbound buffer; drained FIFO once the transport
    /// is usable.
    pending: VecDeque<String>,
}

impl BoardSession {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            store: ObjectStore::new(),
            selected: Vec::new(),
            active: None,
            transport_open: false,
            pending: VecDeque::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current local replica, for rendering and hit-testing.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Whether the transport is currently usable.
    pub fn is_connected(&self) -> bool {
        self.transport_open
    }

    // --- Edit origination ---

    /// Insert a freshly created object (rev 0) into the local replica and
    /// emit a wholesale update for it. Returns the object's id.
    pub fn submit_create(&mut self, object: DisplayObject) -> ObjectId {
        let id = object.id.clone();
        self.enqueue(Message::full_update(vec![object.clone()]));
        self.store.insert(object);
        id
    }

    /// Create an object that is still being interactively drawn: the
    /// transient flag is set and the object becomes the active one.
    pub fn begin_active(&mut self, mut object: DisplayObject) -> ObjectId {
        object.active_rendering = true;
        let id = self.submit_create(object);
        self.active = Some(id.clone());
        id
    }

    pub fn active_object(&self) -> Option<&ObjectId> {
        self.active.as_ref()
    }

    /// Finalize the active object's gesture: normalize its geometry, clear
    /// the transient flag, bump the revision, and emit a wholesale update.
    pub fn finish_active(&mut self) {
        let Some(id) = self.active.take() else {
            return;
        };
        let Some(object) = self.store.get_mut(&id) else {
            return;
        };
        object.rev += 1;
        object.finish_construction();
        let object = object.clone();
        self.enqueue(Message::full_update(vec![object]));
    }

    /// Apply a field-level edit to the named local objects: bump each
    /// object's revision by exactly one and emit a field-subset update.
    /// Ids not present locally are skipped with a warning.
    pub fn submit_field_update(&mut self, kinds: &[FieldKind], ids: &[ObjectId]) {
        let mut touched = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get_mut(id) {
                Some(object) => {
                    object.rev += 1;
                    touched.push(id.clone());
                }
                None => warn!("field update for unknown local object {}", id),
            }
        }
        if touched.is_empty() {
            return;
        }
        let objects: Vec<&DisplayObject> = touched
            .iter()
            .filter_map(|id| self.store.get(id))
            .collect();
        let msg = Message::field_update(kinds, &objects);
        self.enqueue(msg);
    }

    /// Remove objects locally and emit a delete. Removal is optimistic:
    /// it happens before transmission and has no rollback path.
    pub fn submit_delete(&mut self, ids: &[ObjectId]) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.store.remove(id);
            self.selected.retain(|sel| sel != id);
            if self.active.as_ref() == Some(id) {
                self.active = None;
            }
        }
        self.enqueue(Message::delete(ids.to_vec()));
    }

    /// Send a catalog of the local store so the receiver can detect
    /// missing or stale objects. The server currently does not answer
    /// these; the path exists for forward compatibility.
    pub fn submit_sync(&mut self) {
        self.enqueue(Message::sync_catalog(self.store.catalog()));
    }

    // --- Selection (the UI layer drives this) ---

    pub fn select(&mut self, id: ObjectId) {
        if !self.selected.contains(&id) {
            self.selected.push(id);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn selected(&self) -> &[ObjectId] {
        &self.selected
    }

    // --- Inbound ---

    /// Apply one received frame to the local replica. Merge refusals are
    /// reported as warnings; they are not errors for the connection.
    pub fn handle_frame(&mut self, frame: &str) -> Result<(), ProtocolError> {
        match Message::decode(frame)? {
            Message::Update { types, object_data } => {
                for record in &object_data {
                    if let Err(err) = self.store.apply(&types, record) {
                        warn!("{}", err);
                    }
                }
            }
            Message::Delete { object_data } => {
                for id in &object_data {
                    self.store.remove(id);
                    self.selected.retain(|sel| sel != id);
                    if self.active.as_ref() == Some(id) {
                        self.active = None;
                    }
                }
            }
            Message::Sync { .. } => {
                // Only meaningful client-to-server; ignore if relayed here.
                warn!("ignoring relayed sync catalog");
            }
            Message::Error { message } => {
                warn!("server rejected a frame: {}", message);
            }
        }
        Ok(())
    }

    // --- Transport lifecycle ---

    /// Mark the transport usable and drain the buffered frames in FIFO
    /// order for immediate transmission.
    pub fn transport_opened(&mut self) -> Vec<String> {
        self.transport_open = true;
        self.pending.drain(..).collect()
    }

    /// Mark the transport unusable and discard the entire local replica:
    /// objects, selection, and active-edit state. A reconnect is expected
    /// to restore parity via the server's full push.
    pub fn transport_closed(&mut self) {
        self.transport_open = false;
        self.store.clear();
        self.selected.clear();
        self.active = None;
    }

    /// Frames ready to hand to an open transport, FIFO. Empty while the
    /// transport is down (frames keep accumulating instead).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        if !self.transport_open {
            return Vec::new();
        }
        self.pending.drain(..).collect()
    }

    fn enqueue(&mut self, msg: Message) {
        match msg.encode() {
            Ok(frame) => self.pending.push_back(frame),
            Err(err) => warn!("dropping unencodable frame: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectData, Rect};

    fn connected_session() -> BoardSession {
        let mut session = BoardSession::new("alice");
        let flushed = session.transport_opened();
        assert!(flushed.is_empty());
        session
    }

    #[test]
    fn test_create_emits_full_update() {
        let mut session = connected_session();
        let obj = DisplayObject::rectangle("alice", [10.0, 10.0], "black", 4.0);
        let id = session.submit_create(obj);
        assert!(session.store().contains(&id));

        let frames = session.take_outgoing();
        assert_eq!(frames.len(), 1);
        let json: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(json["action"], "update");
        assert_eq!(json["types"], serde_json::json!(["all"]));
        assert_eq!(json["objectData"][0]["rev"], 0);
    }

    #[test]
    fn test_field_update_bumps_rev_by_one() {
        let mut session = connected_session();
        let id = session.submit_create(DisplayObject::rectangle(
            "alice",
            [10.0, 10.0],
            "black",
            4.0,
        ));
        session.take_outgoing();

        session.submit_field_update(&[FieldKind::Rect], &[id.clone()]);
        assert_eq!(session.store().get(&id).unwrap().rev, 1);

        let frames = session.take_outgoing();
        let json: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(json["types"], serde_json::json!(["rect"]));
        assert_eq!(json["objectData"][0]["rev"], 1);
    }

    #[test]
    fn test_delete_is_applied_locally_before_send() {
        let mut session = connected_session();
        let id = session.submit_create(DisplayObject::circle("alice", [0.0, 0.0], "red", 2.0));
        session.select(id.clone());
        session.take_outgoing();

        session.submit_delete(std::slice::from_ref(&id));
        assert!(!session.store().contains(&id));
        assert!(session.selected().is_empty());

        let frames = session.take_outgoing();
        let json: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(json["action"], "delete");
        assert_eq!(json["objectData"][0], id.as_str());
    }

    #[test]
    fn test_offline_frames_flush_fifo_on_open() {
        let mut session = BoardSession::new("alice");
        let a = session.submit_create(DisplayObject::marker("alice", [0.0, 0.0], "black", 4.0));
        session.submit_field_update(&[FieldKind::Weight], &[a.clone()]);
        session.submit_delete(std::slice::from_ref(&a));

        // Transport down: nothing to send yet.
        assert!(session.take_outgoing().is_empty());

        let frames = session.transport_opened();
        assert_eq!(frames.len(), 3);
        let actions: Vec<String> = frames
            .iter()
            .map(|f| {
                let json: serde_json::Value = serde_json::from_str(f).unwrap();
                json["action"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(actions, ["update", "update", "delete"]);
    }

    #[test]
    fn test_transport_close_discards_replica() {
        let mut session = connected_session();
        let id = session.begin_active(DisplayObject::marker("alice", [0.0, 0.0], "black", 4.0));
        session.select(id.clone());
        session.take_outgoing();

        session.transport_closed();
        assert!(!session.is_connected());
        assert!(session.store().is_empty());
        assert!(session.selected().is_empty());
        assert!(session.active_object().is_none());
    }

    #[test]
    fn test_inbound_update_and_delete() {
        let mut session = connected_session();
        let obj = DisplayObject::marker("bob", [0.0, 0.0], "blue", 2.0);
        let id = obj.id.clone();
        session
            .handle_frame(&Message::full_update(vec![obj]).encode().unwrap())
            .unwrap();
        assert!(session.store().contains(&id));

        session
            .handle_frame(&Message::delete(vec![id.clone()]).encode().unwrap())
            .unwrap();
        assert!(!session.store().contains(&id));
    }

    #[test]
    fn test_inbound_stale_update_is_ignored_not_fatal() {
        let mut session = connected_session();
        let mut obj = DisplayObject::rectangle("bob", [0.0, 0.0], "blue", 2.0);
        obj.rev = 3;
        let id = obj.id.clone();
        session
            .handle_frame(&Message::full_update(vec![obj.clone()]).encode().unwrap())
            .unwrap();

        obj.rev = 2;
        obj.rect = Rect([9.0, 9.0, 9.0, 9.0]);
        let stale = Message::field_update(&[FieldKind::Rect], &[&obj]).encode().unwrap();
        session.handle_frame(&stale).unwrap();
        assert_eq!(session.store().get(&id).unwrap().rect, Rect::at([0.0, 0.0]));
        assert_eq!(session.store().get(&id).unwrap().rev, 3);
    }

    #[test]
    fn test_malformed_frame_is_a_local_error() {
        let mut session = connected_session();
        assert!(session.handle_frame("{nonsense").is_err());
        // session stays usable
        assert!(session.is_connected());
    }

    #[test]
    fn test_finish_active_normalizes_and_resends() {
        let mut session = connected_session();
        let id = session.begin_active(DisplayObject::marker("alice", [10.0, 10.0], "black", 4.0));
        if let Some(obj) = session.store.get_mut(&id) {
            if let Some(ObjectData::Points(points)) = &mut obj.data {
                points.push([4.0, 20.0]);
            }
        }
        session.take_outgoing();

        session.finish_active();
        assert!(session.active_object().is_none());
        let stored = session.store().get(&id).unwrap();
        assert!(!stored.active_rendering);
        assert_eq!(stored.rect, Rect([4.0, 10.0, 10.0, 20.0]));
        // Every locally originated mutation bumps the revision.
        assert_eq!(stored.rev, 1);

        let frames = session.take_outgoing();
        let json: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(json["types"], serde_json::json!(["all"]));
        assert_eq!(json["objectData"][0]["rev"], 1);
        assert!(json["objectData"][0].get("activeRendering").is_none());
    }

    #[test]
    fn test_inbound_server_error_is_logged_not_fatal() {
        let mut session = connected_session();
        let id = session.submit_create(DisplayObject::line("alice", [0.0, 0.0], "black", 1.0));
        session.take_outgoing();

        session
            .handle_frame(&Message::error("malformed frame").encode().unwrap())
            .unwrap();
        assert!(session.store().contains(&id));
        assert!(session.is_connected());
    }

    #[test]
    fn test_sync_catalog_lists_local_store() {
        let mut session = connected_session();
        let a = session.submit_create(DisplayObject::line("alice", [0.0, 0.0], "black", 1.0));
        session.submit_field_update(&[FieldKind::Weight], &[a.clone()]);
        session.take_outgoing();

        session.submit_sync();
        let frames = session.take_outgoing();
        let json: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(json["action"], "sync");
        assert_eq!(json["data"], serde_json::json!([[a.as_str(), 1]]));
    }
}
