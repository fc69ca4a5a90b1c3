//! Wire protocol for board synchronization.
//!
//! One JSON object per text frame, discriminated by `action`:
//!
//! ```json
//! { "action": "update", "types": ["rect"], "objectData": [{ "id": "...", "rev": 1, "rect": [10,10,50,40] }] }
//! { "action": "delete", "objectData": ["..."] }
//! { "action": "sync",   "data": [["...", 3]] }
//! ```
//!
//! An update whose `types` contains `all` carries complete object records
//! and means "replace wholesale"; any other kind list carries partial
//! records with only `id`, `rev`, and the named fields.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::object::{DisplayObject, ObjectData, ObjectId, Point, Rect};

/// The subset of an object's attributes carried by a delta update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "color")]
    Color,
    #[serde(rename = "weight")]
    Weight,
    #[serde(rename = "rect")]
    Rect,
    /// Carries only the newly appended point(s); the receiver must
    /// concatenate, never replace.
    #[serde(rename = "dataAdd")]
    DataAdd,
    /// Carries the complete replacement point sequence.
    #[serde(rename = "dataMod")]
    DataMod,
}

/// Partial record for a field-subset update: `id`, `rev`, and exactly the
/// fields named by the enclosing kind list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPatch {
    pub id: ObjectId,
    pub rev: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Point>>,
}

/// Element of an update's `objectData` list: a complete record for
/// `all`-kind updates, a partial one otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectRecord {
    Full(DisplayObject),
    Patch(ObjectPatch),
}

impl ObjectRecord {
    pub fn id(&self) -> &ObjectId {
        match self {
            ObjectRecord::Full(obj) => &obj.id,
            ObjectRecord::Patch(patch) => &patch.id,
        }
    }

    pub fn rev(&self) -> u64 {
        match self {
            ObjectRecord::Full(obj) => obj.rev,
            ObjectRecord::Patch(patch) => patch.rev,
        }
    }

    pub fn color(&self) -> Option<&str> {
        match self {
            ObjectRecord::Full(obj) => obj.color.as_deref(),
            ObjectRecord::Patch(patch) => patch.color.as_deref(),
        }
    }

    pub fn weight(&self) -> Option<f64> {
        match self {
            ObjectRecord::Full(obj) => obj.weight,
            ObjectRecord::Patch(patch) => patch.weight,
        }
    }

    pub fn rect(&self) -> Option<Rect> {
        match self {
            ObjectRecord::Full(obj) => Some(obj.rect),
            ObjectRecord::Patch(patch) => patch.rect,
        }
    }

    pub fn points(&self) -> Option<&[Point]> {
        match self {
            ObjectRecord::Full(obj) => obj.data.as_ref().and_then(ObjectData::points),
            ObjectRecord::Patch(patch) => patch.data.as_deref(),
        }
    }
}

/// A single logical event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Message {
    /// Update or add object(s).
    Update {
        types: Vec<FieldKind>,
        #[serde(rename = "objectData")]
        object_data: Vec<ObjectRecord>,
    },
    /// Delete object(s) unconditionally, no revision check.
    Delete {
        #[serde(rename = "objectData")]
        object_data: Vec<ObjectId>,
    },
    /// Client-to-server catalog of `[id, rev]` pairs.
    Sync { data: Vec<(ObjectId, u64)> },
    /// Server-to-client notice that the last frame could not be
    /// processed. Informational only; the connection stays up.
    Error { message: String },
}

/// Wire protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(serde_json::Error),
    #[error("failed to encode frame: {0}")]
    Encode(serde_json::Error),
}

impl Message {
    /// Serialize to a single text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parse a received text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Malformed)
    }

    /// A wholesale-replace update carrying complete records. Used for new
    /// objects, gesture completion, and full resync.
    pub fn full_update(objects: Vec<DisplayObject>) -> Self {
        Message::Update {
            types: vec![FieldKind::All],
            object_data: objects.into_iter().map(ObjectRecord::Full).collect(),
        }
    }

    /// A field-subset update: each object is projected down to `id`, `rev`,
    /// and the named fields. `DataAdd` sends only the newest point.
    pub fn field_update(kinds: &[FieldKind], objects: &[&DisplayObject]) -> Self {
        let records = objects
            .iter()
            .map(|obj| {
                let mut patch = ObjectPatch {
                    id: obj.id.clone(),
                    rev: obj.rev,
                    color: None,
                    weight: None,
                    rect: None,
                    data: None,
                };
                for kind in kinds {
                    match kind {
                        FieldKind::Color => patch.color = obj.color.clone(),
                        FieldKind::Weight => patch.weight = obj.weight,
                        FieldKind::Rect => patch.rect = Some(obj.rect),
                        FieldKind::DataAdd => {
                            patch.data = obj
                                .data
                                .as_ref()
                                .and_then(ObjectData::points)
                                .and_then(|points| points.last())
                                .map(|last| vec![*last]);
                        }
                        FieldKind::DataMod => {
                            patch.data = obj
                                .data
                                .as_ref()
                                .and_then(ObjectData::points)
                                .map(<[Point]>::to_vec);
                        }
                        FieldKind::All => {}
                    }
                }
                ObjectRecord::Patch(patch)
            })
            .collect();
        Message::Update {
            types: kinds.to_vec(),
            object_data: records,
        }
    }

    pub fn delete(ids: Vec<ObjectId>) -> Self {
        Message::Delete { object_data: ids }
    }

    pub fn sync_catalog(catalog: Vec<(ObjectId, u64)>) -> Self {
        Message::Sync { data: catalog }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Message::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_frame_shape() {
        let obj = DisplayObject::rectangle("alice", [10.0, 10.0], "black", 4.0);
        let json: serde_json::Value =
            serde_json::from_str(&Message::full_update(vec![obj]).encode().unwrap()).unwrap();
        assert_eq!(json["action"], "update");
        assert_eq!(json["types"], serde_json::json!(["all"]));
        assert_eq!(json["objectData"][0]["type"], "rectangle");
    }

    #[test]
    fn test_field_update_projects_named_fields_only() {
        let mut obj = DisplayObject::rectangle("alice", [10.0, 10.0], "black", 4.0);
        obj.rev = 1;
        obj.rect = Rect([10.0, 10.0, 50.0, 40.0]);
        let msg = Message::field_update(&[FieldKind::Rect], &[&obj]);
        let json: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        let record = &json["objectData"][0];
        assert_eq!(record["id"], obj.id.as_str());
        assert_eq!(record["rev"], 1);
        assert_eq!(record["rect"], serde_json::json!([10.0, 10.0, 50.0, 40.0]));
        assert!(record.get("color").is_none());
        assert!(record.get("type").is_none());
    }

    #[test]
    fn test_data_add_carries_only_newest_point() {
        let mut obj = DisplayObject::marker("alice", [0.0, 0.0], "black", 4.0);
        if let Some(ObjectData::Points(points)) = &mut obj.data {
            points.push([5.0, 5.0]);
            points.push([9.0, 1.0]);
        }
        obj.rev = 3;
        let msg = Message::field_update(&[FieldKind::DataAdd], &[&obj]);
        match msg {
            Message::Update { object_data, .. } => match &object_data[0] {
                ObjectRecord::Patch(patch) => {
                    assert_eq!(patch.data, Some(vec![[9.0, 1.0]]));
                }
                ObjectRecord::Full(_) => panic!("expected a patch"),
            },
            _ => panic!("expected an update"),
        }
    }

    #[test]
    fn test_decode_full_vs_patch_records() {
        let frame = r#"{"action":"update","types":["all"],"objectData":[
            {"id":"a","owner":"alice","rev":0,"type":"marker","rect":[0,0,0,0],"data":[[0,0]],"color":"black","weight":4}
        ]}"#;
        match Message::decode(frame).unwrap() {
            Message::Update { object_data, .. } => {
                assert!(matches!(object_data[0], ObjectRecord::Full(_)));
            }
            _ => panic!("expected an update"),
        }

        let frame = r#"{"action":"update","types":["rect"],"objectData":[
            {"id":"a","rev":2,"rect":[1,2,3,4]}
        ]}"#;
        match Message::decode(frame).unwrap() {
            Message::Update { object_data, .. } => {
                assert!(matches!(object_data[0], ObjectRecord::Patch(_)));
            }
            _ => panic!("expected an update"),
        }
    }

    #[test]
    fn test_delete_and_sync_frames() {
        let msg = Message::delete(vec!["a".into(), "b".into()]);
        let json: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["action"], "delete");
        assert_eq!(json["objectData"], serde_json::json!(["a", "b"]));

        let msg = Message::sync_catalog(vec![("a".into(), 3)]);
        let json: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["action"], "sync");
        assert_eq!(json["data"], serde_json::json!([["a", 3]]));
    }

    #[test]
    fn test_error_frame_shape() {
        let msg = Message::error("malformed frame: expected value");
        let json: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["action"], "error");
        assert_eq!(json["message"], "malformed frame: expected value");
        assert_eq!(Message::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(matches!(
            Message::decode("{\"action\":\"noop\"}"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(Message::decode("not json").is_err());
    }
}
