//! Object store with the shared revision-gated merge.
//!
//! The same merge contract runs on both sides of the wire: the server
//! applies it to the authoritative room, every client applies it to its
//! local replica. Last writer wins behind an inclusive revision gate; there
//! is deliberately no tie-break for equal revisions beyond arrival order.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::object::{DisplayObject, ObjectData, ObjectId};
use crate::protocol::{FieldKind, ObjectRecord};

/// The serializable id-to-object mapping of one room.
pub type RoomSnapshot = HashMap<ObjectId, DisplayObject>;

/// Why a merge was refused. Refusals never mutate the store and produce no
/// corrective traffic; callers report them as warnings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("no object {id} exists for update")]
    UnknownObject { id: ObjectId },
    #[error("stale revision {incoming} for object {id} (stored {stored})")]
    StaleRevision {
        id: ObjectId,
        incoming: u64,
        stored: u64,
    },
    #[error("all-kind update without a full record for {id}")]
    IncompleteRecord { id: ObjectId },
}

/// Mapping from object id to display object, with merge semantics.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectStore {
    objects: RoomSnapshot,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(objects: RoomSnapshot) -> Self {
        Self { objects }
    }

    /// Apply one update record under the shared merge contract.
    ///
    /// An `all`-kind update unconditionally replaces (or inserts) the whole
    /// record; this is the only path that can introduce a new id. Any other
    /// kind list requires a known id and an incoming revision at or above
    /// the stored one, then applies each named field: overwrite for
    /// `color`/`weight`/`rect`/`dataMod`, append for `dataAdd`.
    pub fn apply(&mut self, types: &[FieldKind], record: &ObjectRecord) -> Result<(), MergeError> {
        if types.contains(&FieldKind::All) {
            return match record {
                ObjectRecord::Full(obj) => {
                    self.objects.insert(obj.id.clone(), obj.clone());
                    Ok(())
                }
                ObjectRecord::Patch(patch) => Err(MergeError::IncompleteRecord {
                    id: patch.id.clone(),
                }),
            };
        }

        let id = record.id();
        let Some(stored) = self.objects.get_mut(id) else {
            return Err(MergeError::UnknownObject { id: id.clone() });
        };
        let incoming = record.rev();
        if stored.rev > incoming {
            return Err(MergeError::StaleRevision {
                id: id.clone(),
                incoming,
                stored: stored.rev,
            });
        }

        // Inclusive gate: equal revisions both apply, last applied wins.
        stored.rev = incoming;
        for kind in types {
            match kind {
                FieldKind::Color => {
                    if let Some(color) = record.color() {
                        stored.color = Some(color.to_string());
                    }
                }
                FieldKind::Weight => {
                    if let Some(weight) = record.weight() {
                        stored.weight = Some(weight);
                    }
                }
                FieldKind::Rect => {
                    if let Some(rect) = record.rect() {
                        stored.rect = rect;
                    }
                }
                FieldKind::DataAdd => {
                    if let Some(added) = record.points() {
                        match &mut stored.data {
                            Some(ObjectData::Points(points)) => {
                                points.extend_from_slice(added);
                            }
                            other => {
                                warn!("dataAdd on {} without a point payload", id);
                                *other = Some(ObjectData::Points(added.to_vec()));
                            }
                        }
                    }
                }
                FieldKind::DataMod => {
                    if let Some(points) = record.points() {
                        stored.data = Some(ObjectData::Points(points.to_vec()));
                    }
                }
                FieldKind::All => unreachable!("handled above"),
            }
        }
        Ok(())
    }

    /// Unconditional removal; an absent id is a no-op, not an error.
    pub fn remove(&mut self, id: &ObjectId) -> Option<DisplayObject> {
        self.objects.remove(id)
    }

    /// Insert a locally created object, bypassing the merge gate.
    pub fn insert(&mut self, object: DisplayObject) {
        self.objects.insert(object.id.clone(), object);
    }

    pub fn get(&self, id: &ObjectId) -> Option<&DisplayObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut DisplayObject> {
        self.objects.get_mut(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> impl Iterator<Item = &DisplayObject> {
        self.objects.values()
    }

    /// `[id, rev]` pairs describing the whole store, for `sync` catalogs.
    pub fn catalog(&self) -> Vec<(ObjectId, u64)> {
        self.objects
            .iter()
            .map(|(id, obj)| (id.clone(), obj.rev))
            .collect()
    }

    pub fn snapshot(&self) -> &RoomSnapshot {
        &self.objects
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}
