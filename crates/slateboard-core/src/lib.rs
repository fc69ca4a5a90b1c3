//! Slateboard Core Library
//!
//! Replicated-state synchronization for a shared drawing canvas: the
//! object model, the delta-update wire protocol, the revision-gated merge
//! store shared by client and server, the client session engine, and the
//! room persistence abstraction.

pub mod client;
pub mod object;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;

pub use client::BoardClient;
pub use object::{DisplayObject, ObjectData, ObjectId, ObjectKind, Point, Rect};
pub use protocol::{FieldKind, Message, ObjectPatch, ObjectRecord, ProtocolError};
pub use session::BoardSession;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use store::{MergeError, ObjectStore, RoomSnapshot};
pub use sync::{BoardTransport, ConnectionState, ReconnectPolicy, TransportEvent};
