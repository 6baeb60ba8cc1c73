mod client;
mod history;
mod reader;
mod registry;
mod server;
mod snapshot;
mod stats;
mod sync;
mod types;
mod wire;
mod writer;

pub use client::ReplicationClient;
pub use history::SnapshotHistory;
pub use reader::SceneReader;
pub use registry::{ClassId, ClassInfo, ClassRegistry, FieldDef};
pub use server::{ClientUpdate, ReplicationServer};
pub use snapshot::{DeltaRecord, ObjectState, Snapshot, SnapshotDelta};
pub use stats::SyncStats;
pub use sync::{
    GraphSynchronizer, SyncMode, Synchronizable, Synchronizer, SynchronizerExt, ValueBuffer,
};
pub use types::{FieldFlags, FieldValue, ObjectId, WireType, NULL_OBJECT};
pub use wire::{Serializer, WireError};
pub use writer::SceneWriter;
