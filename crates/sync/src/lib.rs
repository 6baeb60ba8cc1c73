pub mod broker;
pub mod net;

pub use broker::{
    ArgValue, Broker, BrokerError, CallReceiver, CallbackFn, Envelope, EventScope, InterfaceSpec,
    MessagePort, MethodSpec, Proxy, Reply, MAX_PENDING_CALLBACKS,
};
pub use net::{
    ClassId, ClassInfo, ClassRegistry, ClientUpdate, DeltaRecord, FieldDef, FieldFlags,
    FieldValue, GraphSynchronizer, ObjectId, ObjectState, ReplicationClient, ReplicationServer,
    SceneReader, SceneWriter, Serializer, Snapshot, SnapshotDelta, SnapshotHistory, SyncMode,
    SyncStats, Synchronizable, Synchronizer, SynchronizerExt, ValueBuffer, WireError, WireType,
    NULL_OBJECT,
};
