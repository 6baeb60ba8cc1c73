mod envelope;
mod hub;
mod proxy;

pub use envelope::{ArgValue, BrokerError, Envelope};
pub use hub::{
    Broker, CallReceiver, CallbackFn, EventScope, MessagePort, Reply, MAX_PENDING_CALLBACKS,
};
pub use proxy::{InterfaceSpec, MethodSpec, Proxy};
