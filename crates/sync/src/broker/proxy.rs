use super::envelope::ArgValue;
use super::hub::{Broker, CallbackFn};

/// One cross-boundary method: its name and whether it accepts a result
/// callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: &'static str,
    pub with_callback: bool,
}

/// Declarative interface shared by a proxy and its receiver: the static
/// list of callable methods. Proxies are generated from this, never from
/// reflection over the receiver.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceSpec {
    pub name: &'static str,
    pub methods: &'static [MethodSpec],
}

impl InterfaceSpec {
    pub fn method(&self, name: &str) -> Option<&'static MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Local stand-in for an object living in the paired context. Every call
/// returns immediately; results, when a method supports them, arrive later
/// through the registered callback.
pub struct Proxy {
    broker: Broker,
    receiver: String,
    spec: &'static InterfaceSpec,
}

impl Proxy {
    pub(crate) fn new(broker: Broker, receiver: &str, spec: &'static InterfaceSpec) -> Self {
        Self {
            broker,
            receiver: receiver.to_owned(),
            spec,
        }
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn interface(&self) -> &'static InterfaceSpec {
        self.spec
    }

    pub fn call(&self, method: &str, args: Vec<ArgValue>) {
        self.method(method);
        self.broker.send_call(&self.receiver, method, args, None);
    }

    pub fn call_with_callback(&self, method: &str, args: Vec<ArgValue>, callback: CallbackFn) {
        let spec = self.method(method);
        assert!(
            spec.with_callback,
            "method '{}' of interface '{}' does not take a callback",
            method, self.spec.name
        );
        self.broker
            .send_call(&self.receiver, method, args, Some(callback));
    }

    fn method(&self, name: &str) -> &'static MethodSpec {
        self.spec
            .method(name)
            .unwrap_or_else(|| panic!("interface '{}' has no method '{}'", self.spec.name, name))
    }
}
