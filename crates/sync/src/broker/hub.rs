use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::envelope::{ArgValue, Envelope};
use super::proxy::{InterfaceSpec, Proxy};

/// In-flight calls a broker may hold at once. Callback ids wrap at this
/// size, and wrapping onto a slot whose callback has not fired yet is a
/// contract violation, not a silent overwrite.
pub const MAX_PENDING_CALLBACKS: usize = 256;

/// Outbound half of the boundary transport. The broker posts envelopes and
/// assumes they arrive in order; it never creates or owns the channel.
pub trait MessagePort {
    fn post(&self, envelope: Envelope);
}

impl MessagePort for std::sync::mpsc::Sender<Envelope> {
    fn post(&self, envelope: Envelope) {
        if self.send(envelope).is_err() {
            log::warn!("peer context is gone, dropping envelope");
        }
    }
}

pub type CallbackFn = Box<dyn FnOnce(Vec<ArgValue>)>;
type EventListener = Box<dyn FnMut(&str, Option<&ArgValue>)>;

/// An object exposed to the paired context under a logical name. Dispatch
/// happens by method name; unknown names are the caller's programming
/// error and panic inside the receiver.
pub trait CallReceiver {
    fn call(&mut self, method: &str, args: Vec<ArgValue>, reply: Option<Reply>);
}

/// Single-use handle that routes a call's result back as the correlated
/// callback envelope.
pub struct Reply {
    port: Rc<dyn MessagePort>,
    id: u32,
}

impl Reply {
    pub fn send(self, args: Vec<ArgValue>) {
        self.port.post(Envelope::Callback { id: self.id, args });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventScope {
    #[default]
    LocalAndRemote,
    Local,
    Remote,
}

struct Inner {
    next_id: u32,
    pending: Vec<Option<CallbackFn>>,
    receivers: HashMap<String, Box<dyn CallReceiver>>,
    listeners: HashMap<String, Vec<EventListener>>,
}

/// Envelope router for one execution context: turns proxy calls and events
/// into outbound envelopes and dispatches inbound ones to receivers,
/// pending callbacks, and event listeners. One logical thread of control
/// per context; the handle clones cheaply.
#[derive(Clone)]
pub struct Broker {
    name: Rc<str>,
    port: Rc<dyn MessagePort>,
    inner: Rc<RefCell<Inner>>,
}

impl Broker {
    pub fn new(name: &str, port: Rc<dyn MessagePort>) -> Self {
        Self {
            name: Rc::from(name),
            port,
            inner: Rc::new(RefCell::new(Inner {
                next_id: 0,
                pending: (0..MAX_PENDING_CALLBACKS).map(|_| None).collect(),
                receivers: HashMap::new(),
                listeners: HashMap::new(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exposes `receiver` to proxy calls from the paired context.
    pub fn register_receiver(&self, name: &str, receiver: Box<dyn CallReceiver>) {
        let mut inner = self.inner.borrow_mut();
        assert!(
            !inner.receivers.contains_key(name),
            "receiver '{}' registered twice",
            name
        );
        inner.receivers.insert(name.to_owned(), receiver);
    }

    /// Builds the local stand-in for a receiver registered under `name` on
    /// the other side.
    pub fn create_proxy(&self, name: &str, spec: &'static InterfaceSpec) -> Proxy {
        Proxy::new(self.clone(), name, spec)
    }

    pub fn register_event_listener(&self, event: &str, listener: EventListener) -> usize {
        let mut inner = self.inner.borrow_mut();
        let listeners = inner.listeners.entry(event.to_owned()).or_default();
        listeners.push(listener);
        listeners.len() - 1
    }

    pub fn fire_event(&self, event: &str, data: Option<ArgValue>, scope: EventScope) {
        if scope != EventScope::Local {
            self.port.post(Envelope::Event {
                event: event.to_owned(),
                data: data.clone(),
            });
        }
        if scope != EventScope::Remote {
            self.deliver_local(event, data.as_ref());
        }
    }

    /// Entry point for inbound envelopes; the host pumps its channel into
    /// this.
    pub fn on_message(&self, envelope: Envelope) {
        match envelope {
            Envelope::Call {
                id,
                receiver,
                method,
                args,
                with_callback,
            } => {
                // the receiver leaves the table for the duration of the
                // dispatch so it may call back into this broker
                let mut target = self
                    .inner
                    .borrow_mut()
                    .receivers
                    .remove(&receiver)
                    .unwrap_or_else(|| panic!("no receiver registered under '{}'", receiver));
                let reply = with_callback.then(|| Reply {
                    port: self.port.clone(),
                    id,
                });
                target.call(&method, args, reply);
                let replaced = self.inner.borrow_mut().receivers.insert(receiver, target);
                assert!(replaced.is_none(), "receiver re-registered during dispatch");
            }
            Envelope::Callback { id, args } => {
                let callback = self
                    .inner
                    .borrow_mut()
                    .pending
                    .get_mut(id as usize)
                    .and_then(|slot| slot.take())
                    .unwrap_or_else(|| panic!("callback {} is not pending", id));
                callback(args);
            }
            Envelope::Event { event, data } => {
                self.deliver_local(&event, data.as_ref());
            }
        }
    }

    pub(crate) fn send_call(
        &self,
        receiver: &str,
        method: &str,
        args: Vec<ArgValue>,
        callback: Option<CallbackFn>,
    ) {
        let with_callback = callback.is_some();
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id % MAX_PENDING_CALLBACKS as u32;
            inner.next_id = inner.next_id.wrapping_add(1);
            if let Some(callback) = callback {
                let slot = &mut inner.pending[id as usize];
                assert!(
                    slot.is_none(),
                    "pending callback pool wrapped onto in-flight call {}",
                    id
                );
                *slot = Some(callback);
            }
            id
        };
        self.port.post(Envelope::Call {
            id,
            receiver: receiver.to_owned(),
            method: method.to_owned(),
            args,
            with_callback,
        });
    }

    fn deliver_local(&self, event: &str, data: Option<&ArgValue>) {
        // listeners leave the table while they run so they may fire events
        // or register further listeners
        let mut taken = self
            .inner
            .borrow_mut()
            .listeners
            .remove(event)
            .unwrap_or_default();
        for listener in &mut taken {
            listener(event, data);
        }
        let mut inner = self.inner.borrow_mut();
        let added = inner.listeners.remove(event).unwrap_or_default();
        taken.extend(added);
        if !taken.is_empty() {
            inner.listeners.insert(event.to_owned(), taken);
        }
    }
}
