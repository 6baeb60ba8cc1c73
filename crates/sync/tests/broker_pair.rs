use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;

use scenelink::{
    ArgValue, Broker, CallReceiver, Envelope, EventScope, InterfaceSpec, MethodSpec, Reply,
};

static CONTROL: InterfaceSpec = InterfaceSpec {
    name: "control",
    methods: &[
        MethodSpec {
            name: "acknowledge",
            with_callback: false,
        },
        MethodSpec {
            name: "ping",
            with_callback: true,
        },
    ],
};

/// Two brokers joined by a channel pair, with explicit pumping so each
/// "context" drains its inbox deterministically.
struct Pair {
    left: Broker,
    right: Broker,
    to_left: mpsc::Receiver<Envelope>,
    to_right: mpsc::Receiver<Envelope>,
}

impl Pair {
    fn new() -> Self {
        let (left_tx, to_right) = mpsc::channel();
        let (right_tx, to_left) = mpsc::channel();
        Self {
            left: Broker::new("left", Rc::new(left_tx)),
            right: Broker::new("right", Rc::new(right_tx)),
            to_left,
            to_right,
        }
    }

    fn pump(&self) {
        loop {
            let mut idle = true;
            while let Ok(envelope) = self.to_right.try_recv() {
                self.right.on_message(envelope);
                idle = false;
            }
            while let Ok(envelope) = self.to_left.try_recv() {
                self.left.on_message(envelope);
                idle = false;
            }
            if idle {
                break;
            }
        }
    }
}

struct Control {
    acks: Rc<RefCell<Vec<(u64, u64)>>>,
}

impl CallReceiver for Control {
    fn call(&mut self, method: &str, args: Vec<ArgValue>, reply: Option<Reply>) {
        match method {
            "acknowledge" => {
                let (ArgValue::UInt(client), ArgValue::UInt(timestamp)) = (&args[0], &args[1])
                else {
                    panic!("acknowledge takes (client, timestamp)");
                };
                self.acks.borrow_mut().push((*client, *timestamp));
            }
            "ping" => {
                // answer with exactly what was asked
                reply.expect("ping wants a callback").send(args);
            }
            other => panic!("receiver 'control' has no method '{}'", other),
        }
    }
}

#[test]
fn calls_cross_the_boundary() {
    let pair = Pair::new();
    let acks = Rc::new(RefCell::new(Vec::new()));
    pair.right
        .register_receiver("server.control", Box::new(Control { acks: acks.clone() }));

    let proxy = pair.left.create_proxy("server.control", &CONTROL);
    proxy.call(
        "acknowledge",
        vec![ArgValue::UInt(0), ArgValue::UInt(17)],
    );
    proxy.call(
        "acknowledge",
        vec![ArgValue::UInt(0), ArgValue::UInt(18)],
    );
    pair.pump();

    assert_eq!(acks.borrow().as_slice(), [(0, 17), (0, 18)]);
}

#[test]
fn callback_carries_the_posted_args_and_fires_once() {
    let pair = Pair::new();
    pair.right.register_receiver(
        "server.control",
        Box::new(Control {
            acks: Rc::new(RefCell::new(Vec::new())),
        }),
    );

    let proxy = pair.left.create_proxy("server.control", &CONTROL);
    let results = Rc::new(RefCell::new(Vec::new()));
    let sink = results.clone();
    proxy.call_with_callback(
        "ping",
        vec![ArgValue::UInt(12345), ArgValue::Str("probe".to_owned())],
        Box::new(move |args| sink.borrow_mut().push(args)),
    );
    pair.pump();
    pair.pump();

    let results = results.borrow();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0],
        vec![ArgValue::UInt(12345), ArgValue::Str("probe".to_owned())]
    );
}

#[test]
fn many_correlated_calls_resolve_to_their_own_callbacks() {
    let pair = Pair::new();
    pair.right.register_receiver(
        "server.control",
        Box::new(Control {
            acks: Rc::new(RefCell::new(Vec::new())),
        }),
    );

    let proxy = pair.left.create_proxy("server.control", &CONTROL);
    let results = Rc::new(RefCell::new(Vec::new()));
    for i in 0..100u64 {
        let sink = results.clone();
        proxy.call_with_callback(
            "ping",
            vec![ArgValue::UInt(i)],
            Box::new(move |args| {
                let ArgValue::UInt(echoed) = args[0] else {
                    panic!("expected UInt");
                };
                sink.borrow_mut().push((i, echoed));
            }),
        );
    }
    pair.pump();

    let results = results.borrow();
    assert_eq!(results.len(), 100);
    assert!(results.iter().all(|(sent, echoed)| sent == echoed));
}

#[test]
fn remote_events_reach_the_other_side_only() {
    let pair = Pair::new();
    let left_seen = Rc::new(RefCell::new(0));
    let right_seen = Rc::new(RefCell::new(0));

    let counter = left_seen.clone();
    pair.left.register_event_listener(
        "state.update",
        Box::new(move |_, _| *counter.borrow_mut() += 1),
    );
    let counter = right_seen.clone();
    pair.right.register_event_listener(
        "state.update",
        Box::new(move |_, _| *counter.borrow_mut() += 1),
    );

    pair.left.fire_event(
        "state.update",
        Some(ArgValue::Bytes(vec![1, 2, 3])),
        EventScope::Remote,
    );
    pair.pump();
    assert_eq!(*left_seen.borrow(), 0);
    assert_eq!(*right_seen.borrow(), 1);

    pair.left
        .fire_event("state.update", None, EventScope::LocalAndRemote);
    pair.pump();
    assert_eq!(*left_seen.borrow(), 1);
    assert_eq!(*right_seen.borrow(), 2);
}

#[test]
fn envelopes_survive_a_byte_transport() {
    // a transport that only carries bytes forces the rkyv codec into the path
    let pair = Pair::new();
    let acks = Rc::new(RefCell::new(Vec::new()));
    pair.right
        .register_receiver("server.control", Box::new(Control { acks: acks.clone() }));

    let proxy = pair.left.create_proxy("server.control", &CONTROL);
    proxy.call(
        "acknowledge",
        vec![ArgValue::UInt(2), ArgValue::UInt(40)],
    );

    // re-encode every envelope in flight
    while let Ok(envelope) = pair.to_right.try_recv() {
        let bytes = envelope.serialize().unwrap();
        pair.right.on_message(Envelope::deserialize(&bytes).unwrap());
    }
    assert_eq!(acks.borrow().as_slice(), [(2, 40)]);
}
