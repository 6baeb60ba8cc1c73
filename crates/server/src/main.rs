mod config;
mod loss;
mod scene;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use scenelink::{
    ArgValue, Broker, CallReceiver, Envelope, EventScope, InterfaceSpec, MethodSpec,
    ReplicationClient, ReplicationServer, Reply,
};

use config::HarnessConfig;
use loss::LossSimulation;
use scene::Arena;

const STATE_UPDATE: &str = "state.update";
const SESSION_END: &str = "session.end";

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

#[derive(Parser)]
#[command(name = "scenelink-server")]
#[command(about = "Loopback scene replication harness")]
struct Args {
    #[arg(short, long, default_value_t = 20)]
    tick_rate: u32,

    #[arg(short = 'n', long, default_value_t = 200)]
    ticks: u32,

    #[arg(
        long,
        default_value_t = 0.0,
        help = "Percentage of state updates to drop (0-100)"
    )]
    loss_percent: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = HarnessConfig {
        tick_rate: args.tick_rate.max(1),
        ticks: args.ticks,
        loss_percent: args.loss_percent,
        ..Default::default()
    };

    let (server_tx, client_rx) = mpsc::channel();
    let (client_tx, server_rx) = mpsc::channel();

    let client_config = config.clone();
    let client_thread = thread::spawn(move || run_client(client_config, client_rx, client_tx));

    run_server(&config, server_tx, server_rx)?;

    client_thread.join().expect("client context panicked");
    Ok(())
}

struct Control {
    server: Rc<RefCell<ReplicationServer>>,
}

impl CallReceiver for Control {
    fn call(&mut self, method: &str, args: Vec<ArgValue>, reply: Option<Reply>) {
        match method {
            "acknowledge" => {
                let (ArgValue::UInt(client_id), ArgValue::UInt(timestamp)) = (&args[0], &args[1])
                else {
                    panic!("acknowledge takes (client id, timestamp)");
                };
                self.server
                    .borrow_mut()
                    .acknowledge(*client_id as u32, *timestamp as u32);
            }
            "ping" => reply.expect("ping wants a callback").send(args),
            other => panic!("receiver 'server.control' has no method '{}'", other),
        }
    }
}

fn run_server(
    config: &HarnessConfig,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
) -> Result<()> {
    let registry = scene::build_registry();
    let broker = Broker::new("server", Rc::new(tx));
    let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate as f64);
    let server = Rc::new(RefCell::new(ReplicationServer::with_interval(
        registry,
        tick_duration.as_secs_f32(),
    )));
    let client_id = server.borrow_mut().add_client();
    broker.register_receiver(
        "server.control",
        Box::new(Control {
            server: server.clone(),
        }),
    );

    let loss = LossSimulation::new(config.loss_percent);
    let mut arena = Arena::new();

    log::info!(
        "replicating {} ticks at {} Hz to client {}",
        config.ticks,
        config.tick_rate,
        client_id
    );

    for tick in 0..config.ticks {
        let started = Instant::now();
        scene::advance(&mut arena, tick);

        let updates = server
            .borrow_mut()
            .update(&mut arena, tick_duration.as_secs_f32())?;
        for update in updates {
            if loss.should_drop() {
                log::debug!(
                    "simulated loss of update {} for client {}",
                    update.timestamp,
                    update.client_id
                );
                continue;
            }
            broker.fire_event(
                STATE_UPDATE,
                Some(ArgValue::Bytes(update.payload)),
                EventScope::Remote,
            );
        }

        while let Ok(envelope) = rx.try_recv() {
            broker.on_message(envelope);
        }

        if let Some(rest) = tick_duration.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    broker.fire_event(SESSION_END, None, EventScope::Remote);
    let server = server.borrow();
    let stats = server.stats();
    log::info!(
        "server done: {} snapshots written, {} deltas sent, {} bytes on the wire",
        stats.snapshots_written,
        stats.deltas_sent,
        stats.bytes_sent
    );
    Ok(())
}

fn run_client(config: HarnessConfig, rx: mpsc::Receiver<Envelope>, tx: mpsc::Sender<Envelope>) {
    let registry = scene::build_registry();
    let broker = Broker::new("client", Rc::new(tx));
    let replication = Rc::new(RefCell::new(ReplicationClient::new(registry)));
    let arena = Rc::new(RefCell::new(Arena::new()));
    let proxy = Rc::new(broker.create_proxy("server.control", &CONTROL));
    let done = Rc::new(Cell::new(false));
    let applied_count = Rc::new(Cell::new(0u32));

    {
        let replication = replication.clone();
        let arena = arena.clone();
        let proxy = proxy.clone();
        let applied_count = applied_count.clone();
        let ping_interval = config.ping_interval.max(1);
        broker.register_event_listener(
            STATE_UPDATE,
            Box::new(move |_, data| {
                let Some(ArgValue::Bytes(payload)) = data else {
                    log::warn!("state update without a byte payload");
                    return;
                };
                match replication
                    .borrow_mut()
                    .update(&mut *arena.borrow_mut(), payload)
                {
                    Ok(Some(timestamp)) => {
                        proxy.call(
                            "acknowledge",
                            vec![ArgValue::UInt(0), ArgValue::UInt(timestamp as u64)],
                        );
                        let seen = applied_count.get() + 1;
                        applied_count.set(seen);
                        if seen % ping_interval == 0 {
                            let sent_at = Instant::now();
                            proxy.call_with_callback(
                                "ping",
                                vec![ArgValue::UInt(seen as u64)],
                                Box::new(move |_| {
                                    log::info!(
                                        "ping after {} updates: rtt {:?}",
                                        seen,
                                        sent_at.elapsed()
                                    );
                                }),
                            );
                        }
                    }
                    Ok(None) => {}
                    Err(err) => log::warn!("undecodable state update: {}", err),
                }
            }),
        );
    }
    {
        let done = done.clone();
        broker.register_event_listener(SESSION_END, Box::new(move |_, _| done.set(true)));
    }

    while !done.get() {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(envelope) => broker.on_message(envelope),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let replication = replication.borrow();
    let stats = replication.stats();
    let arena = arena.borrow();
    log::info!(
        "client done at tick {} with {} players: {} deltas applied, {} dropped",
        arena.tick,
        arena.players.len(),
        stats.deltas_applied,
        stats.deltas_dropped
    );
}
