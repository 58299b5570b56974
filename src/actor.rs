//! The single task that owns every piece of Coordinator state (§4.6, §5,
//! §11). Reader/writer tasks in [`crate::net`] only ever move bytes; this is
//! the one place the directory, heartbeat maps, peer tables and
//! node-address table are mutated.

use crate::command::{serialize_data, Command, Verb};
use crate::config::Config;
use crate::directory::{self, State};
use crate::message::Message;
use crate::net::{self, ActorEvent, NetHandle};
use crate::print::{PrintSender, Printout};
use crate::router::{self, Origin};
use anyhow::Context;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

const ACTOR_CHANNEL_CAPACITY: usize = 1_000;

/// Binds R, optionally connects to an initial peer, and runs until `OFF` is
/// received or the process is asked to stop. Returns once shutdown is
/// complete (every active peer sent `CO_SIGNOUT`, R closed last, §4.6).
pub async fn run(config: Config, print_tx: PrintSender) -> anyhow::Result<()> {
    run_internal(config, print_tx, None).await
}

/// Like [`run`], but reports the bound R port once known. Used by
/// integration tests that bind to an ephemeral `127.0.0.1:0` port and need
/// to learn which one the OS picked before they can connect (§10.4).
pub async fn run_reporting_port(
    config: Config,
    print_tx: PrintSender,
    port_tx: tokio::sync::oneshot::Sender<u16>,
) -> anyhow::Result<()> {
    run_internal(config, print_tx, Some(port_tx)).await
}

async fn run_internal(
    config: Config,
    print_tx: PrintSender,
    port_tx: Option<tokio::sync::oneshot::Sender<u16>>,
) -> anyhow::Result<()> {
    let (actor_tx, mut actor_rx) = tokio::sync::mpsc::channel(ACTOR_CHANNEL_CAPACITY);
    let net = NetHandle::new(actor_tx, print_tx.clone());

    let bind_addr = config.bind_addr();
    let (port, listener_abort) = net::bind_router(&bind_addr, net.clone_handle())
        .await
        .with_context(|| format!("failed to bind R on {bind_addr}"))?;
    if let Some(port_tx) = port_tx {
        let _ = port_tx.send(port);
    }

    let _ = print_tx
        .send(Printout::new(
            0,
            format!("leco-coordinator: namespace {} listening on {}:{port}", config.own_namespace, config.bind_host),
        ))
        .await;

    let mut state = State::new(config.own_namespace.clone(), format!("{}:{port}", config.bind_host));

    if let Some(peer_addr) = &config.initial_peer {
        router::peer_add(&net, &print_tx, peer_addr.clone(), None).await;
    }

    let mut cleaner = time::interval(config.cleaning_interval);
    cleaner.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = actor_rx.recv() => {
                let Some(event) = event else { break };
                handle_event(&mut state, &net, &print_tx, event).await;
            }
            _ = cleaner.tick() => {
                run_sweep(&mut state, &print_tx, config.expiration).await;
            }
        }

        if !state.running {
            break;
        }
    }

    shutdown(&state, &print_tx).await;
    listener_abort.abort();
    Ok(())
}

async fn handle_event(state: &mut State, net: &NetHandle, print_tx: &PrintSender, event: ActorEvent) {
    match event {
        ActorEvent::RouterAccepted { identity, frame_tx, peer_addr } => {
            let _ = print_tx
                .send(Printout::new(1, format!("net: R accepted {identity} from {peer_addr}")))
                .await;
            state.router_conns.insert(identity, frame_tx);
        }
        ActorEvent::RouterFrames { identity, frames } => {
            router::handle_inbound(state, Origin::Router(identity), frames, print_tx, net).await;
        }
        ActorEvent::RouterClosed { identity } => {
            let _ = print_tx.send(Printout::new(1, format!("net: R connection {identity} closed"))).await;
            state.router_conns.remove(&identity);
            if let Some(ns) = state.peer_identities.get(&identity).cloned() {
                if let Some(entry) = state.take_peer_entry(&ns) {
                    let _ = entry.frame_tx.send(net::FrameCmd::Close).await;
                }
                state.forget_peer_namespace(&ns);
            }
        }
        ActorEvent::DealerConnected { conn_id, key, address, frame_tx } => {
            router::handle_dealer_connected(state, print_tx, conn_id, key, address, frame_tx).await;
        }
        ActorEvent::DealerConnectFailed { key, address, reason } => {
            let _ = print_tx
                .send(Printout::new(0, format!("net: failed to connect to peer {key} at {address}: {reason}")))
                .await;
        }
        ActorEvent::DealerFrames { conn_id, frames } => {
            router::handle_dealer_frames(state, print_tx, net, conn_id, frames).await;
        }
        ActorEvent::DealerClosed { conn_id } => {
            if let Some(key) = state.key_for_conn(conn_id) {
                let _ = print_tx.send(Printout::new(1, format!("net: dealer {key} closed"))).await;
                state.take_peer_entry(&key);
                state.forget_peer_namespace(&key);
            }
        }
    }
}

async fn run_sweep(state: &mut State, print_tx: &PrintSender, expiration: Duration) {
    let actions = directory::sweep(state, expiration, std::time::Instant::now());

    for (name, identity) in actions.ping_components {
        if let Some(tx) = state.router_conns.get(&identity) {
            send_ping(tx, name, format!("{}.{}", state.own_namespace, directory::COORDINATOR)).await;
        }
    }
    for (ns, identity) in actions.ping_peers {
        if let Some(tx) = state.router_conns.get(&identity) {
            send_ping(
                tx,
                format!("{ns}.{}", directory::COORDINATOR),
                format!("{}.{}", state.own_namespace, directory::COORDINATOR),
            )
            .await;
        }
    }
    for entry in actions.forgotten_peer_dealers {
        let _ = entry.frame_tx.send(net::FrameCmd::Close).await;
    }
    let _ = print_tx;
}

async fn send_ping(frame_tx: &net::FrameSender, receiver: String, sender: String) {
    let Ok(payload) = serialize_data(&[Command::bare(Verb::Ping)]) else { return };
    let msg = Message::new(receiver, sender, ";").with_payload(vec![Bytes::from(payload)]);
    if let Ok(frames) = msg.encode() {
        let _ = frame_tx.send(net::FrameCmd::Send(frames)).await;
    }
}

/// Emits `CO_SIGNOUT` to every active peer and closes its dealer, then
/// signals R connections to close (§4.6 "Close R last").
async fn shutdown(state: &State, print_tx: &PrintSender) {
    let _ = print_tx.send(Printout::new(0, "leco-coordinator: shutting down".to_string())).await;
    let Ok(payload) = serialize_data(&[Command::bare(Verb::CoSignOut)]) else { return };
    for entry in state.peers.values() {
        let msg = Message::new(
            directory::COORDINATOR,
            format!("{}.{}", state.own_namespace, directory::COORDINATOR),
            ";",
        )
        .with_payload(vec![Bytes::from(payload.clone())]);
        if let Ok(frames) = msg.encode() {
            let _ = entry.frame_tx.send(net::FrameCmd::Send(frames)).await;
        }
        let _ = entry.frame_tx.send(net::FrameCmd::Close).await;
    }
    for tx in state.router_conns.values() {
        let _ = tx.send(net::FrameCmd::Close).await;
    }
}
