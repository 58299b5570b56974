//! Dispatch (§4.2), the Coordinator command handler (§4.3) and the dealer
//! handshake lifecycle (§4.4). All of it operates on a `&mut State` and is
//! pure enough to unit-test with plain `tokio::sync::mpsc` channels standing
//! in for real sockets (§10.4).

use crate::command::{deserialize_data, serialize_data, Command, Verb};
use crate::directory::{self, PeerEntry, PeerState, State};
use crate::error::{CodecError, PolicyError};
use crate::identity::{temp_peer_token, DealerConnId, Identity};
use crate::message::Message;
use crate::net::{FrameCmd, FrameSender, NetHandle};
use crate::print::{PrintSender, Printout};
use bytes::Bytes;
use serde_json::json;
use std::time::{Duration, Instant};

/// Which connection a frame group arrived on. Determines both the
/// authentication rule applied (§4.2 step 3) and where a reply goes back out
/// (§4.3: replies are written back on the connection the request arrived on).
#[derive(Debug, Clone, Copy)]
pub enum Origin {
    Router(Identity),
    Dealer(DealerConnId),
}

async fn send_on(frame_tx: &FrameSender, frames: Vec<Bytes>) {
    let _ = frame_tx.send(FrameCmd::Send(frames)).await;
}

/// Finds the frame sender a reply or forward should go out on for `origin`.
fn origin_frame_tx<'a>(state: &'a State, origin: Origin) -> Option<&'a FrameSender> {
    match origin {
        Origin::Router(identity) => state.router_conns.get(&identity),
        Origin::Dealer(conn_id) => {
            let key = state.key_for_conn(conn_id)?;
            state
                .peers
                .get(&key)
                .or_else(|| state.waiting.get(&key))
                .map(|entry| &entry.frame_tx)
        }
    }
}

async fn reply_on_origin(state: &State, origin: Origin, print_tx: &PrintSender, msg: &Message) {
    let frames = match msg.encode() {
        Ok(frames) => frames,
        Err(e) => {
            let _ = print_tx
                .send(Printout::new(0, format!("router: failed to encode reply: {e}")))
                .await;
            return;
        }
    };
    match origin_frame_tx(state, origin) {
        Some(tx) => send_on(tx, frames).await,
        None => {
            let _ = print_tx
                .send(Printout::new(1, "router: reply origin is gone, dropping".to_string()))
                .await;
        }
    }
}

fn reply_message(own_namespace: &str, original: &Message, commands: &[Command]) -> Option<Message> {
    let (conversation_id, _) = original.header_parts();
    let payload = serialize_data(commands).ok()?;
    Some(
        Message::new(
            original.sender().to_string(),
            format!("{own_namespace}.{}", directory::COORDINATOR),
            format!("{conversation_id};"),
        )
        .with_payload(vec![Bytes::from(payload)]),
    )
}

async fn reply_error(state: &State, origin: Origin, print_tx: &PrintSender, original: &Message, err: PolicyError) {
    if let Some(msg) = reply_message(&state.own_namespace, original, &[Command::error(err.reply_text())]) {
        reply_on_origin(state, origin, print_tx, &msg).await;
    }
}

fn encode_commands(commands: &[Command]) -> Option<Bytes> {
    serialize_data(commands).ok().map(Bytes::from)
}

fn is_pure_signin(payload: &[Bytes]) -> bool {
    let Some(first) = payload.first() else { return false };
    match deserialize_data(first) {
        Ok(commands) => commands.len() == 1 && commands[0].verb == Verb::SignIn,
        Err(_) => false,
    }
}

/// One inbound frame group, dispatched per §4.2.
pub async fn handle_inbound(
    state: &mut State,
    origin: Origin,
    frames: Vec<Bytes>,
    print_tx: &PrintSender,
    net: &NetHandle,
) {
    let message = match Message::decode(&frames) {
        Ok(m) => m,
        Err(CodecError::Malformed) => {
            let _ = print_tx
                .send(Printout::new(0, "router: dropped malformed frame group".to_string()))
                .await;
            return;
        }
        Err(CodecError::VersionTooNew) => {
            let _ = print_tx
                .send(Printout::new(0, "router: dropped frame group with unsupported version".to_string()))
                .await;
            return;
        }
        Err(CodecError::EmptySender) => unreachable!("decode never produces EmptySender"),
    };

    let (r_ns, r_name) = message.receiver_parts(&state.own_namespace);
    let (s_ns, s_name) = message.sender_parts(&state.own_namespace);

    if let Origin::Router(identity) = origin {
        if s_ns == state.own_namespace {
            let identity_matches = state.directory.get(&s_name) == Some(&identity);
            let authenticated = identity_matches || is_pure_signin(&message.payload) || s_name == directory::COORDINATOR;
            if !authenticated {
                reply_error(state, origin, print_tx, &message, PolicyError::NotSignedIn).await;
                return;
            }
            // A pure SIGNIN is let through before the name is actually bound
            // to this identity (or may be rejected as a duplicate two calls
            // from now); only a genuine identity match is evidence of a live
            // heartbeat, or an impostor could keep a victim's name alive
            // forever just by repeating `[["SI"]]`.
            if identity_matches {
                state.heartbeat.insert(s_name.clone(), Instant::now());
            }
        } else {
            let authenticated = s_name == directory::COORDINATOR || state.peer_identities.contains_key(&identity);
            if !authenticated {
                reply_error(state, origin, print_tx, &message, PolicyError::NotSignedIn).await;
                return;
            }
            state.peer_heartbeat.insert(identity, Instant::now());
        }
    }

    if r_ns != state.own_namespace {
        match state.peers.get(&r_ns) {
            Some(entry) => send_on(&entry.frame_tx, frames).await,
            None => reply_error(state, origin, print_tx, &message, PolicyError::NodeUnknown).await,
        }
        return;
    }

    if r_name == directory::COORDINATOR || r_name.is_empty() {
        if message.payload.is_empty() {
            return;
        }
        dispatch_commands(state, origin, print_tx, net, &message, &s_ns, &s_name).await;
        return;
    }

    match state.directory.get(&r_name) {
        Some(identity) => match state.router_conns.get(identity) {
            Some(tx) => send_on(tx, frames).await,
            None => reply_error(state, origin, print_tx, &message, PolicyError::ReceiverUnknown).await,
        },
        None => reply_error(state, origin, print_tx, &message, PolicyError::ReceiverUnknown).await,
    }
}

/// The Coordinator command handler (§4.3). Decodes `payload[0]` into a batch
/// of sub-commands, runs each in order and replies with a list mirroring the
/// batch, per sub-command.
async fn dispatch_commands(
    state: &mut State,
    origin: Origin,
    print_tx: &PrintSender,
    net: &NetHandle,
    message: &Message,
    s_ns: &str,
    s_name: &str,
) {
    let Some(raw) = message.payload.first() else { return };
    let commands = match deserialize_data(raw) {
        Ok(commands) => commands,
        Err(e) => {
            let _ = print_tx
                .send(Printout::new(0, format!("router: dropped undecodable command batch: {e}")))
                .await;
            return;
        }
    };

    let source_identity = match origin {
        Origin::Router(identity) => Some(identity),
        Origin::Dealer(_) => None,
    };

    let mut results = Vec::with_capacity(commands.len());
    for command in &commands {
        let (reply, abort) = run_command(state, origin, print_tx, net, source_identity, s_ns, s_name, command).await;
        results.push(reply);
        if abort {
            break;
        }
    }

    if let Some(reply) = reply_message(&state.own_namespace, message, &results) {
        reply_on_origin(state, origin, print_tx, &reply).await;
    }
}

/// Runs one sub-command, returning its reply entry and whether the batch
/// should stop processing further sub-commands (sign-in/peer-sign-in
/// rejection aborts the batch, §4.3, §9 "exceptions as control flow").
async fn run_command(
    state: &mut State,
    origin: Origin,
    print_tx: &PrintSender,
    net: &NetHandle,
    source_identity: Option<Identity>,
    s_ns: &str,
    s_name: &str,
    command: &Command,
) -> (Command, bool) {
    match command.verb {
        Verb::SignIn => {
            let Some(identity) = source_identity else {
                return (Command::error(PolicyError::ExecutionFailed.reply_text()), true);
            };
            if state.directory.contains_key(s_name) {
                (Command::error(PolicyError::DuplicateName.reply_text()), true)
            } else {
                state.directory.insert(s_name.to_string(), identity);
                state.heartbeat.insert(s_name.to_string(), Instant::now());
                (Command::acknowledge(None), false)
            }
        }
        Verb::SignOut => {
            let matches_identity = source_identity
                .zip(state.directory.get(s_name))
                .map(|(sent, known)| sent == *known)
                .unwrap_or(false);
            if matches_identity {
                state.directory.remove(s_name);
                state.heartbeat.remove(s_name);
                (Command::acknowledge(None), false)
            } else {
                (Command::error(PolicyError::NotSignedIn.reply_text()), false)
            }
        }
        Verb::CoSignIn => {
            let Some(identity) = source_identity else {
                return (Command::error(PolicyError::ExecutionFailed.reply_text()), true);
            };
            let occupied = state
                .peer_identities
                .iter()
                .any(|(other_identity, ns)| ns == s_ns && *other_identity != identity);
            if occupied {
                (Command::error(PolicyError::DuplicateName.reply_text()), true)
            } else {
                state.peer_identities.insert(identity, s_ns.to_string());
                state.peer_heartbeat.insert(identity, Instant::now());
                (Command::acknowledge(None), false)
            }
        }
        Verb::CoSignOut => {
            let matches_identity = source_identity
                .map(|identity| state.peer_identities.get(&identity).map(String::as_str) == Some(s_ns))
                .unwrap_or(false);
            if matches_identity {
                if let Some(entry) = state.take_peer_entry(s_ns) {
                    close_dealer(entry).await;
                }
                if let Some(identity) = source_identity {
                    state.peer_identities.remove(&identity);
                    state.peer_heartbeat.remove(&identity);
                }
                (Command::acknowledge(None), false)
            } else {
                (Command::error(PolicyError::NotYou.reply_text()), false)
            }
        }
        Verb::Ping => (Command::acknowledge(None), false),
        Verb::Off => {
            state.running = false;
            (Command::acknowledge(None), false)
        }
        Verb::Clear => {
            let actions = directory::force_clear(state);
            for entry in actions.forgotten_peer_dealers {
                close_dealer(entry).await;
            }
            (Command::acknowledge(None), false)
        }
        Verb::List => {
            let body = json!({
                "directory": state.local_names(),
                "nodes": state.node_addresses,
            });
            (Command::acknowledge(Some(body)), false)
        }
        Verb::Set => {
            run_set(state, net, print_tx, s_ns, command).await;
            (Command::acknowledge(None), false)
        }
        Verb::Get | Verb::Call | Verb::Log | Verb::Save | Verb::Acknowledge | Verb::Error => {
            let _ = print_tx
                .send(Printout::new(
                    1,
                    format!("router: no handler for verb {:?}, acknowledging", command.verb),
                ))
                .await;
            (Command::acknowledge(None), false)
        }
    }
}

async fn run_set(state: &mut State, net: &NetHandle, print_tx: &PrintSender, s_ns: &str, command: &Command) {
    let Some(key) = command.args.first().and_then(|v| v.as_str()) else {
        return;
    };
    let Some(value) = command.args.get(1) else { return };
    match key {
        "directory" => {
            if let Some(names) = value.as_array() {
                let names = names.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
                state.global_directory.insert(s_ns.to_string(), names);
            }
        }
        "nodes" => {
            let Some(map) = value.as_object() else { return };
            for (ns, addr) in map {
                let Some(addr) = addr.as_str() else { continue };
                // Dedup on currently active/waiting dealers, not on
                // `node_addresses` (which is never cleared) — otherwise a
                // peer forgotten via expiry or CO_SIGNOUT could never be
                // reconnected by a later directory-gossip announcement.
                if ns == &state.own_namespace || state.peers.contains_key(ns) || state.waiting.contains_key(ns) {
                    continue;
                }
                state.node_addresses.insert(ns.clone(), addr.to_string());
                peer_add(net, print_tx, addr.to_string(), Some(ns.clone())).await;
            }
        }
        _ => {}
    }
}

async fn close_dealer(entry: PeerEntry) {
    let _ = entry.frame_tx.send(FrameCmd::Close).await;
}

/// Opens a new dealer connection (§4.4). Non-blocking: the connect itself
/// runs in the background; registering the `WAITING_ACK` entry and emitting
/// `CO_SIGNIN` happens when `ActorEvent::DealerConnected` comes back around
/// (see [`handle_dealer_connected`]).
pub async fn peer_add(net: &NetHandle, print_tx: &PrintSender, address: String, namespace: Option<String>) {
    let key = namespace.unwrap_or_else(temp_peer_token);
    let _ = print_tx
        .send(Printout::new(1, format!("router: connecting to peer {key} at {address}")))
        .await;
    crate::net::spawn_dealer(address, key, net.clone_handle());
}

/// A dealer connection finished connecting: register it `WAITING_ACK` and
/// emit its `CO_SIGNIN` (§4.4).
pub async fn handle_dealer_connected(
    state: &mut State,
    print_tx: &PrintSender,
    conn_id: DealerConnId,
    key: String,
    address: String,
    frame_tx: FrameSender,
) {
    let Some(payload) = encode_commands(&[Command::bare(Verb::CoSignIn)]) else {
        let _ = print_tx
            .send(Printout::new(0, "router: failed to encode CO_SIGNIN".to_string()))
            .await;
        return;
    };
    let signin = Message::new(
        directory::COORDINATOR,
        format!("{}.{}", state.own_namespace, directory::COORDINATOR),
        ";",
    )
    .with_payload(vec![payload]);

    match signin.encode() {
        Ok(frames) => send_on(&frame_tx, frames).await,
        Err(e) => {
            let _ = print_tx
                .send(Printout::new(0, format!("router: failed to encode CO_SIGNIN: {e}")))
                .await;
            return;
        }
    }

    state.conn_id_to_key.insert(conn_id, key.clone());
    state.waiting.insert(
        key,
        PeerEntry {
            conn_id,
            frame_tx,
            address,
            state: PeerState::WaitingAck,
        },
    );
}

/// One message read back on a dealer connection (§4.4
/// `handleDealerReply`).
pub async fn handle_dealer_frames(
    state: &mut State,
    print_tx: &PrintSender,
    net: &NetHandle,
    conn_id: DealerConnId,
    frames: Vec<Bytes>,
) {
    let Some(key) = state.key_for_conn(conn_id) else {
        let _ = print_tx
            .send(Printout::new(1, format!("router: frames from unknown dealer {conn_id}, ignoring")))
            .await;
        return;
    };

    // Once ACTIVE, a dealer connection is a plain bidirectional link: the
    // peer may write ordinary routed replies back on it rather than opening
    // its own reverse dealer, so treat it like any other inbound source.
    if state.peers.contains_key(&key) {
        handle_inbound(state, Origin::Dealer(conn_id), frames, print_tx, net).await;
        return;
    }

    let message = match Message::decode(&frames) {
        Ok(m) => m,
        Err(e) => {
            let _ = print_tx
                .send(Printout::new(0, format!("router: dropped malformed dealer reply: {e}")))
                .await;
            return;
        }
    };
    let Some(raw) = message.payload.first() else {
        let _ = print_tx
            .send(Printout::new(1, "router: dealer reply with no payload, ignoring".to_string()))
            .await;
        return;
    };
    let commands = match deserialize_data(raw) {
        Ok(commands) => commands,
        Err(_) => {
            let _ = print_tx
                .send(Printout::new(1, "router: unparsable dealer reply, ignoring".to_string()))
                .await;
            return;
        }
    };

    if commands.len() == 1 && commands[0].verb == Verb::Acknowledge {
        let (true_ns, _) = message.sender_parts(&state.own_namespace);
        let Some(mut entry) = state.take_peer_entry(&key) else { return };
        entry.state = PeerState::Active;
        state.conn_id_to_key.insert(conn_id, true_ns.clone());
        let address = entry.address.clone();
        let frame_tx = entry.frame_tx.clone();
        state.node_addresses.entry(true_ns.clone()).or_insert(address);
        state.peers.insert(true_ns, entry);

        let announce = [
            Command::new(Verb::Set, vec!["directory".into(), json!(state.local_names())]),
            Command::new(Verb::Set, vec!["nodes".into(), json!(state.node_addresses)]),
        ];
        if let Some(payload) = encode_commands(&announce) {
            let set_msg = Message::new(
                directory::COORDINATOR,
                format!("{}.{}", state.own_namespace, directory::COORDINATOR),
                ";",
            )
            .with_payload(vec![payload]);
            if let Ok(frames) = set_msg.encode() {
                send_on(&frame_tx, frames).await;
            }
        }
    } else if !commands.is_empty()
        && commands[0].verb == Verb::Error
        && commands[0].args.first().and_then(|v| v.as_str()) == Some(PolicyError::DuplicateName.reply_text())
    {
        if let Some(entry) = state.take_peer_entry(&key) {
            close_dealer(entry).await;
        }
    } else {
        let _ = print_tx
            .send(Printout::new(
                1,
                format!("router: unexpected dealer reply {commands:?}, ignoring"),
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::State;
    use tokio::sync::mpsc;

    fn channel() -> (FrameSender, mpsc::Receiver<FrameCmd>) {
        mpsc::channel(8)
    }

    fn state() -> State {
        State::new("N1".to_string(), "localhost:12300".to_string())
    }

    async fn recv_frames(rx: &mut mpsc::Receiver<FrameCmd>) -> Vec<Bytes> {
        match rx.recv().await.unwrap() {
            FrameCmd::Send(frames) => frames,
            FrameCmd::Close => panic!("expected frames, got close"),
        }
    }

    #[tokio::test]
    async fn sign_in_success_matches_scenario_1() {
        let mut s = state();
        let (print_tx, _print_rx) = crate::print::make_print_channel(8);
        let net = NetHandle::new(mpsc::channel(8).0, print_tx.clone());
        let (tx, mut rx) = channel();
        let identity = Identity::from(1u64);
        s.router_conns.insert(identity, tx);

        let msg = Message::new("COORDINATOR", "CB", "7;1")
            .with_payload(vec![Bytes::from_static(br#"[["SI"]]"#)]);
        let frames = msg.encode().unwrap();

        handle_inbound(&mut s, Origin::Router(identity), frames, &print_tx, &net).await;

        assert_eq!(s.directory.get("CB"), Some(&identity));
        let reply_frames = recv_frames(&mut rx).await;
        let reply = Message::decode(&reply_frames).unwrap();
        assert_eq!(reply.receiver(), "CB");
        assert_eq!(reply.sender(), "N1.COORDINATOR");
        assert_eq!(reply.header(), "7;");
        assert_eq!(deserialize_data(&reply.payload[0]).unwrap(), vec![Command::acknowledge(None)]);
    }

    #[tokio::test]
    async fn sign_in_rejects_duplicate_name() {
        let mut s = state();
        let (print_tx, _print_rx) = crate::print::make_print_channel(8);
        let net = NetHandle::new(mpsc::channel(8).0, print_tx.clone());
        let (tx, mut rx) = channel();
        let identity = Identity::from(1u64);
        s.router_conns.insert(identity, tx);
        s.directory.insert("send".to_string(), Identity::from(321u64));

        let msg = Message::new("COORDINATOR", "send", "7;1")
            .with_payload(vec![Bytes::from_static(br#"[["SI"]]"#)]);
        let frames = msg.encode().unwrap();
        handle_inbound(&mut s, Origin::Router(identity), frames, &print_tx, &net).await;

        let reply_frames = recv_frames(&mut rx).await;
        let reply = Message::decode(&reply_frames).unwrap();
        assert_eq!(
            deserialize_data(&reply.payload[0]).unwrap(),
            vec![Command::error("The name is already taken.")]
        );
    }

    #[tokio::test]
    async fn unauthenticated_message_is_rejected() {
        let mut s = state();
        let (print_tx, _print_rx) = crate::print::make_print_channel(8);
        let net = NetHandle::new(mpsc::channel(8).0, print_tx.clone());
        let (tx, mut rx) = channel();
        let identity = Identity::from(1u64);
        s.router_conns.insert(identity, tx);

        let msg = Message::new("rec", "unknownSender", "5;");
        let frames = msg.encode().unwrap();
        handle_inbound(&mut s, Origin::Router(identity), frames, &print_tx, &net).await;

        let reply_frames = recv_frames(&mut rx).await;
        let reply = Message::decode(&reply_frames).unwrap();
        assert_eq!(reply.receiver(), "unknownSender");
        assert_eq!(reply.sender(), "N1.COORDINATOR");
        assert_eq!(reply.header(), "5;");
        assert_eq!(
            deserialize_data(&reply.payload[0]).unwrap(),
            vec![Command::error("You did not sign in!")]
        );
    }

    #[tokio::test]
    async fn local_routing_forwards_unchanged() {
        let mut s = state();
        let (print_tx, _print_rx) = crate::print::make_print_channel(8);
        let net = NetHandle::new(mpsc::channel(8).0, print_tx.clone());
        let (sender_tx, _sender_rx) = channel();
        let (receiver_tx, mut receiver_rx) = channel();
        let sender_identity = Identity::from(321u64);
        let receiver_identity = Identity::from(123u64);
        s.router_conns.insert(sender_identity, sender_tx);
        s.router_conns.insert(receiver_identity, receiver_tx);
        s.directory.insert("send".to_string(), sender_identity);
        s.directory.insert("rec".to_string(), receiver_identity);

        let msg = Message::new("rec", "send", ";").with_payload(vec![Bytes::from_static(b"1")]);
        let frames = msg.encode().unwrap();
        let expected = frames.clone();
        handle_inbound(&mut s, Origin::Router(sender_identity), frames, &print_tx, &net).await;

        let forwarded = recv_frames(&mut receiver_rx).await;
        assert_eq!(forwarded, expected);
    }

    #[tokio::test]
    async fn cross_node_forward_is_byte_identical() {
        let mut s = state();
        let (print_tx, _print_rx) = crate::print::make_print_channel(8);
        let net = NetHandle::new(mpsc::channel(8).0, print_tx.clone());
        let (sender_tx, _sender_rx) = channel();
        let sender_identity = Identity::from(321u64);
        s.router_conns.insert(sender_identity, sender_tx);
        s.directory.insert("send".to_string(), sender_identity);

        let (dealer_tx, mut dealer_rx) = channel();
        s.peers.insert(
            "N2".to_string(),
            PeerEntry {
                conn_id: DealerConnId::from(1u64),
                frame_tx: dealer_tx,
                address: "n2host:12300".to_string(),
                state: PeerState::Active,
            },
        );

        let msg = Message::new("N2.CB", "N1.send", ";");
        let frames = msg.encode().unwrap();
        let expected = frames.clone();
        handle_inbound(&mut s, Origin::Router(sender_identity), frames, &print_tx, &net).await;

        let forwarded = recv_frames(&mut dealer_rx).await;
        assert_eq!(forwarded, expected);
    }

    #[tokio::test]
    async fn dealer_ack_rekeys_and_emits_directory_set() {
        let mut s = state();
        let (print_tx, _print_rx) = crate::print::make_print_channel(8);
        let net = NetHandle::new(mpsc::channel(8).0, print_tx.clone());
        let (frame_tx, mut frame_rx) = channel();
        let conn_id = DealerConnId::from(1u64);

        handle_dealer_connected(&mut s, &print_tx, conn_id, "tmp-token".to_string(), "n3host:12345".to_string(), frame_tx)
            .await;
        let cosignin_frames = recv_frames(&mut frame_rx).await;
        let cosignin = Message::decode(&cosignin_frames).unwrap();
        assert_eq!(cosignin.receiver(), "COORDINATOR");
        assert_eq!(cosignin.sender(), "N1.COORDINATOR");
        assert_eq!(
            deserialize_data(&cosignin.payload[0]).unwrap(),
            vec![Command::bare(Verb::CoSignIn)]
        );
        assert!(s.waiting.contains_key("tmp-token"));

        let ack = Message::new("N1.COORDINATOR", "N3.COORDINATOR", ";")
            .with_payload(vec![Bytes::from(serialize_data(&[Command::acknowledge(None)]).unwrap())]);
        handle_dealer_frames(&mut s, &print_tx, &net, conn_id, ack.encode().unwrap()).await;

        assert!(!s.waiting.contains_key("tmp-token"));
        assert!(s.peers.contains_key("N3"));
        assert_eq!(s.key_for_conn(conn_id), Some("N3".to_string()));

        let set_frames = recv_frames(&mut frame_rx).await;
        let set_msg = Message::decode(&set_frames).unwrap();
        let set_cmds = deserialize_data(&set_msg.payload[0]).unwrap();
        assert_eq!(set_cmds[0].verb, Verb::Set);
    }

    #[tokio::test]
    async fn expiry_sweep_pings_then_forgets() {
        let mut s = state();
        let identity = Identity::from(1u64);
        let (tx, mut rx) = channel();
        s.router_conns.insert(identity, tx);
        s.directory.insert("CB".to_string(), identity);
        let now = Instant::now();
        s.heartbeat.insert("CB".to_string(), now - Duration::from_millis(1500));

        let actions = directory::sweep(&mut s, Duration::from_secs(1), now);
        assert_eq!(actions.ping_components, vec![("CB".to_string(), identity)]);
        let _ = rx.try_recv();
    }
}
