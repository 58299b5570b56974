//! End-to-end scenario tests (spec.md §8): a real Coordinator bound to an
//! ephemeral `127.0.0.1:0` port, driven by raw `TcpStream` clients speaking
//! the wire framing directly, no mock transport (SPEC_FULL.md §10.4).

use bytes::Bytes;
use leco_coordinator::config::Config;
use leco_coordinator::message::Message;
use leco_coordinator::{actor, print, wire};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

fn test_config(namespace: &str, initial_peer: Option<String>) -> Config {
    Config {
        bind_host: "127.0.0.1".to_string(),
        bind_port: 0,
        own_namespace: namespace.to_string(),
        initial_peer,
        verbose: false,
        cleaning_interval: Duration::from_secs(60),
        expiration: Duration::from_secs(60),
    }
}

/// Spawns a Coordinator in the background and returns the port it bound.
async fn spawn_coordinator(config: Config) -> u16 {
    let (print_tx, print_rx) = print::make_print_channel(256);
    tokio::spawn(print::print_task(print_rx, false));
    let (port_tx, port_rx) = oneshot::channel();
    tokio::spawn(actor::run_reporting_port(config, print_tx, port_tx));
    port_rx.await.expect("coordinator reported its bound port")
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port)).await.expect("connect to coordinator")
}

async fn send_message(stream: &mut TcpStream, msg: &Message) {
    let frames = msg.encode().expect("well-formed message encodes");
    wire::write_frame_group(stream, &frames).await.expect("write frame group");
}

async fn recv_message(stream: &mut TcpStream) -> Message {
    let frames = wire::read_frame_group(stream)
        .await
        .expect("read frame group")
        .expect("connection open");
    Message::decode(&frames).expect("well-formed reply")
}

#[tokio::test]
async fn scenario_1_sign_in_success() {
    let port = spawn_coordinator(test_config("N1", None)).await;
    let mut cb = connect(port).await;

    let signin = Message::new("COORDINATOR", "CB", "7;1").with_payload(vec![Bytes::from_static(br#"[["SI"]]"#)]);
    send_message(&mut cb, &signin).await;

    let reply = recv_message(&mut cb).await;
    assert_eq!(reply.receiver(), "CB");
    assert_eq!(reply.sender(), "N1.COORDINATOR");
    assert_eq!(reply.header(), "7;");
    assert_eq!(reply.payload[0].as_ref(), br#"[["A"]]"#);
}

#[tokio::test]
async fn scenario_2_sign_in_rejects_duplicate_name() {
    let port = spawn_coordinator(test_config("N1", None)).await;

    let mut first = connect(port).await;
    let signin = Message::new("COORDINATOR", "send", "1;1").with_payload(vec![Bytes::from_static(br#"[["SI"]]"#)]);
    send_message(&mut first, &signin).await;
    let ack = recv_message(&mut first).await;
    assert_eq!(ack.payload[0].as_ref(), br#"[["A"]]"#);

    let mut second = connect(port).await;
    let signin_again = Message::new("COORDINATOR", "send", "7;1").with_payload(vec![Bytes::from_static(br#"[["SI"]]"#)]);
    send_message(&mut second, &signin_again).await;
    let reply = recv_message(&mut second).await;
    assert_eq!(reply.receiver(), "send");
    assert_eq!(reply.header(), "7;");
    assert_eq!(reply.payload[0].as_ref(), br#"[["E","The name is already taken."]]"#);
}

#[tokio::test]
async fn scenario_3_unauthenticated_message_is_rejected() {
    let port = spawn_coordinator(test_config("N1", None)).await;
    let mut conn = connect(port).await;

    let msg = Message::new("rec", "unknownSender", "5;");
    send_message(&mut conn, &msg).await;

    let reply = recv_message(&mut conn).await;
    assert_eq!(reply.receiver(), "unknownSender");
    assert_eq!(reply.sender(), "N1.COORDINATOR");
    assert_eq!(reply.header(), "5;");
    assert_eq!(reply.payload[0].as_ref(), br#"[["E","You did not sign in!"]]"#);
}

#[tokio::test]
async fn scenario_4_local_routing_forwards_unchanged() {
    let port = spawn_coordinator(test_config("N1", None)).await;

    let mut sender = connect(port).await;
    let signin_send = Message::new("COORDINATOR", "send", "1;1").with_payload(vec![Bytes::from_static(br#"[["SI"]]"#)]);
    send_message(&mut sender, &signin_send).await;
    recv_message(&mut sender).await;

    let mut receiver = connect(port).await;
    let signin_rec = Message::new("COORDINATOR", "rec", "2;1").with_payload(vec![Bytes::from_static(br#"[["SI"]]"#)]);
    send_message(&mut receiver, &signin_rec).await;
    recv_message(&mut receiver).await;

    let payload_msg = Message::new("rec", "send", ";").with_payload(vec![Bytes::from_static(b"1")]);
    send_message(&mut sender, &payload_msg).await;

    let forwarded = recv_message(&mut receiver).await;
    assert_eq!(forwarded.receiver(), "rec");
    assert_eq!(forwarded.sender(), "send");
    assert_eq!(forwarded.payload[0].as_ref(), b"1");
}

#[tokio::test]
async fn scenario_5_and_6_peer_handshake_and_cross_node_forward() {
    let port_n2 = spawn_coordinator(test_config("N2", None)).await;
    let port_n1 = spawn_coordinator(test_config("N1", Some(format!("127.0.0.1:{port_n2}")))).await;

    // Give the handshake (connect -> CO_SIGNIN -> ACK -> directory SET) a
    // moment to settle before driving traffic through it.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut cb_on_n2 = connect(port_n2).await;
    let signin = Message::new("COORDINATOR", "CB", "1;1").with_payload(vec![Bytes::from_static(br#"[["SI"]]"#)]);
    send_message(&mut cb_on_n2, &signin).await;
    recv_message(&mut cb_on_n2).await;

    let mut send_on_n1 = connect(port_n1).await;
    let signin_send = Message::new("COORDINATOR", "send", "2;1").with_payload(vec![Bytes::from_static(br#"[["SI"]]"#)]);
    send_message(&mut send_on_n1, &signin_send).await;
    recv_message(&mut send_on_n1).await;

    let cross = Message::new("N2.CB", "N1.send", ";").with_payload(vec![Bytes::from_static(b"hello")]);
    send_message(&mut send_on_n1, &cross).await;

    let forwarded = recv_message(&mut cb_on_n2).await;
    assert_eq!(forwarded.receiver(), "N2.CB");
    assert_eq!(forwarded.sender(), "N1.send");
    assert_eq!(forwarded.payload[0].as_ref(), b"hello");
}
