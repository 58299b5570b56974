//! Socket plumbing: task-per-connection readers and writers feeding the
//! single actor task (§4.6, §5, §11). Every task here only ever moves bytes;
//! the directory, heartbeat maps, peer tables and node-address table are
//! never touched outside the actor task.

use crate::identity::{DealerConnId, DealerConnIdSource, Identity, IdentitySource};
use crate::print::{PrintSender, Printout};
use crate::wire::{read_frame_group, write_frame_group};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Sent to a connection's writer task: either write a frame group out, or
/// shut the connection down (used to tear down a dealer on `CO_SIGNOUT` or
/// a rejected handshake, and to close an R connection on expiry).
#[derive(Debug)]
pub enum FrameCmd {
    Send(Vec<Bytes>),
    Close,
}

pub type FrameSender = mpsc::Sender<FrameCmd>;
type FrameReceiver = mpsc::Receiver<FrameCmd>;

const WRITER_CHANNEL_DEPTH: usize = 64;

/// Everything the actor learns about from the network, funneled through one
/// queue (§4.6). Reader tasks only ever produce these; only the actor
/// consumes them.
#[derive(Debug)]
pub enum ActorEvent {
    RouterAccepted {
        identity: Identity,
        frame_tx: FrameSender,
        peer_addr: String,
    },
    RouterFrames {
        identity: Identity,
        frames: Vec<Bytes>,
    },
    RouterClosed {
        identity: Identity,
    },
    DealerConnected {
        conn_id: DealerConnId,
        key: String,
        address: String,
        frame_tx: FrameSender,
    },
    DealerConnectFailed {
        key: String,
        address: String,
        reason: String,
    },
    DealerFrames {
        conn_id: DealerConnId,
        frames: Vec<Bytes>,
    },
    DealerClosed {
        conn_id: DealerConnId,
    },
}

pub type ActorSender = mpsc::Sender<ActorEvent>;
pub type ActorReceiver = mpsc::Receiver<ActorEvent>;

/// Shared connection-id generators, handed to both the listener and every
/// dealer connect call so ids never collide across the Coordinator's
/// lifetime.
pub struct NetHandle {
    pub actor_tx: ActorSender,
    pub print_tx: PrintSender,
    identities: Arc<IdentitySource>,
    dealer_ids: Arc<DealerConnIdSource>,
}

impl NetHandle {
    pub fn new(actor_tx: ActorSender, print_tx: PrintSender) -> Self {
        NetHandle {
            actor_tx,
            print_tx,
            identities: Arc::new(IdentitySource::new()),
            dealer_ids: Arc::new(DealerConnIdSource::new()),
        }
    }

    pub fn clone_handle(&self) -> NetHandle {
        NetHandle {
            actor_tx: self.actor_tx.clone(),
            print_tx: self.print_tx.clone(),
            identities: self.identities.clone(),
            dealer_ids: self.dealer_ids.clone(),
        }
    }
}

/// Binds R and spawns the accept loop. Returns once bound (accept loop runs
/// forever in a background task) along with a handle to stop accepting new
/// connections on shutdown; a bind failure propagates so `main` can exit
/// non-zero.
pub async fn bind_router(bind_addr: &str, net: NetHandle) -> std::io::Result<(u16, tokio::task::AbortHandle)> {
    let listener = TcpListener::bind(bind_addr).await?;
    let port = listener.local_addr()?.port();
    let handle = tokio::spawn(accept_loop(listener, net));
    Ok((port, handle.abort_handle()))
}

async fn accept_loop(listener: TcpListener, net: NetHandle) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                spawn_router_connection(stream, peer_addr.to_string(), &net);
            }
            Err(e) => {
                let _ = net
                    .print_tx
                    .send(Printout::new(0, format!("net: accept failed: {e}")))
                    .await;
            }
        }
    }
}

fn spawn_router_connection(stream: TcpStream, peer_addr: String, net: &NetHandle) {
    let identity = net.identities.next();
    let (read_half, write_half) = stream.into_split();
    let (frame_tx, frame_rx) = mpsc::channel(WRITER_CHANNEL_DEPTH);

    tokio::spawn(writer_task(write_half, frame_rx));

    let actor_tx = net.actor_tx.clone();
    let print_tx = net.print_tx.clone();
    tokio::spawn(async move {
        if actor_tx
            .send(ActorEvent::RouterAccepted {
                identity,
                frame_tx,
                peer_addr,
            })
            .await
            .is_err()
        {
            return;
        }
        let mut read_half = read_half;
        loop {
            match read_frame_group(&mut read_half).await {
                Ok(Some(frames)) => {
                    if actor_tx
                        .send(ActorEvent::RouterFrames { identity, frames })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = print_tx
                        .send(Printout::new(
                            1,
                            format!("net: R connection {identity} read error: {e}"),
                        ))
                        .await;
                    break;
                }
            }
        }
        let _ = actor_tx.send(ActorEvent::RouterClosed { identity }).await;
    });
}

/// Opens an outbound connection to `address` and registers it as a dealer
/// under `key` (either the caller-supplied namespace or a temporary token;
/// §4.4). Runs in the background; the caller learns the outcome via
/// `ActorEvent::DealerConnected` / `DealerConnectFailed`.
pub fn spawn_dealer(address: String, key: String, net: NetHandle) {
    let conn_id = net.dealer_ids.next();
    tokio::spawn(async move {
        let stream = match TcpStream::connect(&address).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = net
                    .actor_tx
                    .send(ActorEvent::DealerConnectFailed {
                        key,
                        address,
                        reason: e.to_string(),
                    })
                    .await;
                return;
            }
        };
        let (read_half, write_half) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::channel(WRITER_CHANNEL_DEPTH);
        tokio::spawn(writer_task(write_half, frame_rx));

        if net
            .actor_tx
            .send(ActorEvent::DealerConnected {
                conn_id,
                key,
                address,
                frame_tx,
            })
            .await
            .is_err()
        {
            return;
        }

        let actor_tx = net.actor_tx.clone();
        let print_tx = net.print_tx.clone();
        let mut read_half = read_half;
        loop {
            match read_frame_group(&mut read_half).await {
                Ok(Some(frames)) => {
                    if actor_tx
                        .send(ActorEvent::DealerFrames { conn_id, frames })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = print_tx
                        .send(Printout::new(
                            1,
                            format!("net: dealer {conn_id} read error: {e}"),
                        ))
                        .await;
                    break;
                }
            }
        }
        let _ = actor_tx.send(ActorEvent::DealerClosed { conn_id }).await;
    });
}

async fn writer_task<W>(mut writer: W, mut frame_rx: FrameReceiver)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(cmd) = frame_rx.recv().await {
        match cmd {
            FrameCmd::Send(frames) => {
                if write_frame_group(&mut writer, &frames).await.is_err() {
                    break;
                }
            }
            FrameCmd::Close => break,
        }
    }
    let _ = writer.shutdown().await;
}
