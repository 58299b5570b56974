//! The Coordinator's state: local directory, heartbeat maps, peer tables,
//! node addresses and the global directory (§3). Owned exclusively by the
//! actor task; every mutation here happens on that one task (§5).

use crate::identity::{DealerConnId, Identity};
use crate::net::FrameSender;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Name reserved for the Coordinator itself; never bound to an identity and
/// never reported by `LIST` (§3).
pub const COORDINATOR: &str = "COORDINATOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    WaitingAck,
    Active,
}

/// One remote Coordinator namespace's outbound link (§3 "Peer table").
pub struct PeerEntry {
    pub conn_id: DealerConnId,
    pub frame_tx: FrameSender,
    pub address: String,
    pub state: PeerState,
}

/// Everything the Coordinator owns. No field here is ever touched from a
/// reader/writer task directly (§5, §11).
pub struct State {
    pub own_namespace: String,

    /// R connections, live whether or not the far end has signed in yet.
    pub router_conns: HashMap<Identity, FrameSender>,

    /// Signed-in local components: `name -> identity` (§3).
    pub directory: HashMap<String, Identity>,
    /// `name -> last-seen` for signed-in local components (§3).
    pub heartbeat: HashMap<String, Instant>,

    /// Peers keyed by their true namespace once `ACTIVE` (§3, §4.4).
    pub peers: HashMap<String, PeerEntry>,
    /// Peers still `WAITING_ACK`, keyed by temporary token or caller-given
    /// namespace (§3, §4.4).
    pub waiting: HashMap<String, PeerEntry>,
    /// Reverse lookup from a dealer's stable connection id to its current
    /// key in `peers`/`waiting`, so a reader task never needs to learn about
    /// re-keying (§9 "cyclic reference").
    pub conn_id_to_key: HashMap<DealerConnId, String>,

    /// Router-side identity of an inbound peer connection, once its
    /// `CO_SIGNIN` has been accepted: `identity -> namespace` (§3).
    pub peer_identities: HashMap<Identity, String>,
    /// `identity -> last-seen` for peer identities (§3).
    pub peer_heartbeat: HashMap<Identity, Instant>,

    /// `namespace -> "host:port"` for every namespace with a known connect
    /// address, including our own (§3 "Node address table").
    pub node_addresses: HashMap<String, String>,
    /// `remoteNamespace -> names`, populated by `SET {directory}` (§3, §4.3).
    pub global_directory: HashMap<String, Vec<String>>,

    pub running: bool,
}

impl State {
    pub fn new(own_namespace: String, own_address: String) -> Self {
        let mut node_addresses = HashMap::new();
        node_addresses.insert(own_namespace.clone(), own_address);
        State {
            own_namespace,
            router_conns: HashMap::new(),
            directory: HashMap::new(),
            heartbeat: HashMap::new(),
            peers: HashMap::new(),
            waiting: HashMap::new(),
            conn_id_to_key: HashMap::new(),
            peer_identities: HashMap::new(),
            peer_heartbeat: HashMap::new(),
            node_addresses,
            global_directory: HashMap::new(),
            running: true,
        }
    }

    /// Local component names reported by `LIST`. `COORDINATOR` is a
    /// placeholder, never a real entry, so it never appears here regardless.
    pub fn local_names(&self) -> Vec<String> {
        self.directory.keys().cloned().collect()
    }

    fn forget_local(&mut self, name: &str) {
        self.directory.remove(name);
        self.heartbeat.remove(name);
    }

    fn forget_peer_identity(&mut self, identity: Identity) {
        self.peer_identities.remove(&identity);
        self.peer_heartbeat.remove(&identity);
    }

    /// Removes a peer's dealer entry wherever it currently lives (`peers` or
    /// `waiting`) and returns it, so the caller can close its socket.
    pub fn take_peer_entry(&mut self, key: &str) -> Option<PeerEntry> {
        if let Some(entry) = self.peers.remove(key) {
            self.conn_id_to_key.remove(&entry.conn_id);
            return Some(entry);
        }
        if let Some(entry) = self.waiting.remove(key) {
            self.conn_id_to_key.remove(&entry.conn_id);
            return Some(entry);
        }
        None
    }

    /// Current key (namespace or temp token) a dealer connection id is
    /// stored under, if it's still live.
    pub fn key_for_conn(&self, conn_id: DealerConnId) -> Option<String> {
        self.conn_id_to_key.get(&conn_id).cloned()
    }

    /// Forgets any router-side peer identity bound to `namespace`, used when
    /// the outbound dealer for that namespace has gone away so the two
    /// correlated maps don't drift out of sync (§9 "cyclic reference").
    pub fn forget_peer_namespace(&mut self, namespace: &str) {
        let stale: Vec<Identity> = self
            .peer_identities
            .iter()
            .filter(|(_, ns)| ns.as_str() == namespace)
            .map(|(identity, _)| *identity)
            .collect();
        for identity in stale {
            self.forget_peer_identity(identity);
        }
    }
}

/// Outcome of one sweep pass, so the caller (the actor) knows which
/// components/peers to ping and which dealers to close.
#[derive(Default)]
pub struct SweepActions {
    pub ping_components: Vec<(String, Identity)>,
    pub ping_peers: Vec<(String, Identity)>,
    pub forgotten_peer_dealers: Vec<PeerEntry>,
}

/// Runs the expiry sweep (§4.5) at monotonic time `now` against
/// `expiration`. All map writes happen here, on the actor's task.
pub fn sweep(state: &mut State, expiration: Duration, now: Instant) -> SweepActions {
    let mut actions = SweepActions::default();

    let stale_names: Vec<String> = state
        .heartbeat
        .iter()
        .filter(|(_, t)| now > **t + expiration * 2)
        .map(|(name, _)| name.clone())
        .collect();
    for name in &stale_names {
        state.forget_local(name);
    }
    for (name, t) in state.heartbeat.iter() {
        if now > *t + expiration {
            if let Some(identity) = state.directory.get(name) {
                actions.ping_components.push((name.clone(), *identity));
            }
        }
    }

    let stale_identities: Vec<Identity> = state
        .peer_heartbeat
        .iter()
        .filter(|(_, t)| now > **t + expiration * 2)
        .map(|(identity, _)| *identity)
        .collect();
    for identity in &stale_identities {
        if let Some(ns) = state.peer_identities.get(identity).cloned() {
            if let Some(entry) = state.take_peer_entry(&ns) {
                actions.forgotten_peer_dealers.push(entry);
            }
        }
        state.forget_peer_identity(*identity);
    }

    let mut orphaned = Vec::new();
    for (identity, t) in state.peer_heartbeat.iter() {
        if now > *t + expiration {
            match state.peer_identities.get(identity) {
                Some(ns) => actions.ping_peers.push((ns.clone(), *identity)),
                None => orphaned.push(*identity),
            }
        }
    }
    for identity in orphaned {
        state.peer_heartbeat.remove(&identity);
    }

    actions
}

/// `CLEAR` (§4.3): forget every local component and every peer right now,
/// regardless of how recently they were seen.
pub fn force_clear(state: &mut State) -> SweepActions {
    let mut actions = SweepActions::default();
    state.directory.clear();
    state.heartbeat.clear();

    let namespaces: Vec<String> = state.peers.keys().cloned().collect();
    for ns in namespaces {
        if let Some(entry) = state.take_peer_entry(&ns) {
            actions.forgotten_peer_dealers.push(entry);
        }
    }
    let waiting_keys: Vec<String> = state.waiting.keys().cloned().collect();
    for key in waiting_keys {
        if let Some(entry) = state.take_peer_entry(&key) {
            actions.forgotten_peer_dealers.push(entry);
        }
    }
    state.peer_identities.clear();
    state.peer_heartbeat.clear();
    actions
}
