//! Transport-assigned identity, the opaque handle the router uses to
//! address a specific connection on R.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(u64);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
impl From<u64> for Identity {
    fn from(value: u64) -> Self {
        Identity(value)
    }
}

/// Hands out identities for newly accepted R connections. Never reuses a
/// value within one Coordinator's lifetime.
#[derive(Default)]
pub struct IdentitySource(AtomicU64);

impl IdentitySource {
    pub fn new() -> Self {
        IdentitySource(AtomicU64::new(1))
    }

    pub fn next(&self) -> Identity {
        Identity(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifies one dealer (outbound) connection for its whole lifetime, even
/// as the namespace key it is stored under changes from a temporary token to
/// the peer's true namespace on handshake ack (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DealerConnId(u64);

impl fmt::Display for DealerConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dealer-{}", self.0)
    }
}

#[cfg(test)]
impl From<u64> for DealerConnId {
    fn from(value: u64) -> Self {
        DealerConnId(value)
    }
}

#[derive(Default)]
pub struct DealerConnIdSource(AtomicU64);

impl DealerConnIdSource {
    pub fn new() -> Self {
        DealerConnIdSource(AtomicU64::new(1))
    }

    pub fn next(&self) -> DealerConnId {
        DealerConnId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// A freshly generated temporary token used to key a `WAITING_ACK` dealer
/// before its peer's true namespace is known (§3, §4.4).
pub fn temp_peer_token() -> String {
    use rand::Rng;
    let suffix: u64 = rand::thread_rng().gen();
    format!("tmp-{suffix:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_distinct_and_increasing() {
        let source = IdentitySource::new();
        let a = source.next();
        let b = source.next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn dealer_conn_ids_are_distinct() {
        let source = DealerConnIdSource::new();
        let a = source.next();
        let b = source.next();
        assert_ne!(a, b);
    }

    #[test]
    fn temp_tokens_are_distinct() {
        assert_ne!(temp_peer_token(), temp_peer_token());
    }
}
