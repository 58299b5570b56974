//! CLI and runtime configuration (§6 "CLI", §10.3).

use clap::{arg, value_parser, Command};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 12300;
const DEFAULT_BIND_HOST: &str = "localhost";
const DEFAULT_CLEANING_INTERVAL_SECS: u64 = 5;
const DEFAULT_EXPIRATION_SECS: u64 = 15;

pub struct Config {
    pub bind_host: String,
    pub bind_port: u16,
    pub own_namespace: String,
    pub initial_peer: Option<String>,
    pub verbose: bool,
    pub cleaning_interval: Duration,
    pub expiration: Duration,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}

fn default_namespace() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .and_then(|h| h.split('.').next().map(str::to_string))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "N1".to_string())
}

/// Parses CLI flags with `clap`'s builder API, matching this codebase's
/// existing entry point style (§10.3).
pub fn parse() -> Config {
    let matches = Command::new("leco-coordinator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Routing node for the LECO laboratory experiment control messaging fabric")
        .arg(arg!(-h --host <HOST> "Bind host, overriding the default").default_value(DEFAULT_BIND_HOST))
        .arg(
            arg!(-p --port <PORT> "Bind port")
                .default_value(DEFAULT_PORT.to_string())
                .value_parser(value_parser!(u16)),
        )
        .arg(arg!(-n --namespace <NAMESPACE> "This Coordinator's own namespace"))
        .arg(arg!(-c --connect <"HOST[:PORT]"> "Initial peer Coordinator to connect to"))
        .arg(arg!(-v --verbose ... "Raise diagnostic verbosity"))
        .get_matches();

    let bind_host = matches.get_one::<String>("host").cloned().unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());
    let bind_port = matches.get_one::<u16>("port").copied().unwrap_or(DEFAULT_PORT);
    let own_namespace = matches.get_one::<String>("namespace").cloned().unwrap_or_else(default_namespace);
    let initial_peer = matches.get_one::<String>("connect").cloned().map(|peer| normalize_peer_addr(&peer));
    let verbose = matches.get_count("verbose") > 0;

    Config {
        bind_host,
        bind_port,
        own_namespace,
        initial_peer,
        verbose,
        cleaning_interval: Duration::from_secs(DEFAULT_CLEANING_INTERVAL_SECS),
        expiration: Duration::from_secs(DEFAULT_EXPIRATION_SECS),
    }
}

/// `-c host` implies our default port; `-c host:port` is used as-is.
fn normalize_peer_addr(peer: &str) -> String {
    if peer.contains(':') {
        peer.to_string()
    } else {
        format!("{peer}:{DEFAULT_PORT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_host_with_default_port() {
        assert_eq!(normalize_peer_addr("n2host"), format!("n2host:{DEFAULT_PORT}"));
    }

    #[test]
    fn leaves_explicit_port_alone() {
        assert_eq!(normalize_peer_addr("n2host:9999"), "n2host:9999");
    }
}
