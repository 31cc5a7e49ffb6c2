//! Configuration surface: CLI flags with environment-variable fallbacks,
//! matching `spec.md` §6.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

const DEFAULT_QTYPE_A: u16 = 1;

#[derive(Parser, Debug)]
#[command(name = "dot-relay")]
#[command(about = "Local DNS relay forwarding plaintext UDP queries over DNS-over-TLS")]
pub struct Args {
    /// IPv4 address to bind the UDP listener on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1")]
    pub listen: Ipv4Addr,

    /// UDP port to bind the listener on.
    #[arg(long, env = "LISTEN_PORT", default_value_t = 53)]
    pub port: u16,

    /// Upstream DNS-over-TLS resolver, tried in the given order.
    /// May be repeated; falls back to RESOLVER_1/RESOLVER_2 if unset.
    #[arg(long = "resolver")]
    pub resolvers: Vec<String>,

    /// Seconds a resolver stays in cooldown after a failed handshake.
    #[arg(long, env = "TLS_RETRY_SECONDS", default_value_t = 60)]
    pub tls_retry_seconds: u64,

    /// Path to a PEM CA bundle. Defaults to the OS trust store.
    #[arg(long, env = "CA_BUNDLE_PATH")]
    pub ca_bundle: Option<PathBuf>,

    /// QTYPE values to forward; all others are dropped silently. Defaults
    /// to A-record only, matching the baseline behavior in `spec.md` §4.4.
    #[arg(long = "allow-qtype")]
    pub allow_qtypes: Vec<u16>,

    /// Number of tokio worker threads. Defaults to 2x logical cores.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Increase log verbosity (-v, -vv). Overridden by RUST_LOG if set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Resolved, validated configuration used by the relay core.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub resolvers: Vec<String>,
    pub tls_retry: Duration,
    pub ca_bundle: Option<PathBuf>,
    pub allow_qtypes: Vec<u16>,
    pub workers: usize,
}

impl RelayConfig {
    pub fn from_args(args: Args) -> Self {
        let listen_addr = SocketAddr::new(IpAddr::V4(args.listen), args.port);

        let mut resolvers = args.resolvers;
        if resolvers.is_empty() {
            resolvers.push(
                std::env::var("RESOLVER_1").unwrap_or_else(|_| "1.1.1.1".to_string()),
            );
            resolvers.push(
                std::env::var("RESOLVER_2").unwrap_or_else(|_| "1.0.0.1".to_string()),
            );
        }

        let allow_qtypes = if args.allow_qtypes.is_empty() {
            vec![DEFAULT_QTYPE_A]
        } else {
            args.allow_qtypes
        };

        let workers = args.workers.unwrap_or_else(|| {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            cores * 2
        });

        Self {
            listen_addr,
            resolvers,
            tls_retry: Duration::from_secs(args.tls_retry_seconds),
            ca_bundle: args.ca_bundle,
            allow_qtypes,
            workers,
        }
    }

    pub fn tracing_level(verbose: u8) -> &'static str {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allow_qtypes_is_a_only() {
        let args = Args {
            listen: Ipv4Addr::LOCALHOST,
            port: 53,
            resolvers: vec!["1.1.1.1".into()],
            tls_retry_seconds: 60,
            ca_bundle: None,
            allow_qtypes: vec![],
            workers: None,
            verbose: 0,
        };
        let config = RelayConfig::from_args(args);
        assert_eq!(config.allow_qtypes, vec![1]);
    }
}
