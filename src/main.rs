//! dot-relay — a local recursive-less DNS relay.
//!
//! Forwards plaintext UDP/53 queries from the LAN to an upstream resolver
//! over DNS-over-TLS (RFC 7858, TCP/853).

use clap::Parser;

use dot_relay::config::{Args, RelayConfig};
use dot_relay::proxy;

fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let level = RelayConfig::tracing_level(args.verbose);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    let config = RelayConfig::from_args(args);
    let workers = config.workers;

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?
        .block_on(proxy::run(config))
}
