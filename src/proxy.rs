//! Relay orchestration: wires up C2–C7 around a shared [`RelayContext`]
//! and runs until shut down.
//!
//! This replaces the teacher's per-process-global `dns_servers`/
//! `dns_connection_tracker` dictionaries (see `spec.md` §9, "Global
//! mutable state") with a single context value constructed once in
//! [`run`] and shared by `Arc` into each task.

use std::io;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::info;

use crate::config::RelayConfig;
use crate::error::FatalInitError;
use crate::outbound::OutboundQueue;
use crate::stats::Stats;
use crate::tracker::Tracker;
use crate::upstream::{resolve_entry, HealthRegistry};
use crate::{dispatcher, ingress};

/// Shared state handed to every task: the tracker, outbound queue,
/// resolver health table and the single UDP socket used for both
/// receiving queries and sending replies.
pub struct RelayContext {
    pub tracker: Arc<Tracker>,
    pub queue: Arc<OutboundQueue>,
    pub stats: Arc<Stats>,
    pub udp_socket: Arc<UdpSocket>,
}

/// Bind the listener and construct the shared state. Failures here are
/// the only ones that abort the process (`spec.md` §6 exit codes / §7
/// `FatalInit`).
pub async fn build(config: &RelayConfig) -> Result<(RelayContext, HealthRegistry), FatalInitError> {
    let udp_socket = UdpSocket::bind(config.listen_addr)
        .await
        .map_err(|source| FatalInitError::Bind {
            addr: config.listen_addr,
            source,
        })?;

    let mut resolvers = Vec::with_capacity(config.resolvers.len());
    for spec in &config.resolvers {
        match resolve_entry(spec) {
            Ok(entry) => resolvers.push(entry),
            Err(err) => {
                return Err(FatalInitError::Config(format!(
                    "invalid resolver address {spec}: {err}"
                )))
            }
        }
    }
    if resolvers.is_empty() {
        return Err(FatalInitError::Config("no resolvers configured".to_string()));
    }

    let registry = HealthRegistry::new(resolvers, config.tls_retry, config.ca_bundle.as_deref())?;

    let context = RelayContext {
        tracker: Arc::new(Tracker::new()),
        queue: Arc::new(OutboundQueue::new()),
        stats: Arc::new(Stats::new()),
        udp_socket: Arc::new(udp_socket),
    };

    Ok((context, registry))
}

/// Run the relay with the given configuration until the process receives
/// a shutdown signal (Ctrl-C). Returns once all tasks have wound down.
pub async fn run(config: RelayConfig) -> io::Result<()> {
    let (context, registry) = build(&config).await.map_err(|err| {
        io::Error::new(io::ErrorKind::Other, err.to_string())
    })?;

    info!(
        listen = %config.listen_addr,
        resolvers = ?config.resolvers,
        "dot-relay starting"
    );

    let allow_qtypes = Arc::new(config.allow_qtypes.clone());

    let ingress_handle = tokio::spawn(ingress::run(
        Arc::clone(&context.udp_socket),
        allow_qtypes,
        Arc::clone(&context.tracker),
        Arc::clone(&context.queue),
        Arc::clone(&context.stats),
    ));

    let dispatcher_handle = tokio::spawn(dispatcher::run(
        config.listen_addr,
        Arc::clone(&context.queue),
        Arc::clone(&context.tracker),
        registry,
        Arc::clone(&context.udp_socket),
        Arc::clone(&context.stats),
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, winding down");

    ingress_handle.abort();
    dispatcher_handle.abort();
    context.tracker.reap_if(|_| true);

    Ok(())
}
