//! Upstream health registry and DoT connect path (C7).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::warn;

use crate::error::FatalInitError;
use crate::stats::Stats;

const DNS_TLS_PORT: u16 = 853;

/// Per-resolver reachability state, read and written only by the
/// dispatcher task (single-writer; no locking required).
pub struct ResolverEntry {
    pub host: String,
    pub addr: SocketAddr,
    tls_ok: bool,
    retry_at: Option<Instant>,
}

impl ResolverEntry {
    fn new(host: String, addr: SocketAddr) -> Self {
        Self {
            host,
            addr,
            tls_ok: true,
            retry_at: None,
        }
    }

    /// True when the resolver is eligible for a connect attempt: either it
    /// last succeeded, or its cooldown has elapsed.
    pub fn eligible(&self, cooldown: Duration) -> bool {
        match self.retry_at {
            None => true,
            Some(retry_at) => self.tls_ok || retry_at.elapsed() >= cooldown,
        }
    }

    fn mark_success(&mut self) {
        self.tls_ok = true;
        self.retry_at = None;
    }

    fn mark_failure(&mut self) {
        self.tls_ok = false;
        self.retry_at = Some(Instant::now());
    }
}

/// The ordered set of configured resolvers plus the TLS client config used
/// to reach all of them.
pub struct HealthRegistry {
    pub resolvers: Vec<ResolverEntry>,
    connector: TlsConnector,
    cooldown: Duration,
}

impl HealthRegistry {
    pub fn new(
        resolvers: Vec<ResolverEntry>,
        cooldown: Duration,
        ca_bundle: Option<&std::path::Path>,
    ) -> Result<Self, FatalInitError> {
        let root_store = build_root_store(ca_bundle)?;
        let client_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(Self {
            resolvers,
            connector: TlsConnector::from(Arc::new(client_config)),
            cooldown,
        })
    }

    /// Attempt a DoT handshake to the first eligible resolver, in
    /// configured order. Returns the established session and the index of
    /// the resolver it connected to, or `None` if every eligible resolver
    /// failed.
    pub async fn connect_first_eligible(
        &mut self,
        listen_addr: SocketAddr,
        stats: &Stats,
    ) -> Option<(TlsStream<TcpStream>, usize)> {
        for idx in 0..self.resolvers.len() {
            if !self.resolvers[idx].eligible(self.cooldown) {
                continue;
            }
            match self.connect(idx, listen_addr).await {
                Ok(session) => {
                    self.resolvers[idx].mark_success();
                    return Some((session, idx));
                }
                Err(err) => {
                    warn!(resolver = %self.resolvers[idx].host, error = %err, "DoT handshake failed");
                    self.resolvers[idx].mark_failure();
                    stats.record_resolver_cooldown();
                }
            }
        }
        None
    }

    async fn connect(
        &self,
        idx: usize,
        listen_addr: SocketAddr,
    ) -> std::io::Result<TlsStream<TcpStream>> {
        let entry = &self.resolvers[idx];

        // Bind the local endpoint to the listen address, any ephemeral
        // port, per `spec.md` §4.7 step 1.
        let socket = tokio::net::TcpSocket::new_v4()?;
        socket.bind(SocketAddr::new(listen_addr.ip(), 0))?;
        let tcp = socket.connect(entry.addr).await?;

        let server_name = ServerName::try_from(entry.host.clone())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        self.connector.connect(server_name, tcp).await
    }
}

fn build_root_store(
    ca_bundle: Option<&std::path::Path>,
) -> Result<RootCertStore, FatalInitError> {
    let mut store = RootCertStore::empty();

    if let Some(path) = ca_bundle {
        let pem = std::fs::read(path)
            .map_err(|e| FatalInitError::TrustStore(format!("{}: {e}", path.display())))?;
        let mut reader = std::io::Cursor::new(pem);
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| FatalInitError::TrustStore(e.to_string()))?;
            store
                .add(cert)
                .map_err(|e| FatalInitError::TrustStore(e.to_string()))?;
        }
        return Ok(store);
    }

    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        warn!(%err, "error loading a native certificate");
    }
    for cert in native.certs {
        store
            .add(cert)
            .map_err(|e| FatalInitError::TrustStore(e.to_string()))?;
    }
    if store.is_empty() {
        return Err(FatalInitError::TrustStore(
            "no certificates loaded from OS trust store".to_string(),
        ));
    }
    Ok(store)
}

/// Resolve a configured `host[:port]` or bare address into a `ResolverEntry`.
pub fn resolve_entry(spec: &str) -> std::io::Result<ResolverEntry> {
    let host = spec.split(':').next().unwrap_or(spec).to_string();
    let ip: std::net::IpAddr = host
        .parse()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid resolver address"))?;
    Ok(ResolverEntry::new(host, SocketAddr::new(ip, DNS_TLS_PORT)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ResolverEntry {
        ResolverEntry::new("1.1.1.1".to_string(), SocketAddr::from(([1, 1, 1, 1], 853)))
    }

    #[test]
    fn fresh_entry_is_eligible() {
        assert!(entry().eligible(Duration::from_secs(60)));
    }

    #[test]
    fn failed_entry_is_not_eligible_before_cooldown() {
        let mut e = entry();
        e.mark_failure();
        assert!(!e.eligible(Duration::from_secs(60)));
    }

    #[test]
    fn entry_becomes_eligible_after_cooldown() {
        let mut e = entry();
        e.mark_failure();
        assert!(e.eligible(Duration::from_millis(0)));
    }

    #[test]
    fn success_clears_cooldown_state() {
        let mut e = entry();
        e.mark_failure();
        e.mark_success();
        assert!(e.eligible(Duration::from_secs(60)));
    }

    #[test]
    fn resolve_entry_parses_bare_ipv4() {
        let entry = resolve_entry("1.0.0.1").unwrap();
        assert_eq!(entry.addr, SocketAddr::from(([1, 0, 0, 1], 853)));
    }
}
