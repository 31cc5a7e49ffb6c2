//! Ingress listener (C4): the UDP/53 receive loop.
//!
//! Only parses, maps and enqueues — never performs TLS or upstream I/O
//! inline. Restarts itself from scratch on an unexpected socket error,
//! since no client-side state needs to survive a restart.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{error, trace};

use crate::codec;
use crate::outbound::OutboundQueue;
use crate::stats::Stats;
use crate::tracker::Tracker;

/// RFC 1035 says 512 bytes is the classic UDP limit; 1024 leaves headroom
/// for EDNS0 OPT records we don't otherwise interpret.
const RECV_BUF_SIZE: usize = 1024;

/// Runs the receive loop against an already-bound socket, shared with the
/// demultiplexer so replies go out from the same binding queries arrived
/// on (invariant 4). An unexpected recv error is logged and the loop
/// resumes rather than propagating, matching the "listener restarts
/// itself" policy in `spec.md` §4.4/§7 — no client-side state depends on
/// a particular receive iteration surviving.
pub async fn run(
    socket: Arc<UdpSocket>,
    allow_qtypes: Arc<Vec<u16>>,
    tracker: Arc<Tracker>,
    queue: Arc<OutboundQueue>,
    stats: Arc<Stats>,
) {
    let mut buf = [0u8; RECV_BUF_SIZE];
    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(err) => {
                error!(%err, "ingress listener fault");
                continue;
            }
        };
        stats.record_received();
        handle_datagram(&buf[..len], src, &allow_qtypes, &tracker, &queue, &stats);
    }
}

fn handle_datagram(
    data: &[u8],
    src: SocketAddr,
    allow_qtypes: &[u16],
    tracker: &Tracker,
    queue: &OutboundQueue,
    stats: &Stats,
) {
    let Ok(parsed) = codec::parse_udp(data) else {
        stats.record_dropped_malformed();
        trace!(%src, "dropping malformed ingress datagram");
        return;
    };

    if !allow_qtypes.contains(&parsed.qtype) {
        stats.record_dropped_unsupported_qtype();
        trace!(%src, qtype = parsed.qtype, "dropping unsupported qtype");
        return;
    }

    let upstream_id = match tracker.allocate() {
        Ok(id) => id,
        Err(_) => {
            stats.record_dropped_id_exhausted();
            trace!(%src, "dropping query, id allocator exhausted");
            return;
        }
    };

    let Ok(frame) = codec::udp_to_tls(data, upstream_id) else {
        // Can't happen: parse_udp already validated the header, but guard
        // against the allocated id leaking if it somehow does.
        tracker.reap_if(|id| id == upstream_id);
        return;
    };

    tracker.bind(upstream_id, parsed.id, src);

    if !queue.push(frame) {
        stats.record_dropped_queue_full();
        tracker.reap_if(|id| id == upstream_id);
        trace!(%src, "dropping query, outbound queue full");
        return;
    }

    stats.record_forwarded();
}
