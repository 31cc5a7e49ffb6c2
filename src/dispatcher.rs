//! Upstream dispatcher (C5) and response demultiplexer (C6).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::codec;
use crate::outbound::OutboundQueue;
use crate::stats::Stats;
use crate::tracker::Tracker;
use crate::upstream::HealthRegistry;

/// How often the dispatcher checks the outbound queue for work.
const WAKE_INTERVAL: Duration = Duration::from_millis(10);
/// How long a demultiplexer waits for the next frame before treating the
/// session as idle and closing it.
const READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Read chunk size; DoT responses are not length-capped the way UDP
/// replies are, so this is just an I/O granularity, not a message cap.
const READ_CHUNK: usize = 4096;

/// Periodic worker: drains the outbound queue onto a freshly connected DoT
/// session and spawns a demultiplexer to read the replies.
pub async fn run(
    listen_addr: SocketAddr,
    queue: Arc<OutboundQueue>,
    tracker: Arc<Tracker>,
    mut registry: HealthRegistry,
    udp_socket: Arc<UdpSocket>,
    stats: Arc<Stats>,
) {
    let mut next_session: u64 = 0;

    loop {
        sleep(WAKE_INTERVAL).await;

        if queue.is_empty() {
            continue;
        }

        let batch = queue.snapshot();
        let Some((session_conn, _idx)) =
            registry.connect_first_eligible(listen_addr, &stats).await
        else {
            // No resolver reachable this tick; messages stay queued and
            // are retried on the next wake.
            continue;
        };

        let session = next_session;
        next_session = next_session.wrapping_add(1);

        let (mut read_half, mut write_half) = tokio::io::split(session_conn);

        // Spawn the demultiplexer before writing anything: a response can
        // legitimately arrive before the batch finishes sending.
        let sent_ids = Arc::new(std::sync::Mutex::new(Vec::with_capacity(batch.len())));
        let demux_tracker = Arc::clone(&tracker);
        let demux_udp = Arc::clone(&udp_socket);
        let demux_stats = Arc::clone(&stats);
        let demux_sent_ids = Arc::clone(&sent_ids);
        tokio::spawn(async move {
            demux_loop(&mut read_half, &demux_tracker, &demux_udp, &demux_stats).await;
            // Reap only the ids this session actually delivered-or-not;
            // an id that was taken and rebound to a newer query by the
            // time this session closes is left alone (it belongs to
            // whichever session sends it next).
            let ids = demux_sent_ids.lock().unwrap();
            demux_tracker.reap_session(session, ids.iter().copied());
        });

        // `sent[i]` records whether `batch[i]` was actually written, so
        // the queue only drops what was sent rather than blindly popping
        // its current front once per success (which would desync from
        // the batch on any earlier failure).
        let mut sent_flags = Vec::with_capacity(batch.len());
        let mut sent = 0usize;
        for message in &batch {
            match write_half.write_all(message).await {
                Ok(()) => {
                    sent_flags.push(true);
                    sent += 1;
                    if message.len() >= 4 {
                        let id = u16::from_be_bytes([message[2], message[3]]);
                        tracker.tag_sent(id, session);
                        sent_ids.lock().unwrap().push(id);
                    }
                }
                Err(err) => {
                    warn!(%err, "failed to write batch message to upstream session");
                    // Leave the ticket in the tracker and the message in
                    // the queue for a later retry.
                    sent_flags.push(false);
                }
            }
        }
        queue.commit_sent(batch.len(), &sent_flags);
        trace!(batch_len = batch.len(), sent, "drained outbound batch");

        if let Err(err) = write_half.shutdown().await {
            debug!(%err, "half-close of upstream write side failed");
        }
    }
}

/// One instance per active upstream session (C6). Reads TCP-framed
/// responses, reassembling across segment boundaries, and relays each one
/// whose ticket is still live back to its originating client.
async fn demux_loop<R>(read_half: &mut R, tracker: &Tracker, udp_socket: &UdpSocket, stats: &Stats)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);

    loop {
        let read_result = tokio::time::timeout(READ_TIMEOUT, read_more(read_half, &mut buf)).await;
        let got_data = match read_result {
            Ok(Ok(n)) => n,
            Ok(Err(err)) => {
                debug!(%err, "upstream session read error");
                break;
            }
            Err(_) => {
                debug!("upstream session idle timeout");
                break;
            }
        };
        if got_data == 0 {
            break; // clean EOF after half-close
        }

        while let Some(frame_total) = next_frame_total(&buf) {
            if buf.len() < frame_total {
                break;
            }
            let frame: Vec<u8> = buf.drain(..frame_total).collect();
            handle_frame(&frame, tracker, udp_socket, stats).await;
        }
    }
}

async fn read_more<R>(read_half: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    let n = read_half.read(&mut chunk).await?;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

/// Total frame length (length prefix + payload) if the 2-byte prefix has
/// arrived yet, regardless of whether the payload has fully arrived.
fn next_frame_total(buf: &[u8]) -> Option<usize> {
    if buf.len() < 2 {
        return None;
    }
    let declared = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    Some(declared + 2)
}

async fn handle_frame(frame: &[u8], tracker: &Tracker, udp_socket: &UdpSocket, stats: &Stats) {
    let Ok(parsed) = codec::parse_tls(frame) else {
        trace!("dropping malformed upstream frame");
        return;
    };

    let Some(ticket) = tracker.take(parsed.id) else {
        stats.record_stale_response();
        trace!(upstream_id = parsed.id, "no ticket for upstream response, discarding");
        return;
    };

    let Ok(payload) = codec::rewrite(&frame[2..], ticket.client_id) else {
        trace!("dropping unrewritable upstream response");
        return;
    };

    if let Err(err) = udp_socket.send_to(&payload, ticket.client_addr).await {
        warn!(%err, client = %ticket.client_addr, "failed to deliver reply to client");
        return;
    }
    stats.record_reply_delivered();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UdpSocket;

    #[test]
    fn next_frame_total_includes_prefix() {
        let buf = [0x00, 0x02, 0xAB, 0xCD];
        assert_eq!(next_frame_total(&buf), Some(4));
    }

    #[test]
    fn next_frame_total_none_when_prefix_incomplete() {
        assert_eq!(next_frame_total(&[0x00]), None);
    }

    fn response_frame(upstream_id: u16, domain: &str, ttl: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&upstream_id.to_be_bytes());
        body.extend_from_slice(&[0x81, 0x80]);
        body.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
        body.extend_from_slice(&[0x00, 0x01]); // ANCOUNT
        body.extend_from_slice(&[0x00, 0x00]);
        body.extend_from_slice(&[0x00, 0x00]);
        for label in domain.split('.') {
            body.push(label.len() as u8);
            body.extend_from_slice(label.as_bytes());
        }
        body.push(0);
        body.extend_from_slice(&[0x00, 0x01]);
        body.extend_from_slice(&[0x00, 0x01]);
        body.extend_from_slice(&[0xC0, 0x0C]);
        body.extend_from_slice(&[0x00, 0x01]);
        body.extend_from_slice(&[0x00, 0x01]);
        body.extend_from_slice(&ttl.to_be_bytes());
        body.extend_from_slice(&4u16.to_be_bytes());
        body.extend_from_slice(&[93, 184, 216, 34]);

        let len: u16 = body.len().try_into().unwrap();
        let mut frame = Vec::with_capacity(2 + body.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// S6: two response frames arriving in a single read are both decoded
    /// and dispatched, with no cross-frame byte mixing.
    #[tokio::test]
    async fn demux_reassembles_two_frames_from_one_read() {
        let tracker = Tracker::new();
        let stats = Stats::new();
        let client_a: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let client_b: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let reply_sock_a = UdpSocket::bind(client_a).await.unwrap();
        let reply_sock_b = UdpSocket::bind(client_b).await.unwrap();
        let relay_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        tracker.bind(100, 0xAAAA, reply_sock_a.local_addr().unwrap());
        tracker.bind(200, 0xBBBB, reply_sock_b.local_addr().unwrap());

        let (mut client, mut server) = tokio::io::duplex(4096);
        let mut combined = response_frame(100, "one.example", 10);
        combined.extend_from_slice(&response_frame(200, "two.example", 20));
        server.write_all(&combined).await.unwrap();
        server.shutdown().await.unwrap();

        demux_loop(&mut client, &tracker, &relay_sock, &stats).await;

        let mut buf = [0u8; 512];
        let (len, _) = reply_sock_a.recv_from(&mut buf).await.unwrap();
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), 0xAAAA);
        let _ = len;

        let (len, _) = reply_sock_b.recv_from(&mut buf).await.unwrap();
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), 0xBBBB);
        let _ = len;

        assert!(tracker.is_empty());
    }

    /// S5: a response whose ticket was already taken (duplicate) is
    /// dropped without emitting a reply.
    #[tokio::test]
    async fn stale_response_is_dropped() {
        let tracker = Tracker::new();
        let stats = Stats::new();
        let relay_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // No ticket bound for id 999.
        let (mut client, mut server) = tokio::io::duplex(4096);
        server
            .write_all(&response_frame(999, "gone.example", 10))
            .await
            .unwrap();
        server.shutdown().await.unwrap();

        demux_loop(&mut client, &tracker, &relay_sock, &stats).await;

        assert_eq!(stats.snapshot_and_reset().stale_responses, 1);
        assert!(tracker.is_empty());
    }
}
