//! dot-relay — a local recursive-less DNS relay.
//!
//! Accepts plaintext DNS queries from LAN clients over UDP/53 and
//! resolves them via an upstream resolver reached over DNS-over-TLS on
//! TCP/853 (RFC 7858). The LAN keeps using ordinary UDP DNS while all
//! off-network traffic is encrypted.
//!
//! # Architecture
//!
//! - [`codec`] — DNS wire parsing, UDP<->TCP framing, ID rewrite, TTL floor
//! - [`tracker`] — upstream ID allocation and the client-identity map
//! - [`outbound`] — the bounded FIFO between ingress and the dispatcher
//! - [`ingress`] — the UDP/53 receive loop
//! - [`dispatcher`] — drains the outbound queue onto a DoT session and
//!   demultiplexes its responses back to clients
//! - [`upstream`] — per-resolver health tracking and the DoT connect path
//! - [`config`] — configuration surface
//! - [`stats`] — steady-state counters
//! - [`error`] — the error taxonomy
//! - [`proxy`] — wires the above together into a running relay

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ingress;
pub mod outbound;
pub mod proxy;
pub mod stats;
pub mod tracker;
pub mod upstream;
