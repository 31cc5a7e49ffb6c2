//! Error taxonomy for the relay core.
//!
//! These map directly onto the recoverable-error table: callers match on
//! the variant to decide drop-silently vs. log-and-continue vs. mark-
//! resolver-cooling, never on a string message.

use thiserror::Error;

/// Failures from [`crate::codec`] operations on malformed or truncated
/// wire data. Always handled by dropping the offending message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("DNS message header or question section is truncated")]
    MalformedMessage,
    #[error("TCP frame length prefix does not match payload length")]
    ShortFrame,
}

/// Failure from [`crate::tracker::Tracker::allocate`]: no free upstream ID
/// was found within the bounded probe budget. Treated as transient
/// backpressure; the caller drops the query.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no free upstream transaction ID after bounded probing")]
pub struct AllocError;

/// Failures that prevent the process from starting at all. These are the
/// only errors allowed to terminate the process with a non-zero exit code.
#[derive(Debug, Error)]
pub enum FatalInitError {
    #[error("failed to bind UDP listener on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load TLS trust store: {0}")]
    TrustStore(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}
