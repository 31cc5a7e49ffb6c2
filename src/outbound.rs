//! The outbound FIFO described in `spec.md` §3/§5: a bounded queue of
//! TCP-framed DNS messages waiting to be written to an upstream TLS
//! session. Producer is the ingress listener; consumer is the dispatcher.
//!
//! Backed by a locked `VecDeque` rather than a channel because the
//! dispatcher needs a non-destructive snapshot of pending work (§4.5 step
//! 1) before committing to draining it onto a freshly connected socket.

use std::collections::VecDeque;
use std::sync::Mutex;

const DEFAULT_CAPACITY: usize = 10_000;

pub struct OutboundQueue {
    inner: Mutex<VecDeque<Vec<u8>>>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Append a message. Returns `false` and drops the message if the
    /// queue is at capacity (drop-newest, per §5 backpressure policy); the
    /// caller is responsible for reclaiming the associated tracker ticket.
    pub fn push(&self, message: Vec<u8>) -> bool {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(message);
        true
    }

    /// Non-destructive snapshot of everything currently queued, in FIFO
    /// order. Used by the dispatcher to decide whether there is work
    /// before it pays for a TLS handshake.
    pub fn snapshot(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().iter().cloned().collect()
    }

    /// Remove the front entry once it has been successfully written.
    /// Only ever called by the single dispatcher task, in the same order
    /// as [`Self::snapshot`] returned it.
    pub fn pop_front(&self) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Commit the outcome of attempting to send a batch of `count` messages
    /// taken from the front via [`Self::snapshot`]. `sent[i]` is whether
    /// the i-th message of that batch was successfully written; messages
    /// that weren't are re-queued at the front, in their original order, so
    /// a per-send failure doesn't desync queue removal from what was
    /// actually sent (a blind `pop_front` per success would pop whatever
    /// message currently sits at the front, not the one just written).
    ///
    /// Relies on the dispatcher being the sole consumer: the front `count`
    /// entries are still exactly this batch, in order, since only
    /// producers (never another consumer) can have touched the queue
    /// since the snapshot was taken.
    pub fn commit_sent(&self, count: usize, sent: &[bool]) {
        let mut queue = self.inner.lock().unwrap();
        let mut unsent = VecDeque::with_capacity(count);
        for i in 0..count {
            let Some(message) = queue.pop_front() else {
                break;
            };
            if !sent.get(i).copied().unwrap_or(false) {
                unsent.push_back(message);
            }
        }
        for message in unsent.into_iter().rev() {
            queue.push_front(message);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
