//! ID allocator (C2) and connection tracker (C3).
//!
//! Both are implemented on top of a single `Mutex` because §4.2 requires
//! the allocator's "draw random, test membership, insert placeholder"
//! sequence to be atomic with respect to every other tracker mutation —
//! two separate locks could let two callers settle on the same ID.

use std::net::SocketAddr;
use std::sync::Mutex;

use rand::Rng;
use rustc_hash::FxHashMap;

use crate::error::AllocError;

const ID_RANGE_LOW: u16 = 1;
const ID_RANGE_HIGH: u16 = 32_000;
const MAX_PROBES: u32 = 64;

/// The per-in-flight record owned by the tracker.
#[derive(Debug, Clone)]
pub struct QueryTicket {
    pub client_id: u16,
    pub client_addr: SocketAddr,
}

enum Slot {
    Reserved,
    /// `Some(session)` once a dispatcher session has actually written this
    /// ticket's message upstream; `None` while it is only queued. Lets
    /// [`Tracker::reap_session`] tell "this id belongs to the session that's
    /// closing" apart from "this id was reused for a newer query since".
    Bound(QueryTicket, Option<u64>),
}

struct Inner {
    slots: FxHashMap<u16, Slot>,
}

/// Shared map from upstream transaction ID to the originating client's
/// identity, plus the ID allocator that draws from the same key space.
pub struct Tracker {
    inner: Mutex<Inner>,
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: FxHashMap::default(),
            }),
        }
    }

    /// Draw a free upstream ID in `[1, 32000]` and reserve it atomically.
    ///
    /// Fails with [`AllocError`] if no free slot is found within
    /// [`MAX_PROBES`] attempts; the caller treats this as transient
    /// backpressure and drops the query.
    pub fn allocate(&self) -> Result<u16, AllocError> {
        let mut inner = self.inner.lock().unwrap();
        let mut rng = rand::rng();
        for _ in 0..MAX_PROBES {
            let candidate = rng.random_range(ID_RANGE_LOW..=ID_RANGE_HIGH);
            if let std::collections::hash_map::Entry::Vacant(entry) = inner.slots.entry(candidate)
            {
                entry.insert(Slot::Reserved);
                return Ok(candidate);
            }
        }
        Err(AllocError)
    }

    /// Complete a reserved ticket after the outbound message has been
    /// reframed. Panics if `id` was never reserved — a programmer error,
    /// not a runtime condition, since only [`Self::allocate`]'s caller
    /// ever produces an `id` to bind.
    pub fn bind(&self, id: u16, client_id: u16, client_addr: SocketAddr) {
        let mut inner = self.inner.lock().unwrap();
        inner.slots.insert(
            id,
            Slot::Bound(
                QueryTicket {
                    client_id,
                    client_addr,
                },
                None,
            ),
        );
    }

    /// Atomic lookup-and-remove. The caller is the only entity authorised
    /// to deliver a reply for `id` once this returns `Some`.
    pub fn take(&self, id: u16) -> Option<QueryTicket> {
        let mut inner = self.inner.lock().unwrap();
        match inner.slots.remove(&id) {
            Some(Slot::Bound(ticket, _)) => Some(ticket),
            Some(Slot::Reserved) => None,
            None => None,
        }
    }

    /// Record that `id`'s message was just written on `session`. A no-op if
    /// `id` isn't currently bound (e.g. its response already arrived).
    pub fn tag_sent(&self, id: u16, session: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(Slot::Bound(_, session_slot)) = inner.slots.get_mut(&id) {
            *session_slot = Some(session);
        }
    }

    /// Reap only the ids in `ids` that are still bound to `session` — i.e.
    /// that haven't since been delivered, reallocated and rebound to a
    /// later query. A plain `reap_if(|id| ids.contains(&id))` would also
    /// evict such a reused id, dropping a live, unrelated in-flight query.
    pub fn reap_session(&self, session: u64, ids: impl IntoIterator<Item = u16>) {
        let mut inner = self.inner.lock().unwrap();
        for id in ids {
            let belongs_to_session = matches!(
                inner.slots.get(&id),
                Some(Slot::Bound(_, Some(s))) if *s == session
            );
            if belongs_to_session {
                inner.slots.remove(&id);
            }
        }
    }

    /// Bulk removal of every ticket for which `predicate` returns `true`.
    /// Used on shutdown and on upstream socket close to reap orphans.
    pub fn reap_if<F>(&self, mut predicate: F)
    where
        F: FnMut(u16) -> bool,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.slots.retain(|id, _| !predicate(*id));
    }

    /// Number of live tickets (reserved or bound). Used by shutdown-
    /// completeness checks and tests.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}
