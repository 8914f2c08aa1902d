//! Connection pool: role bitsets, reader tasks, and the fan-in channel.
//!
//! A single connection often plays two logical roles at once (in a
//! two-node ring the same stream is both predecessor and successor), and
//! those roles change mid-connection during a splice.  Binding a read
//! loop to a *role* would make the connection unswappable while the loop
//! is blocked on a read, so the pool binds each read loop to a
//! *connection* and carries the role as a dynamic attribute: every frame
//! is tagged with the bitset the connection holds at the moment it is
//! read.

use {
    crate::{
        config::RingNetConfig,
        connection::Peer,
    },
    log::debug,
    ringlet_protocol::{Frame, FrameError},
    std::{
        collections::{hash_map::Entry, HashMap},
        fmt,
        net::SocketAddr,
        sync::{Arc, Mutex},
    },
    tokio::sync::mpsc,
};

// ── Roles ───────────────────────────────────────────────────────────────────

/// The set of logical roles a connection currently plays.
///
/// The empty set doubles as the transient NEW origin: a connection whose
/// first frame has not yet earned it a role, or one whose roles have all
/// been cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles(u8);

impl Roles {
    /// No role: a connection still in admission.
    pub const NEW: Roles = Roles(0);
    /// The link our frames arrive on.
    pub const PRED: Roles = Roles(1);
    /// The link we forward frames to.
    pub const SUCC: Roles = Roles(1 << 1);

    /// Both bits combined.
    pub fn union(self, other: Roles) -> Roles {
        Roles(self.0 | other.0)
    }

    /// This bitset with `other`'s bits cleared.
    pub fn without(self, other: Roles) -> Roles {
        Roles(self.0 & !other.0)
    }

    /// Whether the PRED bit is set.
    pub fn is_pred(self) -> bool {
        self.0 & Roles::PRED.0 != 0
    }

    /// Whether the SUCC bit is set.
    pub fn is_succ(self) -> bool {
        self.0 & Roles::SUCC.0 != 0
    }

    /// Whether no bit is set.
    pub fn is_new(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Roles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match (self.is_pred(), self.is_succ()) {
            (true, true) => "pred/succ",
            (true, false) => "pred",
            (false, true) => "succ",
            (false, false) => "new",
        };
        f.write_str(text)
    }
}

// ── Fan-in payloads ─────────────────────────────────────────────────────────

/// A decoded frame together with the role of the connection it arrived on.
#[derive(Debug)]
pub struct PoolMessage {
    /// Role bitset of the producing connection at read time.
    pub origin: Roles,
    /// The decoded frame.
    pub frame: Frame,
}

/// A read failure on a connection that still held a role.
#[derive(Debug)]
pub struct PoolError {
    /// Role bitset of the failing connection at read time.
    pub origin: Roles,
    /// The underlying failure.
    pub error: FrameError,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "read error from {}: {}", self.origin, self.error)
    }
}

// ── Pool ────────────────────────────────────────────────────────────────────

/// Receiving ends of the pool's fan-in channels, consumed by the
/// dispatcher task.
pub struct PoolEvents {
    /// Every frame read off every pooled connection.
    pub messages: mpsc::Receiver<PoolMessage>,
    /// Read failures on connections that still held a role.
    pub errors: mpsc::Receiver<PoolError>,
}

/// Owns the dynamic set of pooled connections and their role bitsets.
#[derive(Debug)]
pub struct PeerPool {
    /// Role bitset per peer identity.
    roles: Mutex<HashMap<SocketAddr, Roles>>,
    messages_tx: mpsc::Sender<PoolMessage>,
    errors_tx: mpsc::Sender<PoolError>,
}

impl PeerPool {
    /// Create a pool and the event receivers its readers will feed.
    pub fn new(config: &RingNetConfig) -> (Arc<Self>, PoolEvents) {
        let (messages_tx, messages) = mpsc::channel(config.channel_buffer_size);
        let (errors_tx, errors) = mpsc::channel(config.channel_buffer_size);
        let pool = Arc::new(Self {
            roles: Mutex::new(HashMap::new()),
            messages_tx,
            errors_tx,
        });
        (pool, PoolEvents { messages, errors })
    }

    /// OR `role` into the peer's bitset.  The first submission of an
    /// address spawns the dedicated reader task for its connection.
    pub fn submit(self: &Arc<Self>, peer: &Peer, role: Roles) {
        let newly_inserted = {
            let mut roles = self.roles.lock().expect("pool lock poisoned");
            match roles.entry(peer.addr) {
                Entry::Occupied(mut entry) => {
                    let merged = entry.get().union(role);
                    entry.insert(merged);
                    false
                }
                Entry::Vacant(entry) => {
                    entry.insert(role);
                    true
                }
            }
        };
        if newly_inserted {
            debug!("pool: tracking {} as {}", peer.addr, role);
            tokio::spawn(read_loop(Arc::clone(self), peer.clone()));
        }
    }

    /// Clear `role` from the peer's bitset.  A connection left without
    /// any role is unregistered and shut down.
    pub async fn remove(&self, peer: &Peer, role: Roles) {
        let should_close = {
            let mut roles = self.roles.lock().expect("pool lock poisoned");
            match roles.get(&peer.addr).copied() {
                None => false,
                Some(current) => {
                    let rest = current.without(role);
                    if rest.is_new() {
                        roles.remove(&peer.addr);
                        true
                    } else {
                        roles.insert(peer.addr, rest);
                        false
                    }
                }
            }
        };
        if should_close {
            debug!("pool: dropping connection to {}", peer.addr);
            peer.conn.shutdown().await;
        }
    }

    /// The current role bitset for an address (`NEW` when untracked).
    pub fn role_of(&self, addr: SocketAddr) -> Roles {
        self.roles
            .lock()
            .expect("pool lock poisoned")
            .get(&addr)
            .copied()
            .unwrap_or(Roles::NEW)
    }
}

/// Read frames off one connection for as long as it holds a role.
///
/// The bitset is re-read for every frame, so a swap retags subsequent
/// traffic without interrupting a blocked read.  On a read failure the
/// error is published once and the reader stops; a torn connection is
/// not recovered.  If the roles were already cleared the close was
/// expected and the task exits silently.
async fn read_loop(pool: Arc<PeerPool>, peer: Peer) {
    loop {
        match peer.conn.read_frame().await {
            Ok(frame) => {
                let origin = pool.role_of(peer.addr);
                if origin.is_new() {
                    break;
                }
                if pool
                    .messages_tx
                    .send(PoolMessage { origin, frame })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(error) => {
                let origin = pool.role_of(peer.addr);
                if origin.is_new() {
                    break;
                }
                let _ = pool.errors_tx.send(PoolError { origin, error }).await;
                break;
            }
        }
    }
    debug!("pool: reader for {} exiting", peer.addr);
}

// ── Tests ───────────────────────────────────────────────────────────────────
