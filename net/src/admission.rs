//! The admission slot: a single-cell rendezvous for the peer currently
//! being spliced into the ring.
//!
//! At most one admission may be in flight at a node at any time.  The
//! listener fills the slot with each freshly accepted connection before
//! reading its first frame, so a second joiner blocks in [`fill`] until
//! the in-flight admission either commits (the swap empties the slot) or
//! aborts (the error path empties it).
//!
//! [`fill`]: AdmissionSlot::fill

use {
    crate::connection::Connection,
    std::sync::{Arc, Mutex},
    tokio::sync::Semaphore,
};

/// Single-cell synchronized handoff holding the admitting connection.
///
/// Two semaphores give the rendezvous: `vacancy` holds a permit while the
/// slot is empty, `occupancy` while it is full.  [`fill`] consumes the
/// vacancy and grants occupancy; [`empty`] does the reverse.  Each permit
/// exists on exactly one side at a time, so at most one caller is ever
/// inside the slot.
///
/// [`fill`]: AdmissionSlot::fill
/// [`empty`]: AdmissionSlot::empty
#[derive(Debug)]
pub struct AdmissionSlot {
    conn: Mutex<Option<Arc<Connection>>>,
    vacancy: Semaphore,
    occupancy: Semaphore,
}

impl AdmissionSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            conn: Mutex::new(None),
            vacancy: Semaphore::new(1),
            occupancy: Semaphore::new(0),
        }
    }

    /// Store `conn`, blocking until the slot is empty.
    pub async fn fill(&self, conn: Arc<Connection>) {
        let permit = self
            .vacancy
            .acquire()
            .await
            .expect("admission slot semaphore closed");
        permit.forget();
        *self.conn.lock().expect("admission slot lock poisoned") = Some(conn);
        self.occupancy.add_permits(1);
    }

    /// Clear the slot, blocking until it is full.  Returns the taken
    /// connection.
    pub async fn empty(&self) -> Arc<Connection> {
        let permit = self
            .occupancy
            .acquire()
            .await
            .expect("admission slot semaphore closed");
        permit.forget();
        let conn = self
            .conn
            .lock()
            .expect("admission slot lock poisoned")
            .take()
            .expect("occupied admission slot had no connection");
        self.vacancy.add_permits(1);
        conn
    }

    /// Clear the slot only if it is currently full.  Used on admission
    /// error paths, which must not block when the slot was already
    /// released.
    pub fn try_empty(&self) -> Option<Arc<Connection>> {
        let permit = self.occupancy.try_acquire().ok()?;
        permit.forget();
        let conn = self
            .conn
            .lock()
            .expect("admission slot lock poisoned")
            .take()
            .expect("occupied admission slot had no connection");
        self.vacancy.add_permits(1);
        Some(conn)
    }

    /// Non-blocking emptiness query.
    pub fn is_empty(&self) -> bool {
        self.conn
            .lock()
            .expect("admission slot lock poisoned")
            .is_none()
    }

    /// The held connection, if any, without releasing the slot.
    pub fn peek(&self) -> Option<Arc<Connection>> {
        self.conn
            .lock()
            .expect("admission slot lock poisoned")
            .clone()
    }
}

impl Default for AdmissionSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
