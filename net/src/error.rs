//! Error types for the ringlet networking layer.

use {crate::pool::Roles, ringlet_protocol::FrameError, std::net::SocketAddr, thiserror::Error};

/// Errors that can occur in the ring networking layer.
#[derive(Debug, Error)]
pub enum RingNetError {
    /// Socket dial/accept/read/write failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent bytes that do not decode to a frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A frame arrived from a role that is not permitted to send it.
    #[error("unexpected {kind} frame from {origin}")]
    UnexpectedFrame {
        /// Which frame kind arrived.
        kind: &'static str,
        /// The role bitset of the connection it arrived on.
        origin: Roles,
    },

    /// The predecessor announced by our old predecessor and the one that
    /// confirmed to us directly disagree.
    #[error("mismatched predecessors; announced: {announced}; confirmed: {confirmed}")]
    MismatchedPredecessor {
        /// Address announced via `NewPredecessor`.
        announced: SocketAddr,
        /// Address confirmed via `ConfirmPredecessor`.
        confirmed: SocketAddr,
    },

    /// A frame that operates on the admitting connection arrived while
    /// the admission slot was empty.
    #[error("no admission in flight for {kind} frame")]
    NoPendingAdmission {
        /// Which frame kind arrived.
        kind: &'static str,
    },

    /// Outbound content exceeds the configured maximum.
    #[error("content too large: {size} bytes (max {max} bytes)")]
    ContentTooLarge {
        /// Actual content size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A nickname exceeds what the wire format can carry.
    #[error("nickname too long: {0} bytes (max 255)")]
    NameTooLong(usize),
}

/// Convenience result type for ring networking operations.
pub type Result<T> = std::result::Result<T, RingNetError>;
