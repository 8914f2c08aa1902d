//! Error types for frame encoding and decoding.

use thiserror::Error;

/// Errors produced while encoding or decoding a wire frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Transport-level I/O failure while reading a frame.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The leading tag byte does not name a known frame.
    #[error("unknown frame tag: {0}")]
    UnknownTag(u8),

    /// The stream ended in the middle of a frame payload.
    #[error("truncated frame")]
    Truncated,

    /// An address field did not parse as `host:port`.
    #[error("invalid address in frame: {0:?}")]
    InvalidAddress(String),

    /// A text field was not valid UTF-8.
    #[error("invalid utf-8 in frame")]
    InvalidUtf8,

    /// A field exceeds what its length prefix can express.
    #[error("{field} too long: {len} bytes (max {max})")]
    FieldTooLong {
        /// Which field overflowed.
        field: &'static str,
        /// Actual byte length.
        len: usize,
        /// Largest encodable length.
        max: usize,
    },
}

impl FrameError {
    /// Whether the peer sent bytes that cannot be a frame, as opposed to a
    /// transport failure on an otherwise healthy stream.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, FrameError::Io(_))
    }
}

/// Convenience result type for codec operations.
pub type Result<T> = std::result::Result<T, FrameError>;
