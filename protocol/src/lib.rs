//! Wire protocol for the ringlet group-chat ring.
//!
//! Every byte sequence exchanged between ring members is exactly one
//! [`Frame`], a tag byte followed by an optional payload.  The codec is
//! byte-exact: addresses travel as their textual `host:port` form behind a
//! one-byte length prefix, chat content behind a 32-bit big-endian length.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`frame`] | The `Frame` enum, encoding, and streaming decode |
//! | [`error`] | Codec error enum |

pub mod error;
pub mod frame;

pub use {
    error::FrameError,
    frame::{Frame, MAX_FIELD_LEN},
};
