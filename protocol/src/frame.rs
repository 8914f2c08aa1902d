//! Frame types and byte-exact codec.
//!
//! Wire layout, per frame:
//!
//! ```text
//! [1: tag] [payload...]
//! ```
//!
//! Address fields are the textual `host:port` form (`[host]:port` for
//! IPv6) behind a one-byte length prefix, so at most 255 bytes.  Chat
//! content carries a 32-bit big-endian length; nicknames a one-byte
//! length.  The codec guarantees `decode(encode(f)) == f` for every
//! frame `f`.
//!
//! Decoding is a single streaming path over [`AsyncRead`], so the same
//! code serves live sockets and in-memory buffers in tests.

use {
    crate::error::{FrameError, Result},
    std::net::SocketAddr,
    tokio::io::{AsyncRead, AsyncReadExt},
};

// ── Wire tags ───────────────────────────────────────────────────────────────

const TAG_PING: u8 = 1;
const TAG_JOIN_SWARM: u8 = 2;
const TAG_REFERRAL: u8 = 3;
const TAG_NEW_PREDECESSOR: u8 = 4;
const TAG_CONFIRM_PREDECESSOR: u8 = 5;
const TAG_CONFIRM_REFERRAL: u8 = 6;
const TAG_NEW_MESSAGE: u8 = 7;
const TAG_NICKNAME: u8 = 8;

/// Maximum byte length of a one-byte-length-prefixed field (address or
/// nickname).  Longer values are rejected at encode time, never truncated.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// Top-level wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Keep-alive placeholder; discarded on receipt.
    Ping,
    /// "I want to join; my listening address is `addr`."
    JoinSwarm {
        /// The joiner's listening address.
        addr: SocketAddr,
    },
    /// "Contact `addr`; it will become your successor."
    Referral {
        /// The node the joiner should confirm with.
        addr: SocketAddr,
    },
    /// "Expect `addr` to take my old role as your predecessor."
    NewPredecessor {
        /// The announced next predecessor.
        addr: SocketAddr,
    },
    /// "I am `addr`; I'm ready to be your predecessor."
    ConfirmPredecessor {
        /// The joiner's listening address.
        addr: SocketAddr,
    },
    /// "I've switched my predecessor; you may switch your successor."
    ConfirmReferral,
    /// A chat message together with the address it originated from.
    NewMessage {
        /// Listening address of the original sender.
        sender: SocketAddr,
        /// Message text.
        content: String,
    },
    /// Rename the origin node.
    Nickname {
        /// Listening address of the node being renamed.
        sender: SocketAddr,
        /// The new display name.
        name: String,
    },
}

impl Frame {
    /// Human-readable tag for logging and error reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Ping => "ping",
            Frame::JoinSwarm { .. } => "join_swarm",
            Frame::Referral { .. } => "referral",
            Frame::NewPredecessor { .. } => "new_predecessor",
            Frame::ConfirmPredecessor { .. } => "confirm_predecessor",
            Frame::ConfirmReferral => "confirm_referral",
            Frame::NewMessage { .. } => "new_message",
            Frame::Nickname { .. } => "nickname",
        }
    }

    /// Serialize this frame into its wire bytes.
    ///
    /// Fails with [`FrameError::FieldTooLong`] if an address or nickname
    /// exceeds 255 bytes or the content length overflows `u32`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Frame::Ping => buf.push(TAG_PING),
            Frame::JoinSwarm { addr } => {
                buf.push(TAG_JOIN_SWARM);
                push_addr(&mut buf, addr)?;
            }
            Frame::Referral { addr } => {
                buf.push(TAG_REFERRAL);
                push_addr(&mut buf, addr)?;
            }
            Frame::NewPredecessor { addr } => {
                buf.push(TAG_NEW_PREDECESSOR);
                push_addr(&mut buf, addr)?;
            }
            Frame::ConfirmPredecessor { addr } => {
                buf.push(TAG_CONFIRM_PREDECESSOR);
                push_addr(&mut buf, addr)?;
            }
            Frame::ConfirmReferral => buf.push(TAG_CONFIRM_REFERRAL),
            Frame::NewMessage { sender, content } => {
                buf.push(TAG_NEW_MESSAGE);
                push_addr(&mut buf, sender)?;
                let len = u32::try_from(content.len()).map_err(|_| FrameError::FieldTooLong {
                    field: "content",
                    len: content.len(),
                    max: u32::MAX as usize,
                })?;
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(content.as_bytes());
            }
            Frame::Nickname { sender, name } => {
                buf.push(TAG_NICKNAME);
                push_addr(&mut buf, sender)?;
                push_text(&mut buf, "nickname", name)?;
            }
        }
        Ok(buf)
    }

    /// Read one frame from `reader`.
    ///
    /// EOF before the tag byte surfaces as [`FrameError::Io`] (the peer
    /// closed between frames); EOF inside a payload is
    /// [`FrameError::Truncated`].
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let tag = reader.read_u8().await?;
        match tag {
            TAG_PING => Ok(Frame::Ping),
            TAG_JOIN_SWARM => Ok(Frame::JoinSwarm {
                addr: read_addr(reader).await?,
            }),
            TAG_REFERRAL => Ok(Frame::Referral {
                addr: read_addr(reader).await?,
            }),
            TAG_NEW_PREDECESSOR => Ok(Frame::NewPredecessor {
                addr: read_addr(reader).await?,
            }),
            TAG_CONFIRM_PREDECESSOR => Ok(Frame::ConfirmPredecessor {
                addr: read_addr(reader).await?,
            }),
            TAG_CONFIRM_REFERRAL => Ok(Frame::ConfirmReferral),
            TAG_NEW_MESSAGE => {
                let sender = read_addr(reader).await?;
                let len = reader.read_u32().await.map_err(payload_io)? as usize;
                let content = read_text(reader, len).await?;
                Ok(Frame::NewMessage { sender, content })
            }
            TAG_NICKNAME => {
                let sender = read_addr(reader).await?;
                let len = reader.read_u8().await.map_err(payload_io)? as usize;
                let name = read_text(reader, len).await?;
                Ok(Frame::Nickname { sender, name })
            }
            other => Err(FrameError::UnknownTag(other)),
        }
    }
}

// ── Field helpers ───────────────────────────────────────────────────────────

fn push_addr(buf: &mut Vec<u8>, addr: &SocketAddr) -> Result<()> {
    push_text(buf, "address", &addr.to_string())
}

fn push_text(buf: &mut Vec<u8>, field: &'static str, text: &str) -> Result<()> {
    let len = text.len();
    if len > MAX_FIELD_LEN {
        return Err(FrameError::FieldTooLong {
            field,
            len,
            max: MAX_FIELD_LEN,
        });
    }
    buf.push(len as u8);
    buf.extend_from_slice(text.as_bytes());
    Ok(())
}

/// Mid-payload EOF means the peer sent a short frame, not that the stream
/// idled out between frames.
fn payload_io(err: std::io::Error) -> FrameError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::Truncated
    } else {
        FrameError::Io(err)
    }
}

async fn read_addr<R>(reader: &mut R) -> Result<SocketAddr>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u8().await.map_err(payload_io)? as usize;
    let text = read_text(reader, len).await?;
    text.parse().map_err(|_| FrameError::InvalidAddress(text))
}

async fn read_text<R>(reader: &mut R, len: usize) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).await.map_err(payload_io)?;
    String::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)
}

// ── Tests ───────────────────────────────────────────────────────────────────
