//! Framed TCP connections and the peers they belong to.

use {
    ringlet_protocol::{Frame, FrameError},
    std::{net::SocketAddr, sync::Arc},
    tokio::{
        io::AsyncWriteExt,
        net::{
            tcp::{OwnedReadHalf, OwnedWriteHalf},
            TcpStream,
        },
        sync::Mutex,
    },
};

/// A framed, bidirectional connection to another ring member.
///
/// The stream is split so a reader task can block on the read half while
/// handlers write frames through the write half.  Writes are serialized
/// behind a mutex and always flush the whole frame before returning.
#[derive(Debug)]
pub struct Connection {
    remote: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl Connection {
    /// Wrap an established stream.
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        let remote = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            remote,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        })
    }

    /// The remote endpoint of the underlying stream.
    ///
    /// This is the ephemeral peer endpoint, not the peer's ring identity;
    /// identities are learned from handshake frames.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Read one frame off the connection.
    pub async fn read_frame(&self) -> std::result::Result<Frame, FrameError> {
        let mut reader = self.reader.lock().await;
        Frame::read_from(&mut *reader).await
    }

    /// Encode and write one frame, flushing it completely.
    pub async fn write_frame(&self, frame: &Frame) -> std::result::Result<(), FrameError> {
        let bytes = frame.encode()?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shut down the write half, signalling the peer we are done.
    ///
    /// The read half stays open until every holder of this connection
    /// drops it; the reader task exits on the resulting EOF.
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// A ring member: its listening (identity) address plus the connection we
/// currently hold to it.
#[derive(Debug, Clone)]
pub struct Peer {
    /// The address this peer is known by in the ring.
    pub addr: SocketAddr,
    /// The connection we currently have with it.
    pub conn: Arc<Connection>,
}

impl Peer {
    /// Pair an identity address with a connection.
    pub fn new(addr: SocketAddr, conn: Arc<Connection>) -> Self {
        Self { addr, conn }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
