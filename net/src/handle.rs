//! The swarm handle: the façade applications talk to the ring through.

use {
    crate::{
        client::RingClient,
        error::{Result, RingNetError},
    },
    ringlet_protocol::{Frame, MAX_FIELD_LEN},
    std::{net::SocketAddr, sync::Arc},
};

/// Consumer of chat content delivered by the ring.
///
/// Called exactly once per message delivered on this node; messages the
/// node itself sent are dropped by origin-stop and never delivered.
/// Implementations must not block the dispatcher indefinitely.
pub trait ContentReceiver: Send + Sync {
    /// Receive one message.  `sender` is the origin's nickname if one is
    /// known, otherwise its textual address.
    fn receive_content(&self, sender: &str, content: &str);
}

/// Receiver that discards everything.  Installed by the constructors
/// until the application registers its own.
#[derive(Debug, Default)]
pub struct NilReceiver;

impl ContentReceiver for NilReceiver {
    fn receive_content(&self, _sender: &str, _content: &str) {}
}

/// A live membership in a swarm.
///
/// Created by [`create_swarm`] or [`join_swarm`]; the ring keeps running
/// for as long as the process does.
///
/// [`create_swarm`]: crate::bootstrap::create_swarm
/// [`join_swarm`]: crate::bootstrap::join_swarm
#[derive(Debug)]
pub struct SwarmHandle {
    client: Arc<RingClient>,
}

impl SwarmHandle {
    pub(crate) fn new(client: Arc<RingClient>) -> Self {
        Self { client }
    }

    /// The address this node is known by in the ring.
    pub fn local_addr(&self) -> SocketAddr {
        self.client.me()
    }

    /// The identity of the current predecessor.
    pub async fn predecessor_addr(&self) -> SocketAddr {
        self.client.predecessor_addr().await
    }

    /// The identity of the current successor.
    pub async fn successor_addr(&self) -> SocketAddr {
        self.client.successor_addr().await
    }

    /// Send a piece of text to the rest of the swarm.
    ///
    /// The message travels one lap around the ring; every other member
    /// delivers it exactly once.
    pub async fn send_content(&self, content: &str) -> Result<()> {
        let max = self.client.config().max_content_len;
        if content.len() > max {
            return Err(RingNetError::ContentTooLarge {
                size: content.len(),
                max,
            });
        }
        self.client
            .send_to_successor(&Frame::NewMessage {
                sender: self.client.me(),
                content: content.to_string(),
            })
            .await
    }

    /// Announce a new display name for this node.
    ///
    /// Names longer than the wire format's 255-byte field are rejected
    /// here rather than truncated.
    pub async fn change_nickname(&self, name: &str) -> Result<()> {
        if name.len() > MAX_FIELD_LEN {
            return Err(RingNetError::NameTooLong(name.len()));
        }
        self.client
            .send_to_successor(&Frame::Nickname {
                sender: self.client.me(),
                name: name.to_string(),
            })
            .await
    }

    /// Swap in a new content receiver.
    pub fn set_receiver(&self, receiver: Arc<dyn ContentReceiver>) {
        self.client.set_receiver(receiver);
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
