//! Shared utilities for multi-node tests.

use {
    ringlet_net::{create_swarm, join_swarm, ContentReceiver, RingNetConfig, SwarmHandle},
    ringlet_protocol::Frame,
    std::{
        collections::{HashMap, HashSet},
        net::SocketAddr,
        sync::{
            atomic::{AtomicU16, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::{
        io::AsyncWriteExt,
        net::TcpStream,
        sync::mpsc,
        task::JoinHandle,
        time::{sleep, timeout},
    },
};

/// How long to wait for any single expected event.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Window in which an unexpected delivery would have shown up.
pub const QUIET_WINDOW: Duration = Duration::from_millis(300);

static NEXT_PORT: AtomicU16 = AtomicU16::new(43_100);

/// Initialize env_logger once for test output.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A fresh localhost address for a test node.
pub fn next_addr() -> SocketAddr {
    let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
    format!("127.0.0.1:{port}").parse().expect("test address")
}

/// Receiver that records every delivery on a channel.
struct RecordingReceiver {
    deliveries: mpsc::UnboundedSender<(String, String)>,
}

impl ContentReceiver for RecordingReceiver {
    fn receive_content(&self, sender: &str, content: &str) {
        let _ = self
            .deliveries
            .send((sender.to_string(), content.to_string()));
    }
}

/// A test node: its handle plus the stream of deliveries it observed.
pub struct TestNode {
    /// The node's ring identity.
    pub addr: SocketAddr,
    /// Its swarm handle.
    pub handle: SwarmHandle,
    deliveries: mpsc::UnboundedReceiver<(String, String)>,
}

impl TestNode {
    fn adopt(addr: SocketAddr, handle: SwarmHandle) -> Self {
        let (tx, deliveries) = mpsc::unbounded_channel();
        handle.set_receiver(Arc::new(RecordingReceiver { deliveries: tx }));
        TestNode {
            addr,
            handle,
            deliveries,
        }
    }

    /// Wait for the next delivery.
    pub async fn expect_delivery(&mut self) -> (String, String) {
        timeout(RECV_TIMEOUT, self.deliveries.recv())
            .await
            .expect("timed out waiting for a delivery")
            .expect("delivery channel closed")
    }

    /// Assert nothing is delivered within the quiet window.
    pub async fn expect_quiet(&mut self) {
        if let Ok(Some((sender, content))) = timeout(QUIET_WINDOW, self.deliveries.recv()).await {
            panic!("unexpected delivery from {sender}: {content:?}");
        }
    }
}

/// Start a swarm creator in the background; the task completes once the
/// first peer has joined.
pub fn spawn_create(addr: SocketAddr) -> JoinHandle<TestNode> {
    tokio::spawn(async move {
        let handle = create_swarm(RingNetConfig::dev_default(), addr)
            .await
            .expect("create_swarm failed");
        TestNode::adopt(addr, handle)
    })
}

/// Join an existing swarm through `via`, waiting for its listener first.
pub async fn join(addr: SocketAddr, via: SocketAddr) -> TestNode {
    wait_for_listener(via).await;
    let handle = join_swarm(RingNetConfig::dev_default(), addr, via)
        .await
        .expect("join_swarm failed");
    TestNode::adopt(addr, handle)
}

/// Wait until something is listening at `addr`.  The probe connection is
/// dropped without a handshake; nodes abort such candidates and move on.
pub async fn wait_for_listener(addr: SocketAddr) {
    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("nothing listening at {addr}");
}

/// Poll until the successor pointers of `nodes` form a single cycle
/// covering every node.  Splices complete asynchronously after
/// `join_swarm` returns, so tests converge here before broadcasting.
pub async fn wait_for_ring(nodes: &[&TestNode]) {
    let addrs: HashSet<SocketAddr> = nodes.iter().map(|node| node.addr).collect();
    for _ in 0..100 {
        let mut succ_of = HashMap::new();
        for node in nodes {
            succ_of.insert(node.addr, node.handle.successor_addr().await);
        }
        let mut seen = HashSet::new();
        let mut current = nodes[0].addr;
        for _ in 0..nodes.len() {
            current = match succ_of.get(&current) {
                Some(next) => *next,
                None => break,
            };
            if !seen.insert(current) {
                break;
            }
        }
        if current == nodes[0].addr && seen == addrs {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("ring never converged");
}

// ── Raw-socket helpers for protocol-abuse scenarios ─────────────────────────

/// Write one frame on a plain TCP stream.
pub async fn write_raw_frame(stream: &mut TcpStream, frame: &Frame) {
    let bytes = frame.encode().expect("encodable frame");
    stream.write_all(&bytes).await.expect("raw write failed");
    stream.flush().await.expect("raw flush failed");
}

/// Read one frame off a plain TCP stream.
pub async fn read_raw_frame(stream: &mut TcpStream) -> Frame {
    timeout(RECV_TIMEOUT, Frame::read_from(stream))
        .await
        .expect("timed out reading a frame")
        .expect("raw read failed")
}

/// Assert the remote side closes the stream instead of sending a frame.
pub async fn expect_closed(stream: &mut TcpStream) {
    let outcome = timeout(RECV_TIMEOUT, Frame::read_from(stream)).await;
    match outcome {
        Ok(Err(_)) => {}
        Ok(Ok(frame)) => panic!("expected close, got a {} frame", frame.kind()),
        Err(_) => panic!("stream was neither closed nor written to"),
    }
}
