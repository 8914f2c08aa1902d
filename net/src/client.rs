//! The per-node ring state machine.
//!
//! Every observable transition happens in [`RingClient::dispatch`], keyed
//! on the pair of frame kind and origin role and guarded by a single
//! lock over the ring linkage.  The dispatcher task feeds it frames from
//! the pool; the listener task feeds it the first frame of every freshly
//! accepted connection under the NEW origin.
//!
//! ## Splicing a node N between A and its successor B
//!
//! 1. N dials A and sends `JoinSwarm(N)`.
//! 2. A parks N in its admission slot, records N as its next successor,
//!    replies `Referral(B)`, and sends `NewPredecessor(N)` to B.
//! 3. N dials B (or reuses the connection when B == A) and sends
//!    `ConfirmPredecessor(N)`.
//! 4. B waits for both the announcement from its old predecessor and the
//!    confirmation from N (in either order), verifies they agree, sends
//!    `ConfirmReferral` to A, and makes N its predecessor.
//! 5. A makes N its successor and releases the admission slot.

use {
    crate::{
        admission::AdmissionSlot,
        config::RingNetConfig,
        connection::{Connection, Peer},
        error::{Result, RingNetError},
        handle::{ContentReceiver, NilReceiver},
        nick_map::NickMap,
        pool::{PeerPool, PoolEvents, Roles},
    },
    log::{debug, error, info, warn},
    ringlet_protocol::Frame,
    std::{
        net::SocketAddr,
        sync::{Arc, RwLock},
    },
    tokio::{net::TcpListener, sync::Mutex},
};

/// Mutable ring linkage, guarded by a single lock.
#[derive(Debug)]
struct ClientState {
    /// Current predecessor.
    pred: Peer,
    /// Current successor.
    succ: Peer,
    /// Address our predecessor announced as our next predecessor.
    new_pred_announced: Option<SocketAddr>,
    /// Address the admitting peer confirmed to us directly.
    latest_pred_addr: Option<SocketAddr>,
    /// Address under which the admitting peer will become our successor.
    latest_succ_addr: Option<SocketAddr>,
}

/// A node in steady operation.
pub(crate) struct RingClient {
    /// This node's listening address.  Immutable after construction.
    me: SocketAddr,
    config: RingNetConfig,
    receiver: RwLock<Arc<dyn ContentReceiver>>,
    state: Mutex<ClientState>,
    pool: Arc<PeerPool>,
    /// The connection currently being admitted, if any.
    latest: AdmissionSlot,
    nicks: NickMap,
}

impl std::fmt::Debug for RingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingClient")
            .field("me", &self.me)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("pool", &self.pool)
            .field("latest", &self.latest)
            .field("nicks", &self.nicks)
            .finish()
    }
}

impl RingClient {
    /// Build a client around its initial predecessor and successor (the
    /// same peer in a fresh two-node ring).  Returns the pool event
    /// receivers for the dispatcher task.
    pub(crate) fn new(
        config: RingNetConfig,
        me: SocketAddr,
        pred: Peer,
        succ: Peer,
    ) -> (Arc<Self>, PoolEvents) {
        let (pool, events) = PeerPool::new(&config);
        let client = Arc::new(Self {
            me,
            config,
            receiver: RwLock::new(Arc::new(NilReceiver)),
            state: Mutex::new(ClientState {
                pred,
                succ,
                new_pred_announced: None,
                latest_pred_addr: None,
                latest_succ_addr: None,
            }),
            pool,
            latest: AdmissionSlot::new(),
            nicks: NickMap::new(),
        });
        (client, events)
    }

    pub(crate) fn me(&self) -> SocketAddr {
        self.me
    }

    pub(crate) fn config(&self) -> &RingNetConfig {
        &self.config
    }

    pub(crate) fn pool(&self) -> &Arc<PeerPool> {
        &self.pool
    }

    pub(crate) fn set_receiver(&self, receiver: Arc<dyn ContentReceiver>) {
        *self.receiver.write().expect("receiver lock poisoned") = receiver;
    }

    /// Current predecessor identity.
    pub(crate) async fn predecessor_addr(&self) -> SocketAddr {
        self.state.lock().await.pred.addr
    }

    /// Current successor identity.
    pub(crate) async fn successor_addr(&self) -> SocketAddr {
        self.state.lock().await.succ.addr
    }

    /// Write a frame on the current successor link.
    pub(crate) async fn send_to_successor(&self, frame: &Frame) -> Result<()> {
        let succ = self.state.lock().await.succ.clone();
        succ.conn.write_frame(frame).await?;
        Ok(())
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    /// Apply one frame according to the (frame, origin) table.  Frames
    /// arriving from a role that may not send them are protocol errors.
    pub(crate) async fn dispatch(&self, origin: Roles, frame: Frame) -> Result<()> {
        match frame {
            Frame::Ping => Ok(()),
            Frame::JoinSwarm { addr } if origin.is_new() => self.handle_join_swarm(addr).await,
            Frame::NewPredecessor { addr } if origin.is_pred() => {
                self.handle_new_predecessor(addr).await
            }
            Frame::ConfirmPredecessor { addr } if origin.is_new() => {
                self.handle_confirm_predecessor(addr).await
            }
            Frame::ConfirmReferral if origin.is_succ() => {
                self.handle_confirm_referral(origin).await
            }
            Frame::NewMessage { sender, content } if origin.is_pred() => {
                self.handle_new_message(sender, content).await
            }
            Frame::Nickname { sender, name } if origin.is_pred() => {
                self.handle_nickname(sender, name).await
            }
            // Referral is only meaningful while joining, which happens
            // before the state machine starts; everything else fell
            // through an origin guard.
            other => Err(RingNetError::UnexpectedFrame {
                kind: other.kind(),
                origin,
            }),
        }
    }

    /// A new peer wants in: park it as our next successor, refer it to
    /// our current successor, and announce it there.
    async fn handle_join_swarm(&self, addr: SocketAddr) -> Result<()> {
        let mut state = self.state.lock().await;
        let latest = self.latest.peek().ok_or(RingNetError::NoPendingAdmission {
            kind: "join_swarm",
        })?;
        info!("{} asked to join; splicing before {}", addr, state.succ.addr);
        state.latest_succ_addr = Some(addr);
        latest
            .write_frame(&Frame::Referral {
                addr: state.succ.addr,
            })
            .await?;
        state
            .succ
            .conn
            .write_frame(&Frame::NewPredecessor { addr })
            .await?;
        Ok(())
    }

    /// Our predecessor announced its replacement.
    async fn handle_new_predecessor(&self, addr: SocketAddr) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(prev) = state.new_pred_announced {
            warn!("replacing announced predecessor {} with {}", prev, addr);
        }
        state.new_pred_announced = Some(addr);
        self.swap_predecessors_if_ready(&mut state).await
    }

    /// The admitting peer introduced itself directly.  Twin of
    /// [`Self::handle_new_predecessor`]; the swap commits once both have
    /// arrived, in whichever order.
    async fn handle_confirm_predecessor(&self, addr: SocketAddr) -> Result<()> {
        let mut state = self.state.lock().await;
        state.latest_pred_addr = Some(addr);
        self.swap_predecessors_if_ready(&mut state).await
    }

    /// Commit the predecessor swap once every precondition holds: an
    /// admission is in flight, the joiner confirmed to us directly, and
    /// our old predecessor announced it.  The two addresses must agree;
    /// disagreement aborts the admission and leaves the linkage alone.
    async fn swap_predecessors_if_ready(&self, state: &mut ClientState) -> Result<()> {
        if self.latest.is_empty() {
            return Ok(());
        }
        let (confirmed, announced) = match (state.latest_pred_addr, state.new_pred_announced) {
            (Some(confirmed), Some(announced)) => (confirmed, announced),
            _ => return Ok(()),
        };
        if confirmed != announced {
            self.abort_admission(state).await;
            return Err(RingNetError::MismatchedPredecessor {
                announced,
                confirmed,
            });
        }
        state.pred.conn.write_frame(&Frame::ConfirmReferral).await?;
        let old_pred = state.pred.clone();
        let conn = self.latest.empty().await;
        self.pool.remove(&old_pred, Roles::PRED).await;
        state.pred = Peer::new(confirmed, conn);
        self.pool.submit(&state.pred, Roles::PRED);
        state.new_pred_announced = None;
        state.latest_pred_addr = None;
        state.latest_succ_addr = None;
        info!("predecessor is now {}", confirmed);
        Ok(())
    }

    /// Our successor's replacement finished switching its predecessor;
    /// promote the admitted peer to successor and release the slot.
    async fn handle_confirm_referral(&self, origin: Roles) -> Result<()> {
        let mut state = self.state.lock().await;
        let new_succ_addr = match state.latest_succ_addr {
            Some(addr) => addr,
            None => {
                return Err(RingNetError::UnexpectedFrame {
                    kind: "confirm_referral",
                    origin,
                })
            }
        };
        let conn = self.latest.peek().ok_or(RingNetError::NoPendingAdmission {
            kind: "confirm_referral",
        })?;
        let old_succ = state.succ.clone();
        self.pool.remove(&old_succ, Roles::SUCC).await;
        state.succ = Peer::new(new_succ_addr, conn);
        self.pool.submit(&state.succ, Roles::SUCC);
        let _ = self.latest.empty().await;
        state.latest_pred_addr = None;
        state.latest_succ_addr = None;
        info!("successor is now {}", new_succ_addr);
        Ok(())
    }

    /// Deliver a chat message locally and pass it along, unless it has
    /// completed its lap.
    async fn handle_new_message(&self, sender: SocketAddr, content: String) -> Result<()> {
        if sender == self.me {
            return Ok(());
        }
        let name = self.nicks.get(sender);
        self.receiver
            .read()
            .expect("receiver lock poisoned")
            .receive_content(&name, &content);
        let state = self.state.lock().await;
        state
            .succ
            .conn
            .write_frame(&Frame::NewMessage { sender, content })
            .await?;
        Ok(())
    }

    /// Record a rename and pass it along, unless it has completed its lap.
    async fn handle_nickname(&self, sender: SocketAddr, name: String) -> Result<()> {
        if sender == self.me {
            return Ok(());
        }
        debug!("{} is now known as {:?}", sender, name);
        self.nicks.set(sender, name.clone());
        let state = self.state.lock().await;
        state
            .succ
            .conn
            .write_frame(&Frame::Nickname { sender, name })
            .await?;
        Ok(())
    }

    // ── Admission error path ────────────────────────────────────────────

    /// Abort the in-flight admission: drop the admitting connection and
    /// release the slot so the next joiner can proceed.  The announced
    /// next-predecessor is kept, so a genuine joiner can still complete
    /// after a bogus confirmation was rejected.
    async fn abort_admission(&self, state: &mut ClientState) {
        if let Some(conn) = self.latest.try_empty() {
            conn.shutdown().await;
        }
        state.latest_pred_addr = None;
        state.latest_succ_addr = None;
    }

    /// Lock-acquiring wrapper for [`Self::abort_admission`], used by the
    /// listener after a failed first-frame dispatch.
    pub(crate) async fn abort_latest_admission(&self) {
        let mut state = self.state.lock().await;
        self.abort_admission(&mut state).await;
    }

    // ── Long-running tasks ──────────────────────────────────────────────

    /// Accept connections and shepherd each one's first frame through
    /// dispatch under the NEW origin.  Filling the admission slot before
    /// reading serializes concurrent joiners: the next accept's fill
    /// blocks until the in-flight admission commits or aborts.
    pub(crate) async fn listen_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!("accept error: {}", err);
                    continue;
                }
            };
            debug!("accepted connection from {}", remote);
            let conn = match Connection::new(stream) {
                Ok(conn) => Arc::new(conn),
                Err(err) => {
                    warn!("failed to adopt connection from {}: {}", remote, err);
                    continue;
                }
            };
            self.latest.fill(Arc::clone(&conn)).await;
            let outcome = match conn.read_frame().await {
                Ok(frame) => {
                    debug!("first frame from {}: {}", remote, frame.kind());
                    self.dispatch(Roles::NEW, frame).await
                }
                Err(err) => Err(err.into()),
            };
            if let Err(err) = outcome {
                warn!("admission from {} failed: {}", remote, err);
                self.abort_latest_admission().await;
            }
        }
    }

    /// Multiplex pooled frames and read errors.  Protocol errors are
    /// logged and the node keeps running; nothing here tears it down.
    pub(crate) async fn dispatch_loop(self: Arc<Self>, mut events: PoolEvents) {
        loop {
            tokio::select! {
                msg = events.messages.recv() => match msg {
                    Some(msg) => {
                        if let Err(err) = self.dispatch(msg.origin, msg.frame).await {
                            warn!("protocol error: {}", err);
                        }
                    }
                    None => break,
                },
                err = events.errors.recv() => match err {
                    Some(err) => warn!("{}", err),
                    None => break,
                },
            }
        }
        debug!("dispatcher exiting");
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_util::connection_pair,
        std::{sync::mpsc, time::Duration},
        tokio::time::timeout,
    };

    /// Receiver that records deliveries on a std channel.
    struct RecordingReceiver {
        deliveries: mpsc::Sender<(String, String)>,
    }

    impl ContentReceiver for RecordingReceiver {
        fn receive_content(&self, sender: &str, content: &str) {
            let _ = self
                .deliveries
                .send((sender.to_string(), content.to_string()));
        }
    }

    struct Fixture {
        client: Arc<RingClient>,
        /// Remote end of the predecessor link.
        pred_remote: Connection,
        /// Remote end of the successor link.
        succ_remote: Connection,
        deliveries: mpsc::Receiver<(String, String)>,
    }

    const ME: &str = "127.0.0.1:6000";
    const PRED: &str = "127.0.0.1:6001";
    const SUCC: &str = "127.0.0.1:6002";

    fn addr(s: &str) -> SocketAddr {
        s.parse().expect("test address")
    }

    /// A client with live (but un-pooled) predecessor and successor
    /// links, driven by calling `dispatch` directly.
    async fn fixture() -> Fixture {
        let (pred_local, pred_remote) = connection_pair().await;
        let (succ_local, succ_remote) = connection_pair().await;
        let pred = Peer::new(addr(PRED), Arc::new(pred_local));
        let succ = Peer::new(addr(SUCC), Arc::new(succ_local));
        let (client, _events) = RingClient::new(RingNetConfig::dev_default(), addr(ME), pred, succ);
        let (tx, deliveries) = mpsc::channel();
        client.set_receiver(Arc::new(RecordingReceiver { deliveries: tx }));
        Fixture {
            client,
            pred_remote,
            succ_remote,
            deliveries,
        }
    }

    async fn expect_frame(conn: &Connection) -> Frame {
        timeout(Duration::from_secs(1), conn.read_frame())
            .await
            .expect("timed out waiting for a frame")
            .expect("read failed")
    }

    async fn expect_no_frame(conn: &Connection) {
        assert!(
            timeout(Duration::from_millis(200), conn.read_frame())
                .await
                .is_err(),
            "unexpected frame written"
        );
    }

    /// Park a fresh connection in the admission slot, as the listener
    /// does before dispatching a first frame.  Returns the remote end.
    async fn fill_slot(client: &RingClient) -> Connection {
        let (local, remote) = connection_pair().await;
        client.latest.fill(Arc::new(local)).await;
        remote
    }

    fn unexpected(err: RingNetError) -> bool {
        matches!(err, RingNetError::UnexpectedFrame { .. })
    }

    #[tokio::test]
    async fn test_origin_gating() {
        let fx = fixture().await;
        let joiner = addr("127.0.0.1:6100");
        let both = Roles::PRED.union(Roles::SUCC);

        // Ping is fine from anywhere.
        for origin in [Roles::NEW, Roles::PRED, Roles::SUCC, both] {
            fx.client.dispatch(origin, Frame::Ping).await.unwrap();
        }

        // Referral is never valid in steady state.
        for origin in [Roles::NEW, Roles::PRED, Roles::SUCC, both] {
            let err = fx
                .client
                .dispatch(origin, Frame::Referral { addr: joiner })
                .await
                .unwrap_err();
            assert!(unexpected(err));
        }

        // Everything else from the wrong origin is rejected.
        let cases = [
            (Roles::PRED, Frame::JoinSwarm { addr: joiner }),
            (Roles::SUCC, Frame::JoinSwarm { addr: joiner }),
            (Roles::NEW, Frame::NewPredecessor { addr: joiner }),
            (Roles::SUCC, Frame::NewPredecessor { addr: joiner }),
            (Roles::PRED, Frame::ConfirmPredecessor { addr: joiner }),
            (Roles::SUCC, Frame::ConfirmPredecessor { addr: joiner }),
            (Roles::NEW, Frame::ConfirmReferral),
            (Roles::PRED, Frame::ConfirmReferral),
            (
                Roles::NEW,
                Frame::NewMessage {
                    sender: joiner,
                    content: "hi".to_string(),
                },
            ),
            (
                Roles::SUCC,
                Frame::NewMessage {
                    sender: joiner,
                    content: "hi".to_string(),
                },
            ),
            (
                Roles::NEW,
                Frame::Nickname {
                    sender: joiner,
                    name: "mallory".to_string(),
                },
            ),
            (
                Roles::SUCC,
                Frame::Nickname {
                    sender: joiner,
                    name: "mallory".to_string(),
                },
            ),
        ];
        for (origin, frame) in cases {
            let kind = frame.kind();
            let err = fx.client.dispatch(origin, frame).await.unwrap_err();
            assert!(unexpected(err), "{kind} from {origin} should be rejected");
        }

        // ConfirmReferral from SUCC is still rejected while no admission
        // announced a successor replacement.
        let err = fx
            .client
            .dispatch(Roles::SUCC, Frame::ConfirmReferral)
            .await
            .unwrap_err();
        assert!(unexpected(err));
    }

    #[tokio::test]
    async fn test_join_swarm_refers_and_announces() {
        let fx = fixture().await;
        let joiner = addr("127.0.0.1:6100");
        let joiner_remote = fill_slot(&fx.client).await;

        fx.client
            .dispatch(Roles::NEW, Frame::JoinSwarm { addr: joiner })
            .await
            .unwrap();

        // The joiner is referred to our current successor...
        assert_eq!(
            expect_frame(&joiner_remote).await,
            Frame::Referral { addr: addr(SUCC) }
        );
        // ...and that successor is told to expect the joiner.
        assert_eq!(
            expect_frame(&fx.succ_remote).await,
            Frame::NewPredecessor { addr: joiner }
        );
        // The admission stays in flight until the splice completes.
        assert!(!fx.client.latest.is_empty());
    }

    #[tokio::test]
    async fn test_swap_waits_for_every_precondition() {
        let fx = fixture().await;
        let joiner = addr("127.0.0.1:6100");

        // Announcement alone (no admission in flight): no swap.
        fx.client
            .dispatch(Roles::PRED, Frame::NewPredecessor { addr: joiner })
            .await
            .unwrap();
        expect_no_frame(&fx.pred_remote).await;
        assert_eq!(fx.client.predecessor_addr().await, addr(PRED));

        // Admission plus confirmation, announcement already present:
        // the swap fires.
        let _joiner_remote = fill_slot(&fx.client).await;
        fx.client
            .dispatch(Roles::NEW, Frame::ConfirmPredecessor { addr: joiner })
            .await
            .unwrap();
        assert_eq!(expect_frame(&fx.pred_remote).await, Frame::ConfirmReferral);
        assert_eq!(fx.client.predecessor_addr().await, joiner);
        assert!(fx.client.latest.is_empty());
    }

    #[tokio::test]
    async fn test_swap_confirmation_first() {
        let fx = fixture().await;
        let joiner = addr("127.0.0.1:6100");

        let _joiner_remote = fill_slot(&fx.client).await;
        fx.client
            .dispatch(Roles::NEW, Frame::ConfirmPredecessor { addr: joiner })
            .await
            .unwrap();
        // Confirmation alone: still waiting on the announcement.
        expect_no_frame(&fx.pred_remote).await;
        assert_eq!(fx.client.predecessor_addr().await, addr(PRED));

        fx.client
            .dispatch(Roles::PRED, Frame::NewPredecessor { addr: joiner })
            .await
            .unwrap();
        assert_eq!(expect_frame(&fx.pred_remote).await, Frame::ConfirmReferral);
        assert_eq!(fx.client.predecessor_addr().await, joiner);
    }

    #[tokio::test]
    async fn test_mismatched_predecessors_leave_linkage_unchanged() {
        let fx = fixture().await;
        let announced = addr("127.0.0.1:6100");
        let confirmed = addr("127.0.0.1:6200");

        let _joiner_remote = fill_slot(&fx.client).await;
        fx.client
            .dispatch(Roles::PRED, Frame::NewPredecessor { addr: announced })
            .await
            .unwrap();
        let err = fx
            .client
            .dispatch(Roles::NEW, Frame::ConfirmPredecessor { addr: confirmed })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RingNetError::MismatchedPredecessor { .. }
        ));

        // Linkage untouched, admission aborted.
        assert_eq!(fx.client.predecessor_addr().await, addr(PRED));
        assert_eq!(fx.client.successor_addr().await, addr(SUCC));
        assert!(fx.client.latest.is_empty());
        expect_no_frame(&fx.pred_remote).await;
    }

    #[tokio::test]
    async fn test_confirm_referral_swaps_successor() {
        let fx = fixture().await;
        let joiner = addr("127.0.0.1:6100");
        let joiner_remote = fill_slot(&fx.client).await;

        fx.client
            .dispatch(Roles::NEW, Frame::JoinSwarm { addr: joiner })
            .await
            .unwrap();
        let _ = expect_frame(&joiner_remote).await; // referral
        let _ = expect_frame(&fx.succ_remote).await; // announcement

        fx.client
            .dispatch(Roles::SUCC, Frame::ConfirmReferral)
            .await
            .unwrap();
        assert_eq!(fx.client.successor_addr().await, joiner);
        assert!(fx.client.latest.is_empty());
    }

    #[tokio::test]
    async fn test_origin_stop_drops_own_messages() {
        let fx = fixture().await;
        fx.client
            .dispatch(
                Roles::PRED,
                Frame::NewMessage {
                    sender: addr(ME),
                    content: "echo".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(fx.deliveries.try_recv().is_err(), "own message delivered");
        expect_no_frame(&fx.succ_remote).await;
    }

    #[tokio::test]
    async fn test_message_delivered_and_forwarded() {
        let fx = fixture().await;
        let sender = addr("127.0.0.1:6300");
        let frame = Frame::NewMessage {
            sender,
            content: "hi there".to_string(),
        };
        fx.client.dispatch(Roles::PRED, frame.clone()).await.unwrap();

        assert_eq!(
            fx.deliveries.recv_timeout(Duration::from_secs(1)).unwrap(),
            (sender.to_string(), "hi there".to_string())
        );
        assert_eq!(expect_frame(&fx.succ_remote).await, frame);
    }

    #[tokio::test]
    async fn test_nickname_recorded_and_forwarded() {
        let fx = fixture().await;
        let sender = addr("127.0.0.1:6300");
        let rename = Frame::Nickname {
            sender,
            name: "bob".to_string(),
        };
        fx.client.dispatch(Roles::PRED, rename.clone()).await.unwrap();
        assert_eq!(expect_frame(&fx.succ_remote).await, rename);

        fx.client
            .dispatch(
                Roles::PRED,
                Frame::NewMessage {
                    sender,
                    content: "yo".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            fx.deliveries.recv_timeout(Duration::from_secs(1)).unwrap(),
            ("bob".to_string(), "yo".to_string())
        );
    }

    #[tokio::test]
    async fn test_own_nickname_lap_stops() {
        let fx = fixture().await;
        fx.client
            .dispatch(
                Roles::PRED,
                Frame::Nickname {
                    sender: addr(ME),
                    name: "self".to_string(),
                },
            )
            .await
            .unwrap();
        expect_no_frame(&fx.succ_remote).await;
    }
}
