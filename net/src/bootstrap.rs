//! Swarm entry: starting a fresh ring and joining an existing one.
//!
//! Both paths end in the same place, a [`RingClient`] with its pool
//! roles set and the listener and dispatcher tasks running, but get
//! there differently.  A creating node is *lonely*: it has no successor
//! to refer joiners to, so it handshakes its first peer inline and ends
//! up in a two-node ring where predecessor and successor are the same
//! peer.  A joining node drives the other side of the splice handshake
//! before its state machine exists.
//!
//! Errors before the ring tasks are running are fatal and returned;
//! after that the dispatcher's log-and-continue policy takes over.

use {
    crate::{
        client::RingClient,
        config::RingNetConfig,
        connection::{Connection, Peer},
        error::{Result, RingNetError},
        handle::SwarmHandle,
        pool::Roles,
    },
    log::{info, warn},
    ringlet_protocol::Frame,
    std::{net::SocketAddr, sync::Arc},
    tokio::net::{TcpListener, TcpStream},
};

/// Start a new one-node swarm listening on `me`.
///
/// Blocks until the first peer completes the join handshake; candidates
/// that fail it are dropped and the wait continues.  Failing to bind the
/// listener is the only fatal error.
pub async fn create_swarm(config: RingNetConfig, me: SocketAddr) -> Result<SwarmHandle> {
    let listener = TcpListener::bind(me).await?;
    info!("listening on {}; waiting for a first peer", me);
    let first = loop {
        let (stream, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("accept error: {}", err);
                continue;
            }
        };
        let conn = match Connection::new(stream) {
            Ok(conn) => Arc::new(conn),
            Err(err) => {
                warn!("failed to adopt connection from {}: {}", remote, err);
                continue;
            }
        };
        match accept_first_peer(&conn, me).await {
            Ok(addr) => break Peer::new(addr, conn),
            Err(err) => {
                warn!("first peer candidate {} failed the handshake: {}", remote, err);
                conn.shutdown().await;
            }
        }
    };
    info!("first peer {} joined; the ring is live", first.addr);
    Ok(start_node(config, me, first.clone(), first, listener))
}

/// Drive the lonely-node side of the first join: `JoinSwarm` in,
/// `Referral` back to ourselves, then a matching `ConfirmPredecessor`.
async fn accept_first_peer(conn: &Connection, me: SocketAddr) -> Result<SocketAddr> {
    let joiner = match conn.read_frame().await? {
        Frame::JoinSwarm { addr } => addr,
        other => {
            return Err(RingNetError::UnexpectedFrame {
                kind: other.kind(),
                origin: Roles::NEW,
            })
        }
    };
    // With no other member to refer to, the joiner's successor is us.
    conn.write_frame(&Frame::Referral { addr: me }).await?;
    match conn.read_frame().await? {
        Frame::ConfirmPredecessor { addr } if addr == joiner => Ok(joiner),
        Frame::ConfirmPredecessor { addr } => Err(RingNetError::MismatchedPredecessor {
            announced: joiner,
            confirmed: addr,
        }),
        other => Err(RingNetError::UnexpectedFrame {
            kind: other.kind(),
            origin: Roles::NEW,
        }),
    }
}

/// Join the swarm reachable through `start`, listening on `me` afterwards.
pub async fn join_swarm(
    config: RingNetConfig,
    me: SocketAddr,
    start: SocketAddr,
) -> Result<SwarmHandle> {
    let pred_conn = Arc::new(Connection::new(TcpStream::connect(start).await?)?);
    pred_conn.write_frame(&Frame::JoinSwarm { addr: me }).await?;
    let succ_addr = match pred_conn.read_frame().await? {
        Frame::Referral { addr } => addr,
        other => {
            return Err(RingNetError::UnexpectedFrame {
                kind: other.kind(),
                origin: Roles::NEW,
            })
        }
    };
    // In a one-node ring the contact is also our successor; reuse the
    // connection instead of dialing the same node twice.
    let succ_conn = if succ_addr == start {
        Arc::clone(&pred_conn)
    } else {
        Arc::new(Connection::new(TcpStream::connect(succ_addr).await?)?)
    };
    succ_conn
        .write_frame(&Frame::ConfirmPredecessor { addr: me })
        .await?;
    let listener = TcpListener::bind(me).await?;
    info!("joined via {}; successor is {}", start, succ_addr);
    Ok(start_node(
        config,
        me,
        Peer::new(start, pred_conn),
        Peer::new(succ_addr, succ_conn),
        listener,
    ))
}

/// Wire up the client, its pool roles, and the long-running tasks shared
/// by both entry paths.  When predecessor and successor are the same
/// connection the second submit merges into one reader with both bits.
fn start_node(
    config: RingNetConfig,
    me: SocketAddr,
    pred: Peer,
    succ: Peer,
    listener: TcpListener,
) -> SwarmHandle {
    let (client, events) = RingClient::new(config, me, pred.clone(), succ.clone());
    client.pool().submit(&pred, Roles::PRED);
    client.pool().submit(&succ, Roles::SUCC);
    tokio::spawn(Arc::clone(&client).listen_loop(listener));
    tokio::spawn(Arc::clone(&client).dispatch_loop(events));
    SwarmHandle::new(client)
}

// ── Tests ───────────────────────────────────────────────────────────────────
