//! Shared helpers for in-crate tests.

use {
    crate::connection::Connection,
    tokio::net::{TcpListener, TcpStream},
};

/// Open a connected pair of framed connections over a local listener.
pub(crate) async fn connection_pair() -> (Connection, Connection) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let dial = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
    let (accepted, _) = listener.accept().await.unwrap();
    let dialed = dial.await.unwrap();
    (
        Connection::new(dialed).unwrap(),
        Connection::new(accepted).unwrap(),
    )
}
