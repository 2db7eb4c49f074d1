// tests/integration/handler_test.rs

//! Drives a `ConnectionHandler` over in-memory pipes through each way a
//! connection can end.

use super::test_helpers::{DuplexPeer, duplex_connection, line_settings, text};
use bytes::Bytes;
use chatrelay::RelayError;
use chatrelay::connection::{Connection, ConnectionHandler, ConnectionReader, DisconnectReason};
use chatrelay::core::{Broadcaster, Registry, notice};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const WELCOME: &str = "Welcome!";

/// A registry with one passive member, `b`, that only observes.
struct Room {
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    shutdown_tx: broadcast::Sender<()>,
    b: Arc<Connection>,
    _b_reader: ConnectionReader,
    b_peer: DuplexPeer,
}

impl Room {
    fn new() -> Self {
        let registry = Arc::new(Registry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let (shutdown_tx, _) = broadcast::channel(1);
        let (b, b_reader, b_peer) = duplex_connection(2, 4096, line_settings(Duration::from_secs(1)));
        registry.add(b.clone());
        Self {
            registry,
            broadcaster,
            shutdown_tx,
            b,
            _b_reader: b_reader,
            b_peer,
        }
    }

    fn spawn(&self, connection: Arc<Connection>, reader: ConnectionReader) -> JoinHandle<DisconnectReason> {
        let handler = ConnectionHandler::new(
            connection,
            reader,
            self.broadcaster.clone(),
            Bytes::from_static(WELCOME.as_bytes()),
            self.shutdown_tx.subscribe(),
        );
        tokio::spawn(handler.run())
    }
}

async fn finish(handle: JoinHandle<DisconnectReason>) -> DisconnectReason {
    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("Handler did not finish in time")
        .expect("Handler panicked")
}

#[tokio::test]
async fn test_handler_quit_lifecycle() {
    let mut room = Room::new();
    let (a, a_reader, mut a_peer) = duplex_connection(1, 4096, line_settings(Duration::from_secs(1)));
    let handle = room.spawn(a.clone(), a_reader);

    assert_eq!(a_peer.recv().await, WELCOME);
    assert_eq!(room.b_peer.recv().await, text(notice::join(a.addr())));
    assert!(room.registry.contains(a.id()));

    a_peer.send(b"hello\n").await;
    assert_eq!(room.b_peer.recv().await, text(notice::relayed(a.addr(), "hello")));

    a_peer.send(b"quit\n").await;
    assert_eq!(finish(handle).await, DisconnectReason::Quit);
    assert_eq!(room.b_peer.recv().await, text(notice::departure(a.addr())));
    a_peer.expect_eof().await;

    assert!(!room.registry.contains(a.id()));
    assert!(room.registry.contains(room.b.id()));
    assert!(a.is_closed());
}

#[tokio::test]
async fn test_handler_end_of_stream() {
    let mut room = Room::new();
    let (a, a_reader, mut a_peer) = duplex_connection(1, 4096, line_settings(Duration::from_secs(1)));
    let handle = room.spawn(a.clone(), a_reader);
    assert_eq!(a_peer.recv().await, WELCOME);

    drop(a_peer);

    assert_eq!(finish(handle).await, DisconnectReason::EndOfStream);
    assert_eq!(room.b_peer.recv().await, text(notice::join(a.addr())));
    assert_eq!(room.b_peer.recv().await, text(notice::departure(a.addr())));
    assert_eq!(room.registry.len(), 1);
}

#[tokio::test]
async fn test_handler_invalid_utf8_closes_connection() {
    let mut room = Room::new();
    let (a, a_reader, mut a_peer) = duplex_connection(1, 4096, line_settings(Duration::from_secs(1)));
    let handle = room.spawn(a.clone(), a_reader);
    assert_eq!(a_peer.recv().await, WELCOME);

    a_peer.send(b"\xff\xfe\n").await;

    assert_eq!(
        finish(handle).await,
        DisconnectReason::Error(RelayError::InvalidUtf8)
    );
    assert_eq!(room.b_peer.recv().await, text(notice::join(a.addr())));
    assert_eq!(room.b_peer.recv().await, text(notice::departure(a.addr())));
    assert!(!room.registry.contains(a.id()));
}

#[tokio::test]
async fn test_handler_oversized_message() {
    let room = Room::new();
    let (a, a_reader, mut a_peer) = duplex_connection(1, 8192, line_settings(Duration::from_secs(1)));
    let handle = room.spawn(a.clone(), a_reader);
    assert_eq!(a_peer.recv().await, WELCOME);

    a_peer.send("z".repeat(2000).as_bytes()).await;

    assert_eq!(
        finish(handle).await,
        DisconnectReason::Error(RelayError::MessageTooLarge(1024))
    );
    assert!(!room.registry.contains(a.id()));
}

#[tokio::test]
async fn test_handler_server_shutdown_skips_departure() {
    let mut room = Room::new();
    let (a, a_reader, mut a_peer) = duplex_connection(1, 4096, line_settings(Duration::from_secs(1)));
    let handle = room.spawn(a.clone(), a_reader);
    assert_eq!(a_peer.recv().await, WELCOME);
    assert_eq!(room.b_peer.recv().await, text(notice::join(a.addr())));

    room.shutdown_tx.send(()).unwrap();

    assert_eq!(finish(handle).await, DisconnectReason::ServerShutdown);
    assert_eq!(a_peer.recv().await, text(notice::shutdown()));
    a_peer.expect_eof().await;
    room.b_peer.expect_silence().await;
    assert!(!room.registry.contains(a.id()));
}

#[tokio::test]
async fn test_handler_welcome_failure_still_cleans_up() {
    let mut room = Room::new();
    let (a, a_reader, a_peer) = duplex_connection(1, 4096, line_settings(Duration::from_secs(1)));
    drop(a_peer);

    let handle = room.spawn(a.clone(), a_reader);

    assert!(matches!(finish(handle).await, DisconnectReason::Error(_)));
    // No join was announced, but the departure still is.
    assert_eq!(room.b_peer.recv().await, text(notice::departure(a.addr())));
    assert!(!room.registry.contains(a.id()));
    assert_eq!(room.registry.len(), 1);
}

#[tokio::test]
async fn test_aborted_handler_leaves_registry() {
    let room = Room::new();
    let (a, a_reader, mut a_peer) = duplex_connection(1, 4096, line_settings(Duration::from_secs(1)));
    let handle = room.spawn(a.clone(), a_reader);
    assert_eq!(a_peer.recv().await, WELCOME);
    assert!(room.registry.contains(a.id()));

    handle.abort();
    let _ = handle.await;

    assert!(!room.registry.contains(a.id()));
}

#[tokio::test]
async fn test_closing_connection_ends_handler() {
    let room = Room::new();
    let (a, a_reader, mut a_peer) = duplex_connection(1, 4096, line_settings(Duration::from_secs(1)));
    let handle = room.spawn(a.clone(), a_reader);
    assert_eq!(a_peer.recv().await, WELCOME);

    // What the broadcaster does to a peer whose delivery failed.
    room.registry.remove(a.id());
    a.close().await;

    assert_eq!(finish(handle).await, DisconnectReason::EndOfStream);
}
