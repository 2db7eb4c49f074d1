// tests/integration/relay_test.rs

//! End-to-end relay tests over TCP: joins, relaying, ordering and departures.

use super::test_helpers::{TestClient, TestServer, test_config, text};
use chatrelay::core::notice;
use chatrelay::core::protocol::Framing;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Joins three clients in order, making sure every earlier peer has seen each
/// join notice before the next client connects.
async fn three_clients(server: &TestServer) -> (TestClient, TestClient, TestClient) {
    let mut a = server.join().await;

    let mut b = server.join().await;
    assert_eq!(a.recv().await, text(notice::join(b.addr)));

    let c = server.join().await;
    assert_eq!(a.recv().await, text(notice::join(c.addr)));
    assert_eq!(b.recv().await, text(notice::join(c.addr)));

    server.wait_for_members(3).await;
    (a, b, c)
}

// ===== Relaying =====

#[tokio::test]
async fn test_message_reaches_everyone_but_sender() {
    let server = TestServer::start().await;
    let (mut a, mut b, mut c) = three_clients(&server).await;

    a.send("hello").await;

    let expected = text(notice::relayed(a.addr, "hello"));
    assert_eq!(b.recv().await, expected);
    assert_eq!(c.recv().await, expected);
    a.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_quit_announces_departure_and_closes() {
    let server = TestServer::start().await;
    let (mut a, mut b, mut c) = three_clients(&server).await;

    c.send("quit").await;

    let departure = text(notice::departure(c.addr));
    assert_eq!(a.recv().await, departure);
    assert_eq!(b.recv().await, departure);
    c.expect_eof().await;

    server.wait_for_members(2).await;
    assert_eq!(server.member_addrs(), vec![a.addr, b.addr]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_quit_keyword_is_case_and_whitespace_insensitive() {
    let server = TestServer::start().await;
    let mut a = server.join().await;
    let mut b = server.join().await;
    assert_eq!(a.recv().await, text(notice::join(b.addr)));

    b.send("  QuIt ").await;

    assert_eq!(a.recv().await, text(notice::departure(b.addr)));
    b.expect_eof().await;
    server.wait_for_members(1).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_keyword_inside_a_sentence_is_relayed() {
    let server = TestServer::start().await;
    let mut a = server.join().await;
    let mut b = server.join().await;
    assert_eq!(a.recv().await, text(notice::join(b.addr)));

    b.send("I might quit soon").await;

    assert_eq!(
        a.recv().await,
        text(notice::relayed(b.addr, "I might quit soon"))
    );
    server.wait_for_members(2).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_messages_from_one_sender_arrive_in_order() {
    let server = TestServer::start().await;
    let mut a = server.join().await;
    let mut b = server.join().await;
    assert_eq!(a.recv().await, text(notice::join(b.addr)));

    for i in 0..50 {
        a.send(&format!("message {i}")).await;
    }
    for i in 0..50 {
        assert_eq!(
            b.recv().await,
            text(notice::relayed(a.addr, &format!("message {i}")))
        );
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_peer_closing_without_quit_announces_departure() {
    let server = TestServer::start().await;
    let mut a = server.join().await;
    let b = server.join().await;
    assert_eq!(a.recv().await, text(notice::join(b.addr)));
    let b_addr = b.addr;

    drop(b);

    assert_eq!(a.recv().await, text(notice::departure(b_addr)));
    server.wait_for_members(1).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_empty_lines_are_not_relayed() {
    let server = TestServer::start().await;
    let mut a = server.join().await;
    let mut b = server.join().await;
    assert_eq!(a.recv().await, text(notice::join(b.addr)));

    b.send("").await;
    b.send("after").await;

    // The first thing a sees is the real message, not an empty relay.
    assert_eq!(a.recv().await, text(notice::relayed(b.addr, "after")));

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_line_disconnects_sender() {
    let server = TestServer::start().await;
    let mut a = server.join().await;
    let mut b = server.join().await;
    assert_eq!(a.recv().await, text(notice::join(b.addr)));

    let oversized = "x".repeat(4096);
    b.send(&oversized).await;

    assert_eq!(a.recv().await, text(notice::departure(b.addr)));
    b.expect_eof().await;
    server.wait_for_members(1).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_custom_welcome_message() {
    let mut config = test_config();
    config.welcome_message = "Hi there".to_string();
    let server = TestServer::with_config(config).await;

    let mut a = TestClient::connect(server.addr).await;
    assert_eq!(a.recv().await, "Hi there");

    server.shutdown().await;
}

// ===== Raw framing =====

/// Reads whatever the next transport read delivers.
async fn read_chunk(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 1024];
    let n = tokio::time::timeout(Duration::from_secs(3), stream.read(&mut buf))
        .await
        .expect("Timed out waiting for data")
        .expect("Read failed");
    String::from_utf8(buf[..n].to_vec()).expect("Server sent invalid UTF-8")
}

#[tokio::test]
async fn test_raw_framing_relays_without_delimiters() {
    let mut config = test_config();
    config.framing = Framing::Raw;
    let server = TestServer::with_config(config).await;

    let mut a = TcpStream::connect(server.addr).await.unwrap();
    assert_eq!(read_chunk(&mut a).await, notice::DEFAULT_WELCOME);

    let mut b = TcpStream::connect(server.addr).await.unwrap();
    let b_addr = b.local_addr().unwrap();
    assert_eq!(read_chunk(&mut b).await, notice::DEFAULT_WELCOME);
    assert_eq!(read_chunk(&mut a).await, text(notice::join(b_addr)));

    b.write_all(b"hello").await.unwrap();
    assert_eq!(read_chunk(&mut a).await, text(notice::relayed(b_addr, "hello")));

    b.write_all(b"quit").await.unwrap();
    assert_eq!(read_chunk(&mut a).await, text(notice::departure(b_addr)));

    server.shutdown().await;
}
