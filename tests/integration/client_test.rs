// tests/integration/client_test.rs

//! Tests for the interactive client session against a live server.

use super::test_helpers::{TestServer, text};
use chatrelay::client::{ClientOptions, SessionEnd, run_session};
use chatrelay::core::notice;
use chatrelay::core::protocol::Framing;
use std::time::Duration;
use tokio::net::TcpStream;

fn options(server: &TestServer) -> ClientOptions {
    ClientOptions {
        host: server.addr.ip().to_string(),
        port: server.addr.port(),
        framing: Framing::Lines,
        ..ClientOptions::default()
    }
}

#[tokio::test]
async fn test_client_sends_lines_and_quits() {
    let server = TestServer::start().await;
    let mut b = server.join().await;

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let client_addr = stream.local_addr().unwrap();
    let input: &[u8] = b"hello\n\nquit\n";
    let mut output = Vec::new();

    let end = run_session(stream, input, &mut output, &options(&server))
        .await
        .unwrap();

    assert_eq!(end, SessionEnd::Quit);
    assert_eq!(b.recv().await, text(notice::join(client_addr)));
    assert_eq!(b.recv().await, text(notice::relayed(client_addr, "hello")));
    // The empty line is skipped and the keyword itself is never relayed.
    assert_eq!(b.recv().await, text(notice::departure(client_addr)));

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_ends_when_input_closes() {
    let server = TestServer::start().await;

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let input: &[u8] = b"";
    let mut output = Vec::new();

    let end = run_session(stream, input, &mut output, &options(&server))
        .await
        .unwrap();

    assert_eq!(end, SessionEnd::InputClosed);
    server.shutdown().await;
}

#[tokio::test]
async fn test_client_prints_messages_until_server_closes() {
    let server = TestServer::start().await;
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let opts = options(&server);

    // Keep the input open so only the server can end the session.
    let (_keyboard, input) = tokio::io::duplex(64);
    let session = tokio::spawn(async move {
        let mut output = Vec::new();
        let end = run_session(stream, input, &mut output, &opts).await;
        (end, output)
    });

    server.wait_for_members(1).await;
    server.shutdown().await;

    let (end, output) = tokio::time::timeout(Duration::from_secs(3), session)
        .await
        .expect("Session did not end")
        .unwrap();
    assert_eq!(end.unwrap(), SessionEnd::ServerClosed);
    assert_eq!(
        String::from_utf8(output).unwrap(),
        format!("{}\n{}\n", notice::DEFAULT_WELCOME, text(notice::shutdown()))
    );
}
