// src/core/notice.rs

//! Texts of the messages generated by the server itself, and detection of the
//! disconnect keyword.

use bytes::Bytes;
use std::net::SocketAddr;

/// The reserved token a peer sends to leave the conversation.
pub const DISCONNECT_KEYWORD: &str = "quit";

pub const DEFAULT_WELCOME: &str = "Welcome to the chat server! Type 'quit' to leave.";

/// Returns true if `text` is the disconnect keyword, ignoring surrounding
/// whitespace and ASCII case.
pub fn is_disconnect_keyword(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(DISCONNECT_KEYWORD)
}

/// Renders a peer as `ip:port`, the way every notice identifies it.
pub fn peer_label(addr: SocketAddr) -> String {
    format!("{}:{}", addr.ip(), addr.port())
}

pub fn join(addr: SocketAddr) -> Bytes {
    Bytes::from(format!(
        ">>> User at {} joined the conversation",
        peer_label(addr)
    ))
}

pub fn departure(addr: SocketAddr) -> Bytes {
    Bytes::from(format!(
        ">>> User at {} left the conversation",
        peer_label(addr)
    ))
}

/// Tags a user message with its sender before it is relayed.
pub fn relayed(addr: SocketAddr, text: &str) -> Bytes {
    Bytes::from(format!("[{}]: {}", peer_label(addr), text))
}

pub fn shutdown() -> Bytes {
    Bytes::from_static(b">>> Server is shutting down")
}

pub fn server_full() -> Bytes {
    Bytes::from_static(b">>> Server is full, try again later")
}
