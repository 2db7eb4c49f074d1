// src/core/errors.rs

//! Defines the primary error type for the relay.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Every failure a connection, the broadcaster or the listener can run into.
///
/// Transport-level variants (`Io`, `SendTimeout`, `ConnectionClosed`,
/// `MessageTooLarge`, `InvalidUtf8`) and `PeerDisconnected` are all handled the
/// same way by a connection handler: they force the connection into teardown.
/// `Bind` is only produced while setting up the listening endpoint and is fatal.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("Peer disconnected")]
    PeerDisconnected,

    #[error("Send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Message exceeds the maximum size of {0} bytes")]
    MessageTooLarge(usize),

    #[error("Message is not valid UTF-8")]
    InvalidUtf8,

    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: Arc<io::Error>,
    },
}

impl RelayError {
    /// Returns true for errors that simply mean the peer went away, as opposed
    /// to faults worth a warning in the logs.
    pub fn is_normal_disconnect(&self) -> bool {
        match self {
            RelayError::PeerDisconnected | RelayError::ConnectionClosed => true,
            RelayError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    pub(crate) fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        RelayError::Bind {
            addr: addr.into(),
            source: Arc::new(source),
        }
    }
}

// `io::Error` is not `Clone`; the Arc is shared instead.
impl Clone for RelayError {
    fn clone(&self) -> Self {
        match self {
            RelayError::Io(e) => RelayError::Io(Arc::clone(e)),
            RelayError::PeerDisconnected => RelayError::PeerDisconnected,
            RelayError::SendTimeout(d) => RelayError::SendTimeout(*d),
            RelayError::ConnectionClosed => RelayError::ConnectionClosed,
            RelayError::MessageTooLarge(n) => RelayError::MessageTooLarge(*n),
            RelayError::InvalidUtf8 => RelayError::InvalidUtf8,
            RelayError::Bind { addr, source } => RelayError::Bind {
                addr: addr.clone(),
                source: Arc::clone(source),
            },
        }
    }
}

impl PartialEq for RelayError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RelayError::Io(e1), RelayError::Io(e2)) => e1.kind() == e2.kind(),
            (RelayError::SendTimeout(d1), RelayError::SendTimeout(d2)) => d1 == d2,
            (RelayError::MessageTooLarge(n1), RelayError::MessageTooLarge(n2)) => n1 == n2,
            (
                RelayError::Bind { addr: a1, .. },
                RelayError::Bind { addr: a2, .. },
            ) => a1 == a2,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return RelayError::PeerDisconnected;
        }
        RelayError::Io(Arc::new(e))
    }
}
