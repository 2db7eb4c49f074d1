// src/connection/transport.rs

//! Defines `Connection`, the wrapper around one accepted transport endpoint,
//! and `ConnectionReader`, its read side.
//!
//! The stream is split on construction. The write half stays inside the shared
//! `Connection` behind an async mutex, so sends coming from several
//! broadcasting tasks at once are serialized and never interleave their bytes.
//! The read half goes to the single handler that owns the connection.

use crate::core::RelayError;
use crate::core::protocol::{Framing, MessageCodec};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A server-unique identifier assigned to every accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport parameters shared by every connection of a server.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub framing: Framing,
    pub max_message_size: usize,
    /// Upper bound for a single send, including the wait for the write lock.
    pub send_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            max_message_size: crate::core::protocol::DEFAULT_MAX_MESSAGE_SIZE,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// One live peer: its identity plus the outbound half of its transport.
pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    sink: Mutex<Option<FramedWrite<BoxedWriter, MessageCodec>>>,
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
    send_timeout: Duration,
}

/// The inbound half of a `Connection`, owned by its handler.
pub struct ConnectionReader {
    frames: FramedRead<BoxedReader, MessageCodec>,
    close_rx: watch::Receiver<bool>,
}

impl Connection {
    /// Splits `stream` and wraps it. Returns the shareable connection and the
    /// reader that only its handler may use.
    pub fn new<S>(
        stream: S,
        addr: SocketAddr,
        id: ConnectionId,
        settings: ConnectionSettings,
    ) -> (Arc<Self>, ConnectionReader)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let codec = MessageCodec::new(settings.framing, settings.max_message_size);
        let (close_tx, close_rx) = watch::channel(false);

        let connection = Arc::new(Self {
            id,
            addr,
            sink: Mutex::new(Some(FramedWrite::new(
                Box::new(write_half) as BoxedWriter,
                codec.clone(),
            ))),
            closed: AtomicBool::new(false),
            close_tx,
            send_timeout: settings.send_timeout,
        });
        let reader = ConnectionReader {
            frames: FramedRead::new(Box::new(read_half) as BoxedReader, codec),
            close_rx,
        };
        (connection, reader)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes one message. Fails without touching the transport once the
    /// connection is closed, and fails with `SendTimeout` if the peer does not
    /// accept the bytes in time.
    pub async fn send(&self, message: &Bytes) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::ConnectionClosed);
        }
        let deliver = async {
            let mut sink = self.sink.lock().await;
            let sink = sink.as_mut().ok_or(RelayError::ConnectionClosed)?;
            sink.send(message.clone()).await
        };
        let result = match tokio::time::timeout(self.send_timeout, deliver).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::SendTimeout(self.send_timeout)),
        };
        // Closed while this write held the sink.
        if self.is_closed() {
            self.release_sink().await;
        }
        result
    }

    /// Releases the transport. Only the first call has any effect.
    ///
    /// The reader is woken and reports end-of-stream. Never waits on another
    /// writer: if a send holds the write half, that send releases it when it
    /// finishes or times out.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_tx.send_replace(true);
        self.release_sink().await;
    }

    async fn release_sink(&self) {
        let sink = match self.sink.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                debug!("Connection {} ({}): write in progress, released by its sender.", self.id, self.addr);
                None
            }
        };
        if let Some(mut sink) = sink
            && let Err(e) = sink.get_mut().shutdown().await
        {
            debug!("Connection {} ({}): shutdown failed: {}", self.id, self.addr, e);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionReader {
    /// Reads the next message. `Ok(None)` is end-of-stream, which is also what
    /// a reader sees once its connection has been closed.
    pub async fn receive(&mut self) -> Result<Option<Bytes>, RelayError> {
        if *self.close_rx.borrow() {
            return Ok(None);
        }
        let close_rx = &mut self.close_rx;
        let frames = &mut self.frames;
        tokio::select! {
            biased;
            _ = async { close_rx.wait_for(|closed| *closed).await.is_ok() } => Ok(None),
            frame = frames.next() => frame.transpose(),
        }
    }
}

impl fmt::Debug for ConnectionReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionReader")
            .field("codec", self.frames.decoder())
            .finish()
    }
}
