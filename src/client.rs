// src/client.rs

//! The interactive relay client: forwards typed lines to the server and prints
//! every message it receives.

use crate::core::notice;
use crate::core::protocol::{DEFAULT_MAX_MESSAGE_SIZE, Framing, MessageCodec};
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::debug;

/// Where to connect and how to frame messages. Must match the server's framing.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub framing: Framing,
    pub max_message_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5555,
            framing: Framing::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// How a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed the disconnect keyword.
    Quit,
    /// The input stream ended.
    InputClosed,
    /// The server closed the connection.
    ServerClosed,
}

/// Connects to the server and runs a session on stdin/stdout.
pub async fn run(options: &ClientOptions) -> Result<SessionEnd> {
    let addr = format!("{}:{}", options.host, options.port);
    println!("Connecting to server {addr}...");
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Could not connect to {addr}. Make sure the server is running."))?;
    println!("Connected to server");

    let end = run_session(stream, tokio::io::stdin(), tokio::io::stdout(), options).await;
    if let Ok(SessionEnd::ServerClosed) = end {
        println!("Connection to the server was lost");
    }
    println!("Disconnected from server");
    end
}

/// Runs one session over an established connection: every line read from
/// `input` is sent as a message, every received message is written to `output`
/// followed by a newline. Ends after sending the disconnect keyword, when the
/// input ends or when the server goes away.
pub async fn run_session<I, O>(
    stream: TcpStream,
    input: I,
    mut output: O,
    options: &ClientOptions,
) -> Result<SessionEnd>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (read_half, write_half) = stream.into_split();
    let mut incoming = FramedRead::new(
        read_half,
        MessageCodec::new(options.framing, options.max_message_size),
    );
    let mut outgoing = FramedWrite::new(
        write_half,
        MessageCodec::new(options.framing, options.max_message_size),
    );
    let mut lines = FramedRead::new(input, LinesCodec::new());

    let end = loop {
        tokio::select! {
            message = incoming.next() => match message {
                Some(Ok(message)) => {
                    output.write_all(&message).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
                Some(Err(e)) => return Err(e).context("Error receiving messages"),
                None => break SessionEnd::ServerClosed,
            },
            line = lines.next() => match line {
                // An empty send carries no bytes in raw framing; skip it in both.
                Some(Ok(line)) if line.is_empty() => continue,
                Some(Ok(line)) => {
                    let leaving = notice::is_disconnect_keyword(&line);
                    outgoing
                        .send(Bytes::from(line))
                        .await
                        .context("Failed to send message")?;
                    if leaving {
                        break SessionEnd::Quit;
                    }
                }
                Some(Err(e)) => return Err(e).context("Failed to read input"),
                None => break SessionEnd::InputClosed,
            },
        }
    };

    if let Err(e) = outgoing.close().await {
        debug!("Closing the connection failed: {}", e);
    }
    Ok(end)
}
