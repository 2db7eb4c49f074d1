// src/core/protocol/codec.rs

//! Implements `MessageCodec`, the `tokio_util` codec that maps transport bytes
//! to relay messages.
//!
//! Two framings are supported:
//!
//! * `Raw` treats whatever a single transport read delivered (capped at the
//!   maximum message size) as one message and writes messages without any
//!   delimiter. A byte stream does not preserve write boundaries, so two quick
//!   sends may arrive as one message and a large one may arrive split. This is
//!   the wire format of the classic relay clients and is kept for compatibility.
//! * `Lines` delimits every message with `\n` in both directions. Peers must
//!   opt in to it explicitly since it is not wire compatible with `Raw` clients.

use crate::core::RelayError;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

/// The read size of the classic relay clients, used as the default cap.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024;

/// The rule mapping transport bytes to messages.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// One transport read is one message; no delimiter on write.
    #[default]
    Raw,
    /// Newline-delimited messages.
    Lines,
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Framing::Raw),
            "lines" => Ok(Framing::Lines),
            other => Err(format!("unknown framing '{other}', expected 'raw' or 'lines'")),
        }
    }
}

/// A codec for relay messages in either framing.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    framing: Framing,
    max_message_size: usize,
    /// Where the newline search resumes in line mode, so a partial line is not rescanned.
    next_index: usize,
}

impl MessageCodec {
    pub fn new(framing: Framing, max_message_size: usize) -> Self {
        Self {
            framing,
            max_message_size: max_message_size.max(1),
            next_index: 0,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, RelayError> {
        let newline = src[self.next_index..].iter().position(|b| *b == b'\n');
        match newline {
            Some(offset) => {
                let newline_index = self.next_index + offset;
                self.next_index = 0;
                let mut line = src.split_to(newline_index + 1);
                line.truncate(newline_index);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                if line.len() > self.max_message_size {
                    return Err(RelayError::MessageTooLarge(self.max_message_size));
                }
                Ok(Some(line.freeze()))
            }
            None => {
                // A trailing `\r` may still turn out to be part of the terminator.
                let pending = src.len() - usize::from(src.last() == Some(&b'\r'));
                if pending > self.max_message_size {
                    return Err(RelayError::MessageTooLarge(self.max_message_size));
                }
                self.next_index = src.len();
                Ok(None)
            }
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(Framing::default(), DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Decoder for MessageCodec {
    type Item = Bytes;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.framing {
            Framing::Raw => {
                let len = src.len().min(self.max_message_size);
                Ok(Some(src.split_to(len).freeze()))
            }
            Framing::Lines => self.decode_line(src),
        }
    }

    /// In line mode an unterminated trailing line is still delivered at end-of-stream.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        let mut line = src.split_to(src.len());
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Ok(Some(line.freeze()))
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = RelayError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self.framing {
            Framing::Raw => dst.extend_from_slice(&item),
            Framing::Lines => {
                dst.reserve(item.len() + 1);
                dst.extend_from_slice(&item);
                dst.extend_from_slice(b"\n");
            }
        }
        Ok(())
    }
}
