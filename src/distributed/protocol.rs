//! Convergence protocol wire format
//!
//! Every record exchanged between coordinator and participants has the same
//! fixed size, regardless of field values.
//!
//! # Message Flow
//!
//! ```text
//! Participant                     Coordinator
//!     |                              |
//!     |-------- REPORT(id, x0) ----->|   (all N slots collected)
//!     |<------- BROADCAST(c1) -------|
//!     |-------- REPORT(id, x1) ----->|
//!     |              ...             |
//!     |<------- TERMINAL(c) ---------|   (connection closed)
//! ```
//!
//! # Record Layout
//!
//! The 24-byte record matches the legacy C peers' `struct { int; double; int; }`
//! on LP64 little-endian hosts, so either side can talk to the old binaries:
//!
//! ```text
//! [0..4)   sender id      i32 LE
//! [4..8)   padding        zero
//! [8..16)  value          f64 LE
//! [16..20) terminate      i32 LE (0 = continue, nonzero = final)
//! [20..24) padding        zero
//! ```

use super::error::TransferError;
use serde::Serialize;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Encoded size of every message
pub const MESSAGE_LEN: usize = 24;

/// Sender id carried by coordinator broadcasts
pub const BROADCAST_SENDER: i32 = 0;

const ID_OFFSET: usize = 0;
const VALUE_OFFSET: usize = 8;
const TERMINATE_OFFSET: usize = 16;

/// Protocol message
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Message {
    /// Originating participant (1..=N), or [`BROADCAST_SENDER`] from the coordinator
    pub sender_id: i32,

    /// Sender's current estimate, or the aggregate on broadcasts
    pub value: f64,

    /// Set on the final coordinator broadcast; `value` is then the converged aggregate
    pub terminate: bool,
}

impl Message {
    /// Participant report for the current round
    pub fn report(sender_id: i32, value: f64) -> Self {
        Self { sender_id, value, terminate: false }
    }

    /// Non-terminal coordinator broadcast
    pub fn broadcast(value: f64) -> Self {
        Self { sender_id: BROADCAST_SENDER, value, terminate: false }
    }

    /// Terminal coordinator broadcast
    pub fn terminal(value: f64) -> Self {
        Self { sender_id: BROADCAST_SENDER, value, terminate: true }
    }

    pub fn encode(&self) -> [u8; MESSAGE_LEN] {
        let mut buf = [0u8; MESSAGE_LEN];
        buf[ID_OFFSET..ID_OFFSET + 4].copy_from_slice(&self.sender_id.to_le_bytes());
        buf[VALUE_OFFSET..VALUE_OFFSET + 8].copy_from_slice(&self.value.to_le_bytes());
        buf[TERMINATE_OFFSET..TERMINATE_OFFSET + 4]
            .copy_from_slice(&i32::from(self.terminate).to_le_bytes());
        buf
    }

    /// Decode a record
    ///
    /// Accepts any byte pattern of the right length. Padding is ignored and
    /// the sender id is not range-checked here.
    pub fn decode(buf: &[u8; MESSAGE_LEN]) -> Self {
        let mut id = [0u8; 4];
        id.copy_from_slice(&buf[ID_OFFSET..ID_OFFSET + 4]);
        let mut value = [0u8; 8];
        value.copy_from_slice(&buf[VALUE_OFFSET..VALUE_OFFSET + 8]);
        let mut terminate = [0u8; 4];
        terminate.copy_from_slice(&buf[TERMINATE_OFFSET..TERMINATE_OFFSET + 4]);

        Self {
            sender_id: i32::from_le_bytes(id),
            value: f64::from_le_bytes(value),
            terminate: i32::from_le_bytes(terminate) != 0,
        }
    }
}

/// Fill `buf` completely from `reader`
///
/// Short reads are continued and `Interrupted` is retried. End of stream
/// before the buffer is full is reported as [`TransferError::PeerClosed`].
pub async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let expected = buf.len();
    let mut filled = 0;

    while filled < expected {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => {
                return Err(TransferError::PeerClosed { transferred: filled, expected });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransferError::Transport { transferred: filled, expected, source });
            }
        }
    }

    Ok(())
}

/// Write all of `buf` to `writer` and flush
///
/// A zero-length write means the peer can no longer accept data and is
/// reported as [`TransferError::PeerClosed`].
pub async fn write_full<W>(writer: &mut W, buf: &[u8]) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let expected = buf.len();
    let mut written = 0;

    while written < expected {
        match writer.write(&buf[written..]).await {
            Ok(0) => {
                return Err(TransferError::PeerClosed { transferred: written, expected });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransferError::Transport { transferred: written, expected, source });
            }
        }
    }

    loop {
        match writer.flush().await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(TransferError::Transport { transferred: written, expected, source });
            }
        }
    }
}

/// Send one message, blocking until it is fully written
pub async fn send_message<W>(writer: &mut W, msg: &Message) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_full(writer, &msg.encode()).await
}

/// Receive one message, blocking until a full record arrives
pub async fn recv_message<R>(reader: &mut R) -> Result<Message, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; MESSAGE_LEN];
    read_full(reader, &mut buf).await?;
    Ok(Message::decode(&buf))
}
