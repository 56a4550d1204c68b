//! Error taxonomy for the convergence protocol
//!
//! Every failure on the protocol path is fatal for the role that observes it.
//! The engines record the failure as an `Aborted` phase carrying a
//! [`FailureKind`] and return the full [`SyncError`] to the caller.

use serde::Serialize;
use std::io;
use thiserror::Error;

/// Coarse classification of a fatal condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Peer closed the stream before a full record was transferred
    PeerClosed,
    /// Transport-level failure during send or receive
    Transport,
    /// Connection could not be established (bind, accept or connect)
    Connect,
    /// A spawned role ended without reporting an outcome
    Task,
    /// An engine was driven from a phase that does not allow the request
    Protocol,
}

/// Incomplete transfer of a fixed-size record
///
/// Both variants mean the record was not delivered. Callers never see a
/// partially populated message.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("peer closed the connection after {transferred} of {expected} bytes")]
    PeerClosed { transferred: usize, expected: usize },

    #[error("transport failed after {transferred} of {expected} bytes: {source}")]
    Transport {
        transferred: usize,
        expected: usize,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransferError::PeerClosed { .. } => FailureKind::PeerClosed,
            TransferError::Transport { .. } => FailureKind::Transport,
        }
    }

    /// Bytes moved before the failure
    pub fn transferred(&self) -> usize {
        match self {
            TransferError::PeerClosed { transferred, .. }
            | TransferError::Transport { transferred, .. } => *transferred,
        }
    }
}

/// Fatal protocol error, naming the failing operation
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to bind coordinator listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection for slot {slot}: {source}")]
    Accept {
        slot: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to coordinator at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("round {round}: failed to receive from slot {slot}: {source}")]
    Collect {
        round: u64,
        slot: usize,
        #[source]
        source: TransferError,
    },

    #[error("round {round}: failed to broadcast to slot {slot}: {source}")]
    Broadcast {
        round: u64,
        slot: usize,
        #[source]
        source: TransferError,
    },

    #[error("participant {id}: failed to announce initial estimate: {source}")]
    Announce {
        id: i32,
        #[source]
        source: TransferError,
    },

    #[error("participant {id}: failed to receive broadcast for round {round}: {source}")]
    Receive {
        id: i32,
        round: u64,
        #[source]
        source: TransferError,
    },

    #[error("participant {id}: failed to submit estimate for round {round}: {source}")]
    Submit {
        id: i32,
        round: u64,
        #[source]
        source: TransferError,
    },

    #[error("participant {id} task did not complete: {source}")]
    ParticipantTask {
        id: i32,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("coordinator task did not complete: {source}")]
    CoordinatorTask {
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("operation not allowed in phase {phase}")]
    NotReady { phase: String },

    #[error("engine already aborted ({kind:?})")]
    Aborted { kind: FailureKind },
}

impl SyncError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Bind { .. } | SyncError::Accept { .. } | SyncError::Connect { .. } => {
                FailureKind::Connect
            }
            SyncError::Collect { source, .. }
            | SyncError::Broadcast { source, .. }
            | SyncError::Announce { source, .. }
            | SyncError::Receive { source, .. }
            | SyncError::Submit { source, .. } => source.kind(),
            SyncError::ParticipantTask { .. } | SyncError::CoordinatorTask { .. } => {
                FailureKind::Task
            }
            SyncError::NotReady { .. } => FailureKind::Protocol,
            SyncError::Aborted { kind } => *kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_kinds() {
        let closed = TransferError::PeerClosed { transferred: 10, expected: 24 };
        assert_eq!(closed.kind(), FailureKind::PeerClosed);
        assert_eq!(closed.transferred(), 10);

        let reset = TransferError::Transport {
            transferred: 0,
            expected: 24,
            source: io::Error::from(io::ErrorKind::ConnectionReset),
        };
        assert_eq!(reset.kind(), FailureKind::Transport);
    }

    #[test]
    fn test_sync_error_names_operation() {
        let err = SyncError::Collect {
            round: 3,
            slot: 2,
            source: TransferError::PeerClosed { transferred: 10, expected: 24 },
        };
        assert_eq!(err.kind(), FailureKind::PeerClosed);
        let text = err.to_string();
        assert!(text.contains("round 3"));
        assert!(text.contains("slot 2"));
        assert!(text.contains("10 of 24"));
    }

    #[test]
    fn test_connect_errors_are_distinct() {
        let err = SyncError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.kind(), FailureKind::Connect);
    }

    #[test]
    fn test_aborted_keeps_failure_kind() {
        let err = SyncError::Aborted { kind: FailureKind::Transport };
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(err.to_string().contains("Transport"));
    }
}
