//! Participant
//!
//! A participant owns one private estimate. It announces the estimate, then
//! for every non-terminal broadcast blends the coordinator's aggregate into
//! it (3:2 in favour of its own value) and reports again. The terminal
//! broadcast carries the converged aggregate and ends the exchange.
//!
//! Receives block without timeout; the coordinator is the only source of
//! truth for a round, so any transfer failure is fatal.

use super::damping;
use super::error::{FailureKind, SyncError};
use super::protocol::{recv_message, send_message, Message};
use super::transport::Transport;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, error, info};

/// Participant parameters, validated before connecting
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSettings {
    /// Identity in 1..=N
    pub id: i32,

    /// Estimate before the first round
    pub initial_estimate: f64,

    /// Coordinator address (`host:port`)
    pub coordinator: String,
}

/// Participant state machine phases
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticipantPhase {
    Announce,
    AwaitBroadcast,
    Update { central: f64 },
    Done { final_value: f64 },
    Aborted(FailureKind),
}

/// Result of a completed participant run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantOutcome {
    pub id: i32,

    /// Aggregate carried by the terminal broadcast
    pub final_value: f64,

    /// Own estimate after the last update
    pub estimate: f64,

    /// Number of non-terminal broadcasts received
    pub rounds: u64,
}

/// Participant state machine over any byte transport
pub struct ParticipantEngine<S> {
    id: i32,
    estimate: f64,
    stream: S,
    phase: ParticipantPhase,
    rounds: u64,
}

impl<S: Transport> ParticipantEngine<S> {
    pub fn new(id: i32, initial_estimate: f64, stream: S) -> Self {
        Self {
            id,
            estimate: initial_estimate,
            stream,
            phase: ParticipantPhase::Announce,
            rounds: 0,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn phase(&self) -> ParticipantPhase {
        self.phase
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Perform one state transition
    ///
    /// `Done` and `Aborted` are absorbing.
    pub async fn step(&mut self) -> Result<ParticipantPhase, SyncError> {
        match self.phase {
            ParticipantPhase::Announce => {
                let msg = Message::report(self.id, self.estimate);
                if let Err(source) = send_message(&mut self.stream, &msg).await {
                    return Err(self.abort(SyncError::Announce { id: self.id, source }));
                }
                info!(id = self.id, estimate = self.estimate, "announced initial estimate");
                self.phase = ParticipantPhase::AwaitBroadcast;
            }
            ParticipantPhase::AwaitBroadcast => {
                let msg = match recv_message(&mut self.stream).await {
                    Ok(msg) => msg,
                    Err(source) => {
                        return Err(self.abort(SyncError::Receive {
                            id: self.id,
                            round: self.rounds,
                            source,
                        }));
                    }
                };

                if msg.terminate {
                    info!(
                        id = self.id,
                        final_value = msg.value,
                        rounds = self.rounds,
                        "received terminal broadcast"
                    );
                    if let Err(e) = self.stream.shutdown().await {
                        debug!(id = self.id, error = %e, "shutdown failed");
                    }
                    self.phase = ParticipantPhase::Done { final_value: msg.value };
                } else {
                    self.phase = ParticipantPhase::Update { central: msg.value };
                }
            }
            ParticipantPhase::Update { central } => {
                let previous = self.estimate;
                self.estimate = damping::blend_estimate(previous, central);
                info!(
                    id = self.id,
                    round = self.rounds,
                    central,
                    estimate = self.estimate,
                    "updated estimate"
                );

                let msg = Message::report(self.id, self.estimate);
                if let Err(source) = send_message(&mut self.stream, &msg).await {
                    return Err(self.abort(SyncError::Submit {
                        id: self.id,
                        round: self.rounds,
                        source,
                    }));
                }
                self.rounds += 1;
                self.phase = ParticipantPhase::AwaitBroadcast;
            }
            ParticipantPhase::Done { .. } | ParticipantPhase::Aborted(_) => {}
        }

        Ok(self.phase)
    }

    /// Drive the exchange until the terminal broadcast
    pub async fn run(&mut self) -> Result<ParticipantOutcome, SyncError> {
        loop {
            match self.step().await? {
                ParticipantPhase::Done { final_value } => {
                    return Ok(ParticipantOutcome {
                        id: self.id,
                        final_value,
                        estimate: self.estimate,
                        rounds: self.rounds,
                    });
                }
                ParticipantPhase::Aborted(kind) => return Err(SyncError::Aborted { kind }),
                _ => {}
            }
        }
    }

    fn abort(&mut self, err: SyncError) -> SyncError {
        error!(id = self.id, error = %err, "participant aborted");
        self.phase = ParticipantPhase::Aborted(err.kind());
        err
    }
}

/// TCP front end for [`ParticipantEngine`]
pub struct Participant {
    settings: ParticipantSettings,
}

impl Participant {
    pub fn new(settings: ParticipantSettings) -> Self {
        Self { settings }
    }

    /// Establish the connection to the coordinator
    pub async fn connect(&self) -> Result<ParticipantEngine<TcpStream>, SyncError> {
        let addr = &self.settings.coordinator;
        let stream = TcpStream::connect(addr).await.map_err(|source| SyncError::Connect {
            addr: addr.clone(),
            source,
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle");
        }

        info!(
            id = self.settings.id,
            coordinator = %addr,
            initial_estimate = self.settings.initial_estimate,
            "connected to coordinator"
        );

        Ok(ParticipantEngine::new(
            self.settings.id,
            self.settings.initial_estimate,
            stream,
        ))
    }

    /// Connect and run until the terminal broadcast
    pub async fn run(self) -> Result<ParticipantOutcome, SyncError> {
        let mut engine = self.connect().await?;
        engine.run().await
    }
}
