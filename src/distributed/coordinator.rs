//! Coordinator
//!
//! The coordinator:
//! - Accepts exactly N participant connections, one slot each, in acceptance order
//! - Collects one report per slot, in slot order, every round
//! - Stops once no slot moved by `tolerance` or more since the previous round
//! - Otherwise blends the reports into the aggregate and broadcasts it
//! - Finishes with one terminal broadcast per slot and closes every connection
//!
//! Slots, not the ids participants claim, drive all bookkeeping. A claimed id
//! outside 1..=N is logged and otherwise ignored.
//!
//! The round barrier is strict: nothing is broadcast for round k until every
//! slot has reported for round k. Receives have no timeout, so a silent
//! participant stalls the round indefinitely.

use super::damping;
use super::error::{FailureKind, SyncError};
use super::protocol::{recv_message, send_message, Message};
use super::transport::Transport;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Coordinator parameters, validated before the engine starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorSettings {
    /// Number of participants (N)
    pub participants: usize,

    /// Aggregate before the first round
    pub initial_aggregate: f64,

    /// Convergence tolerance
    pub tolerance: f64,
}

/// Coordinator state machine phases
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinatorPhase {
    Accepting,
    RoundCollect,
    ConvergenceCheck,
    Aggregate,
    Terminating,
    Done,
    Aborted(FailureKind),
}

/// Per-slot bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotState {
    /// Value reported this round
    pub current: f64,

    /// Value reported last round, `None` before the first aggregate
    pub previous: Option<f64>,

    /// Id the participant claimed on its latest report
    pub claimed_id: Option<i32>,
}

/// One collect-then-broadcast cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub round: u64,

    /// Reports in slot order
    pub values: Vec<f64>,

    /// Largest per-slot change, `None` on the first round
    pub max_delta: Option<f64>,

    /// Value broadcast at the end of the round
    pub aggregate: f64,

    /// Whether the broadcast was terminal
    pub terminal: bool,
}

/// Result of a completed coordinator run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub participants: usize,

    /// Number of non-terminal broadcasts
    pub rounds: u64,

    /// Converged aggregate, as sent in the terminal broadcast
    pub aggregate: f64,

    /// Last reports, in slot order
    pub final_values: Vec<f64>,

    pub history: Vec<RoundRecord>,
}

struct Connection<S> {
    stream: S,
    peer: String,
}

/// Coordinator state machine over any byte transport
pub struct CoordinatorEngine<S> {
    settings: CoordinatorSettings,
    phase: CoordinatorPhase,
    aggregate: f64,
    round: u64,
    connections: Vec<Connection<S>>,
    slots: Vec<SlotState>,
    last_delta: Option<f64>,
    history: Vec<RoundRecord>,
}

impl<S: Transport> CoordinatorEngine<S> {
    pub fn new(settings: CoordinatorSettings) -> Self {
        let phase = if settings.participants == 0 {
            CoordinatorPhase::RoundCollect
        } else {
            CoordinatorPhase::Accepting
        };

        Self {
            settings,
            phase,
            aggregate: settings.initial_aggregate,
            round: 0,
            connections: Vec::with_capacity(settings.participants),
            slots: Vec::with_capacity(settings.participants),
            last_delta: None,
            history: Vec::new(),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    pub fn aggregate(&self) -> f64 {
        self.aggregate
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn slots(&self) -> &[SlotState] {
        &self.slots
    }

    pub fn history(&self) -> &[RoundRecord] {
        &self.history
    }

    /// Hand an accepted connection to the engine
    ///
    /// Returns the 1-based slot assigned to it. Once N slots are held the
    /// engine moves to `RoundCollect`.
    pub fn admit(&mut self, stream: S, peer: impl Into<String>) -> Result<usize, SyncError> {
        if self.phase != CoordinatorPhase::Accepting {
            return Err(SyncError::NotReady { phase: format!("{:?}", self.phase) });
        }

        let peer = peer.into();
        self.connections.push(Connection { stream, peer: peer.clone() });
        self.slots.push(SlotState { current: 0.0, previous: None, claimed_id: None });
        let slot = self.connections.len();

        info!(slot, peer = %peer, "accepted participant");

        if slot == self.settings.participants {
            info!(participants = slot, "all participants connected");
            self.phase = CoordinatorPhase::RoundCollect;
        }

        Ok(slot)
    }

    /// Perform one state transition
    ///
    /// Returns the phase entered. Failures move the engine to `Aborted` and
    /// are returned as errors; `Done` and `Aborted` are absorbing.
    pub async fn step(&mut self) -> Result<CoordinatorPhase, SyncError> {
        match self.phase {
            CoordinatorPhase::Accepting => {
                return Err(SyncError::NotReady { phase: "Accepting".to_string() });
            }
            CoordinatorPhase::RoundCollect => self.collect().await?,
            CoordinatorPhase::ConvergenceCheck => self.check_convergence(),
            CoordinatorPhase::Aggregate => self.aggregate_and_broadcast().await?,
            CoordinatorPhase::Terminating => self.terminate().await?,
            CoordinatorPhase::Done | CoordinatorPhase::Aborted(_) => {}
        }

        Ok(self.phase)
    }

    /// Drive rounds until convergence
    pub async fn run(&mut self) -> Result<Outcome, SyncError> {
        loop {
            match self.step().await? {
                CoordinatorPhase::Done => return Ok(self.outcome()),
                CoordinatorPhase::Aborted(kind) => return Err(SyncError::Aborted { kind }),
                _ => {}
            }
        }
    }

    pub fn outcome(&self) -> Outcome {
        Outcome {
            participants: self.settings.participants,
            rounds: self.round,
            aggregate: self.aggregate,
            final_values: self.slots.iter().map(|s| s.current).collect(),
            history: self.history.clone(),
        }
    }

    async fn collect(&mut self) -> Result<(), SyncError> {
        let n = self.settings.participants;

        for index in 0..self.connections.len() {
            let slot = index + 1;
            let result = recv_message(&mut self.connections[index].stream).await;
            let msg = match result {
                Ok(msg) => msg,
                Err(source) => {
                    return Err(self.abort(SyncError::Collect { round: self.round, slot, source }));
                }
            };

            if msg.sender_id < 1 || msg.sender_id as i64 > n as i64 {
                warn!(
                    round = self.round,
                    slot,
                    claimed_id = msg.sender_id,
                    "participant sent out-of-range id, using slot index"
                );
            }

            let state = &mut self.slots[index];
            state.current = msg.value;
            state.claimed_id = Some(msg.sender_id);

            debug!(
                round = self.round,
                slot,
                claimed_id = msg.sender_id,
                value = msg.value,
                delta = damping::slot_delta(state.current, state.previous),
                "received report"
            );
        }

        self.phase = CoordinatorPhase::ConvergenceCheck;
        Ok(())
    }

    fn check_convergence(&mut self) {
        let delta = damping::max_delta(self.slots.iter().map(|s| (s.current, s.previous)));
        self.last_delta = delta;

        if damping::is_converged(delta, self.settings.tolerance) {
            info!(
                round = self.round,
                max_delta = ?delta,
                aggregate = self.aggregate,
                "converged"
            );
            self.phase = CoordinatorPhase::Terminating;
        } else {
            debug!(round = self.round, max_delta = ?delta, "not converged");
            self.phase = CoordinatorPhase::Aggregate;
        }
    }

    async fn aggregate_and_broadcast(&mut self) -> Result<(), SyncError> {
        let values: Vec<f64> = self.slots.iter().map(|s| s.current).collect();
        self.aggregate = damping::blend_aggregate(self.aggregate, &values);

        for state in &mut self.slots {
            state.previous = Some(state.current);
        }

        info!(round = self.round, aggregate = self.aggregate, "new aggregate");

        let msg = Message::broadcast(self.aggregate);
        for index in 0..self.connections.len() {
            let result = send_message(&mut self.connections[index].stream, &msg).await;
            if let Err(source) = result {
                return Err(self.abort(SyncError::Broadcast {
                    round: self.round,
                    slot: index + 1,
                    source,
                }));
            }
        }

        self.history.push(RoundRecord {
            round: self.round,
            values,
            max_delta: self.last_delta,
            aggregate: self.aggregate,
            terminal: false,
        });
        self.round += 1;
        self.phase = CoordinatorPhase::RoundCollect;
        Ok(())
    }

    async fn terminate(&mut self) -> Result<(), SyncError> {
        let msg = Message::terminal(self.aggregate);

        for index in 0..self.connections.len() {
            let result = send_message(&mut self.connections[index].stream, &msg).await;
            if let Err(source) = result {
                return Err(self.abort(SyncError::Broadcast {
                    round: self.round,
                    slot: index + 1,
                    source,
                }));
            }
        }

        self.history.push(RoundRecord {
            round: self.round,
            values: self.slots.iter().map(|s| s.current).collect(),
            max_delta: self.last_delta,
            aggregate: self.aggregate,
            terminal: true,
        });

        for (index, mut conn) in self.connections.drain(..).enumerate() {
            if let Err(e) = conn.stream.shutdown().await {
                debug!(slot = index + 1, peer = %conn.peer, error = %e, "shutdown failed");
            }
        }

        info!(
            rounds = self.round,
            aggregate = self.aggregate,
            "sent terminal broadcast, connections closed"
        );
        self.phase = CoordinatorPhase::Done;
        Ok(())
    }

    fn abort(&mut self, err: SyncError) -> SyncError {
        error!(round = self.round, error = %err, "coordinator aborted");
        self.phase = CoordinatorPhase::Aborted(err.kind());
        err
    }
}

/// TCP front end for [`CoordinatorEngine`]
pub struct Coordinator {
    settings: CoordinatorSettings,
    listen: String,
}

impl Coordinator {
    pub fn new(settings: CoordinatorSettings, listen: impl Into<String>) -> Self {
        Self { settings, listen: listen.into() }
    }

    /// Bind the listening socket
    pub async fn bind(&self) -> Result<TcpListener, SyncError> {
        let listener = TcpListener::bind(&self.listen).await.map_err(|source| SyncError::Bind {
            addr: self.listen.clone(),
            source,
        })?;

        match listener.local_addr() {
            Ok(addr) => info!(
                addr = %addr,
                participants = self.settings.participants,
                initial_aggregate = self.settings.initial_aggregate,
                "coordinator listening"
            ),
            Err(e) => warn!(error = %e, "listener has no local address"),
        }

        Ok(listener)
    }

    /// Bind, accept N participants and run to convergence
    pub async fn run(self) -> Result<Outcome, SyncError> {
        let listener = self.bind().await?;
        serve(self.settings, listener).await
    }
}

/// Accept N participants on `listener` and run to convergence
///
/// The listener is dropped once every slot is filled.
pub async fn serve(settings: CoordinatorSettings, listener: TcpListener) -> Result<Outcome, SyncError> {
    let mut engine: CoordinatorEngine<TcpStream> = CoordinatorEngine::new(settings);

    while engine.phase() == CoordinatorPhase::Accepting {
        let slot = engine.slots().len() + 1;
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(source) => return Err(engine.abort(SyncError::Accept { slot, source })),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(slot, error = %e, "could not disable Nagle");
        }
        engine.admit(stream, peer.to_string())?;
    }
    drop(listener);

    engine.run().await
}
