//! Coordinator/participant convergence protocol
//!
//! # Architecture
//!
//! - **Coordinator**: holds N connections, aggregates one report per slot per
//!   round, broadcasts the new aggregate or the terminal record
//! - **Participant**: reports its estimate, blends each broadcast into it
//!
//! # Modules
//!
//! - `protocol`: fixed-size message codec and full-transfer helpers
//! - `transport`: byte-stream capability and a fault-injecting test stream
//! - `damping`: blend rules and the convergence test
//! - `coordinator`: coordinator state machine and TCP front end
//! - `participant`: participant state machine and TCP front end
//! - `simulation`: whole cluster in one process
//! - `error`: fatal error taxonomy

pub mod coordinator;
pub mod damping;
pub mod error;
pub mod participant;
pub mod protocol;
pub mod simulation;
pub mod transport;

// Re-export key types
pub use coordinator::{
    Coordinator, CoordinatorEngine, CoordinatorPhase, CoordinatorSettings, Outcome, RoundRecord,
    SlotState,
};
pub use error::{FailureKind, SyncError, TransferError};
pub use participant::{
    Participant, ParticipantEngine, ParticipantOutcome, ParticipantPhase, ParticipantSettings,
};
pub use protocol::{recv_message, send_message, Message, BROADCAST_SENDER, MESSAGE_LEN};
pub use simulation::{SimulationReport, SimulationSettings};
pub use transport::{FaultyStream, Transport};
