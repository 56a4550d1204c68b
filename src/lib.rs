//! tempsync - round-based convergence on a shared scalar
//!
//! A coordinator and a fixed set of participants, each holding a private
//! estimate, exchange fixed-size records over TCP until every participant's
//! estimate stops moving by more than a tolerance.
//!
//! # Architecture
//!
//! - **Coordinator**: accepts exactly N connections, then repeats a
//!   collect-then-broadcast round, blending the submitted values into a
//!   running aggregate until the per-slot round-over-round change is small
//! - **Participant**: announces its estimate, then blends each broadcast
//!   aggregate into it until the coordinator sends the terminal record
//! - **Simulation**: runs a coordinator and N participants in one process
//!
//! All protocol I/O is blocking from the protocol's point of view: there are
//! no timeouts, and any transfer failure is fatal to the role that sees it.

pub mod config;
pub mod distributed;
pub mod output;

pub use config::Config;
pub use distributed::{
    CoordinatorEngine, CoordinatorSettings, Message, ParticipantEngine, SyncError,
};

/// Result type used by the application layer
pub type Result<T> = anyhow::Result<T>;
