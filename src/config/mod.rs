//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Everything here runs before any socket is opened; invalid settings never
//! reach the protocol engines.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::distributed::damping::DEFAULT_TOLERANCE;
use crate::distributed::{CoordinatorSettings, ParticipantSettings, SimulationSettings};
use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Complete configuration, one table per role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub participant: ParticipantConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Address to listen on (`host:port`)
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of participants to wait for
    #[serde(default = "default_participants")]
    pub participants: usize,
    /// Aggregate before the first round
    #[serde(default)]
    pub initial_aggregate: f64,
    /// Convergence tolerance
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

/// Participant configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Identity in 1..=participants (required)
    pub id: Option<i32>,
    /// Estimate before the first round
    #[serde(default)]
    pub initial_estimate: f64,
    /// Coordinator address (`host:port`)
    #[serde(default = "default_coordinator")]
    pub coordinator: String,
    /// Cluster size, bounds the identity
    #[serde(default = "default_participants")]
    pub participants: usize,
}

/// In-process simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Aggregate before the first round
    #[serde(default)]
    pub initial_aggregate: f64,
    /// Initial estimate per participant; the count is N
    #[serde(default)]
    pub estimates: Vec<f64>,
    /// Expected participant count, checked against `estimates` when set
    pub participants: Option<usize>,
    /// Convergence tolerance
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Transport used between the simulated roles
    #[serde(default)]
    pub transport: SimulationTransport,
}

/// Transport for the in-process simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SimulationTransport {
    /// Loopback TCP sockets
    #[default]
    Tcp,
    /// In-memory pipes
    Memory,
}

fn default_listen() -> String {
    "0.0.0.0:9999".to_string()
}

fn default_coordinator() -> String {
    "127.0.0.1:9999".to_string()
}

fn default_participants() -> usize {
    4
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            participants: default_participants(),
            initial_aggregate: 0.0,
            tolerance: default_tolerance(),
        }
    }
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            id: None,
            initial_estimate: 0.0,
            coordinator: default_coordinator(),
            participants: default_participants(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_aggregate: 0.0,
            estimates: Vec::new(),
            participants: None,
            tolerance: default_tolerance(),
            transport: SimulationTransport::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            participants: self.participants,
            initial_aggregate: self.initial_aggregate,
            tolerance: self.tolerance,
        }
    }
}

impl ParticipantConfig {
    pub fn settings(&self) -> Result<ParticipantSettings> {
        let id = self
            .id
            .ok_or_else(|| anyhow::anyhow!("participant id is required"))?;

        Ok(ParticipantSettings {
            id,
            initial_estimate: self.initial_estimate,
            coordinator: self.coordinator.clone(),
        })
    }
}

impl SimulationConfig {
    pub fn settings(&self) -> SimulationSettings {
        SimulationSettings {
            initial_aggregate: self.initial_aggregate,
            estimates: self.estimates.clone(),
            tolerance: self.tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.coordinator.listen, "0.0.0.0:9999");
        assert_eq!(config.coordinator.participants, 4);
        assert_eq!(config.coordinator.tolerance, 1e-3);
        assert_eq!(config.participant.id, None);
        assert_eq!(config.participant.coordinator, "127.0.0.1:9999");
        assert_eq!(config.simulation.transport, SimulationTransport::Tcp);
    }

    #[test]
    fn test_participant_settings_require_id() {
        let mut config = ParticipantConfig::default();
        assert!(config.settings().is_err());

        config.id = Some(2);
        config.initial_estimate = 10.0;
        let settings = config.settings().unwrap();
        assert_eq!(settings.id, 2);
        assert_eq!(settings.initial_estimate, 10.0);
    }

    #[test]
    fn test_simulation_settings_size_from_estimates() {
        let config = SimulationConfig {
            estimates: vec![0.0, 10.0, 20.0],
            initial_aggregate: 50.0,
            ..SimulationConfig::default()
        };
        let settings = config.settings();
        assert_eq!(settings.coordinator().participants, 3);
        assert_eq!(settings.coordinator().initial_aggregate, 50.0);
    }
}
