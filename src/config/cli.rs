//! CLI argument parsing using clap

use super::SimulationTransport;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Simulate a whole cluster in this process (default)
    Simulate,
    /// Coordinator - accept N participants and drive rounds to convergence
    Coordinator,
    /// Participant - connect to a coordinator and converge one estimate
    Participant,
}

/// tempsync - round-based convergence on a shared scalar
#[derive(Parser, Debug)]
#[command(name = "tempsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: simulate, coordinator, or participant
    #[arg(long, value_enum, default_value = "simulate")]
    pub mode: ExecutionMode,

    /// TOML configuration file (CLI flags take precedence)
    #[arg(short = 'c', long, env = "TEMPSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    // === Coordinator Options ===
    /// Address to listen on (coordinator mode, e.g. 0.0.0.0:9999)
    #[arg(long)]
    pub listen: Option<String>,

    /// Number of participants (N)
    #[arg(short = 'n', long)]
    pub participants: Option<usize>,

    /// Initial value: aggregate for coordinator/simulate, estimate for participant
    #[arg(long, allow_negative_numbers = true)]
    pub initial: Option<f64>,

    /// Convergence tolerance (default 1e-3)
    #[arg(long)]
    pub tolerance: Option<f64>,

    // === Participant Options ===
    /// Participant identity (1..=N)
    #[arg(long, allow_negative_numbers = true)]
    pub id: Option<i32>,

    /// Coordinator address (participant mode, e.g. 127.0.0.1:9999)
    #[arg(long)]
    pub coordinator: Option<String>,

    // === Simulation Options ===
    /// Comma-separated initial estimates, one per participant (e.g. 0,10,20,30)
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub estimates: Vec<f64>,

    /// Transport between simulated roles
    #[arg(long, value_enum)]
    pub transport: Option<SimulationTransport>,

    // === Output Options ===
    /// Print the outcome as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Log filter when RUST_LOG is not set (e.g. info, debug, tempsync=trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check flag combinations that clap cannot express
    ///
    /// Value ranges are checked later, on the merged configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.mode {
            ExecutionMode::Participant => {
                if self.id.is_none() && self.config.is_none() {
                    anyhow::bail!("participant mode requires --id (or a config file)");
                }
                if !self.estimates.is_empty() {
                    anyhow::bail!("--estimates is only valid in simulate mode");
                }
            }
            ExecutionMode::Coordinator => {
                if self.id.is_some() || self.coordinator.is_some() {
                    anyhow::bail!("--id and --coordinator are only valid in participant mode");
                }
                if !self.estimates.is_empty() {
                    anyhow::bail!("--estimates is only valid in simulate mode");
                }
            }
            ExecutionMode::Simulate => {
                if self.id.is_some() || self.coordinator.is_some() || self.listen.is_some() {
                    anyhow::bail!("--id, --coordinator and --listen are not used in simulate mode");
                }
            }
        }

        if self.transport.is_some() && self.mode != ExecutionMode::Simulate {
            anyhow::bail!("--transport is only valid in simulate mode");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tempsync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_mode_is_simulate() {
        let cli = parse(&[]);
        assert_eq!(cli.mode, ExecutionMode::Simulate);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_participant_flags() {
        let cli = parse(&[
            "--mode", "participant", "--id", "2", "--initial", "-3.5", "--coordinator", "10.0.0.1:9000",
        ]);
        assert_eq!(cli.mode, ExecutionMode::Participant);
        assert_eq!(cli.id, Some(2));
        assert_eq!(cli.initial, Some(-3.5));
        assert_eq!(cli.coordinator.as_deref(), Some("10.0.0.1:9000"));
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_participant_requires_id() {
        let cli = parse(&["--mode", "participant"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_estimates_list() {
        let cli = parse(&["--estimates", "0,-10,20.5", "--initial", "50"]);
        assert_eq!(cli.estimates, vec![0.0, -10.0, 20.5]);
        assert_eq!(cli.initial, Some(50.0));
    }

    #[test]
    fn test_mode_specific_flags_rejected() {
        assert!(parse(&["--mode", "coordinator", "--id", "1"]).validate().is_err());
        assert!(parse(&["--mode", "coordinator", "--estimates", "1,2"]).validate().is_err());
        assert!(parse(&["--listen", "0.0.0.0:1"]).validate().is_err());
        assert!(parse(&["--mode", "coordinator", "--transport", "memory"]).validate().is_err());
    }
}
