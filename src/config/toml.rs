//! TOML configuration file parsing

use super::cli::{Cli, ExecutionMode};
use super::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
///
/// `--initial` and `--tolerance` apply to the table of the selected mode.
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Config {
    if let Some(ref listen) = cli.listen {
        config.coordinator.listen = listen.clone();
    }
    if let Some(n) = cli.participants {
        config.coordinator.participants = n;
        config.participant.participants = n;
        config.simulation.participants = Some(n);
    }
    if let Some(id) = cli.id {
        config.participant.id = Some(id);
    }
    if let Some(ref addr) = cli.coordinator {
        config.participant.coordinator = addr.clone();
    }
    if !cli.estimates.is_empty() {
        config.simulation.estimates = cli.estimates.clone();
    }
    if let Some(transport) = cli.transport {
        config.simulation.transport = transport;
    }

    match cli.mode {
        ExecutionMode::Coordinator => {
            if let Some(initial) = cli.initial {
                config.coordinator.initial_aggregate = initial;
            }
            if let Some(tolerance) = cli.tolerance {
                config.coordinator.tolerance = tolerance;
            }
        }
        ExecutionMode::Participant => {
            if let Some(initial) = cli.initial {
                config.participant.initial_estimate = initial;
            }
        }
        ExecutionMode::Simulate => {
            if let Some(initial) = cli.initial {
                config.simulation.initial_aggregate = initial;
            }
            if let Some(tolerance) = cli.tolerance {
                config.simulation.tolerance = tolerance;
            }
        }
    }

    config
}

/// Build the effective configuration: file (if any) overlaid with CLI flags
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    Ok(merge_cli_with_config(cli, base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tempsync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_full_file() {
        let config = parse_toml_string(
            r#"
            [coordinator]
            listen = "127.0.0.1:7000"
            participants = 3
            initial_aggregate = 50.0
            tolerance = 0.01

            [participant]
            id = 2
            initial_estimate = 10.0
            coordinator = "10.0.0.5:7000"
            participants = 3

            [simulation]
            initial_aggregate = 50.0
            estimates = [0.0, 10.0, 20.0, 30.0]
            transport = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.coordinator.listen, "127.0.0.1:7000");
        assert_eq!(config.coordinator.participants, 3);
        assert_eq!(config.coordinator.tolerance, 0.01);
        assert_eq!(config.participant.id, Some(2));
        assert_eq!(config.participant.coordinator, "10.0.0.5:7000");
        assert_eq!(config.simulation.estimates.len(), 4);
        assert_eq!(config.simulation.transport, SimulationTransport::Memory);
        assert_eq!(config.simulation.tolerance, 1e-3);
    }

    #[test]
    fn test_missing_tables_use_defaults() {
        let config = parse_toml_string("[participant]\nid = 1\n").unwrap();
        assert_eq!(config.coordinator, CoordinatorConfig::default());
        assert_eq!(config.participant.id, Some(1));
        assert_eq!(config.participant.participants, 4);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(parse_toml_string("[coordinator]\nparticipants = \"four\"\n").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[coordinator]\nparticipants = 3\ninitial_aggregate = 1.0").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = parse(&["--mode", "coordinator", "--config", &path, "--initial", "50", "-n", "4"]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.coordinator.participants, 4);
        assert_eq!(config.coordinator.initial_aggregate, 50.0);
    }

    #[test]
    fn test_initial_follows_mode() {
        let cli = parse(&["--mode", "participant", "--id", "1", "--initial", "7"]);
        let config = merge_cli_with_config(&cli, Config::default());
        assert_eq!(config.participant.initial_estimate, 7.0);
        assert_eq!(config.coordinator.initial_aggregate, 0.0);

        let cli = parse(&["--initial", "7", "--tolerance", "0.5"]);
        let config = merge_cli_with_config(&cli, Config::default());
        assert_eq!(config.simulation.initial_aggregate, 7.0);
        assert_eq!(config.simulation.tolerance, 0.5);
        assert_eq!(config.coordinator.tolerance, 1e-3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let cli = parse(&["--config", "/nonexistent/tempsync.toml"]);
        assert!(load_config(&cli).is_err());
    }
}
