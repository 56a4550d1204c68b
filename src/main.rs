//! tempsync CLI entry point

use anyhow::{Context, Result};
use tempsync::config::cli::{Cli, ExecutionMode};
use tempsync::config::{validator, Config, SimulationTransport};
use tempsync::distributed::{simulation, Coordinator, Participant};
use tempsync::output::{json, text};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();
    cli.validate()?;

    init_logging(&cli);

    // Build and validate configuration before touching the network
    let config = tempsync::config::toml::load_config(&cli)?;
    validator::validate_config(&config, cli.mode)
        .context("Configuration validation failed")?;

    if !cli.json {
        println!("tempsync v{}", env!("CARGO_PKG_VERSION"));
        println!();
        text::print_configuration(&config, cli.mode);
        println!();
    }

    if cli.dry_run {
        if !cli.json {
            println!("Dry run mode - configuration validated successfully");
        }
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    match cli.mode {
        ExecutionMode::Simulate => run_simulate(&runtime, &cli, &config),
        ExecutionMode::Coordinator => run_coordinator(&runtime, &cli, &config),
        ExecutionMode::Participant => run_participant(&runtime, &cli, &config),
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over `--log-level`; `--debug` raises the default to debug.
fn init_logging(cli: &Cli) {
    let default = if cli.debug { "debug" } else { cli.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Run a whole cluster in this process
fn run_simulate(runtime: &tokio::runtime::Runtime, cli: &Cli, config: &Config) -> Result<()> {
    let settings = config.simulation.settings();

    let report = runtime.block_on(async {
        match config.simulation.transport {
            SimulationTransport::Tcp => simulation::run_loopback(&settings).await,
            SimulationTransport::Memory => simulation::run_in_memory(&settings).await,
        }
    })
    .context("Simulation failed")?;

    if cli.json {
        json::print_json("simulate", &report)?;
    } else {
        text::print_simulation(&report);
    }

    if !report.is_unanimous() {
        anyhow::bail!("participants finished on different values");
    }
    Ok(())
}

/// Accept N participants and drive rounds to convergence
fn run_coordinator(runtime: &tokio::runtime::Runtime, cli: &Cli, config: &Config) -> Result<()> {
    let coordinator = Coordinator::new(
        config.coordinator.settings(),
        config.coordinator.listen.clone(),
    );

    let outcome = runtime.block_on(coordinator.run())
        .context("Coordinator failed")?;

    if cli.json {
        json::print_json("coordinator", &outcome)?;
    } else {
        text::print_outcome(&outcome);
    }
    Ok(())
}

/// Connect to the coordinator and converge one estimate
fn run_participant(runtime: &tokio::runtime::Runtime, cli: &Cli, config: &Config) -> Result<()> {
    let settings = config.participant.settings()?;
    let participant = Participant::new(settings);

    let outcome = runtime.block_on(participant.run())
        .context("Participant failed")?;

    if cli.json {
        json::print_json("participant", &outcome)?;
    } else {
        text::print_participant(&outcome);
    }
    Ok(())
}
