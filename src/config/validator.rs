//! Configuration validation
//!
//! Fails fast on anything the engines cannot run with.

use super::cli::ExecutionMode;
use super::*;
use anyhow::{Context, Result};

/// Validate the table used by `mode`
pub fn validate_config(config: &Config, mode: ExecutionMode) -> Result<()> {
    match mode {
        ExecutionMode::Coordinator => validate_coordinator(&config.coordinator)
            .context("Invalid coordinator configuration"),
        ExecutionMode::Participant => validate_participant(&config.participant)
            .context("Invalid participant configuration"),
        ExecutionMode::Simulate => validate_simulation(&config.simulation)
            .context("Invalid simulation configuration"),
    }
}

/// Validate coordinator configuration
pub fn validate_coordinator(config: &CoordinatorConfig) -> Result<()> {
    validate_participant_count(config.participants)?;
    validate_finite("initial_aggregate", config.initial_aggregate)?;
    validate_tolerance(config.tolerance)?;
    validate_address(&config.listen).context("Invalid listen address")?;
    Ok(())
}

/// Validate participant configuration
pub fn validate_participant(config: &ParticipantConfig) -> Result<()> {
    validate_participant_count(config.participants)?;

    let id = match config.id {
        Some(id) => id,
        None => anyhow::bail!("participant id is required"),
    };
    if id < 1 || id as i64 > config.participants as i64 {
        anyhow::bail!(
            "participant id must be between 1 and {}, got {}",
            config.participants,
            id
        );
    }

    validate_finite("initial_estimate", config.initial_estimate)?;
    validate_address(&config.coordinator).context("Invalid coordinator address")?;
    Ok(())
}

/// Validate simulation configuration
pub fn validate_simulation(config: &SimulationConfig) -> Result<()> {
    if config.estimates.is_empty() {
        anyhow::bail!("simulation needs at least one initial estimate");
    }
    validate_participant_count(config.estimates.len())?;

    if let Some(n) = config.participants {
        if n != config.estimates.len() {
            anyhow::bail!(
                "participants ({}) does not match the number of estimates ({})",
                n,
                config.estimates.len()
            );
        }
    }

    validate_finite("initial_aggregate", config.initial_aggregate)?;
    for (i, estimate) in config.estimates.iter().enumerate() {
        validate_finite(&format!("estimates[{}]", i), *estimate)?;
    }
    validate_tolerance(config.tolerance)?;
    Ok(())
}

/// Validate a `host:port` address
///
/// IPv6 hosts must be bracketed (`[::1]:9999`).
pub fn validate_address(addr: &str) -> Result<()> {
    let (host, port) = match addr.rsplit_once(':') {
        Some(parts) => parts,
        None => anyhow::bail!("address must be host:port, got '{}'", addr),
    };

    if host.is_empty() {
        anyhow::bail!("address has no host: '{}'", addr);
    }
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        anyhow::bail!("IPv6 address must be bracketed: '{}'", addr);
    }

    port.parse::<u16>()
        .with_context(|| format!("invalid port in '{}'", addr))?;

    Ok(())
}

fn validate_participant_count(n: usize) -> Result<()> {
    if n == 0 {
        anyhow::bail!("participants must be at least 1");
    }
    if n > i32::MAX as usize {
        anyhow::bail!("participants must fit a 32-bit id, got {}", n);
    }
    Ok(())
}

fn validate_tolerance(tolerance: f64) -> Result<()> {
    if !tolerance.is_finite() || tolerance <= 0.0 {
        anyhow::bail!("tolerance must be a positive finite number, got {}", tolerance);
    }
    Ok(())
}

fn validate_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        anyhow::bail!("{} must be finite, got {}", name, value);
    }
    Ok(())
}
