//! JSON output formatting
//!
//! Wraps any serializable outcome with the tool version, the host it ran on
//! and a completion timestamp.

use crate::Result;
use anyhow::Context;
use serde::Serialize;

/// Report envelope
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport<'a, T: Serialize> {
    pub tool: &'static str,
    pub version: &'static str,
    pub host: String,
    /// RFC 3339 timestamp
    pub completed_at: String,
    pub mode: &'static str,
    pub result: &'a T,
}

impl<'a, T: Serialize> JsonReport<'a, T> {
    pub fn new(mode: &'static str, result: &'a T) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            host: host_name(),
            completed_at: chrono::Utc::now().to_rfc3339(),
            mode,
            result,
        }
    }
}

/// Serialize a report as pretty-printed JSON
pub fn to_json<T: Serialize>(mode: &'static str, result: &T) -> Result<String> {
    serde_json::to_string_pretty(&JsonReport::new(mode, result))
        .context("Failed to serialize JSON report")
}

/// Print a report to stdout
pub fn print_json<T: Serialize>(mode: &'static str, result: &T) -> Result<()> {
    println!("{}", to_json(mode, result)?);
    Ok(())
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
