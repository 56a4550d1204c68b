//! Human-readable text output

use crate::config::cli::ExecutionMode;
use crate::config::Config;
use crate::distributed::{Outcome, ParticipantOutcome, SimulationReport};
use std::fmt::Write;

/// Print the effective configuration for `mode`
pub fn print_configuration(config: &Config, mode: ExecutionMode) {
    print!("{}", render_configuration(config, mode));
}

pub fn render_configuration(config: &Config, mode: ExecutionMode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Configuration:");
    match mode {
        ExecutionMode::Coordinator => {
            let c = &config.coordinator;
            let _ = writeln!(out, "  Mode:              coordinator");
            let _ = writeln!(out, "  Listen:            {}", c.listen);
            let _ = writeln!(out, "  Participants:      {}", c.participants);
            let _ = writeln!(out, "  Initial aggregate: {:.6}", c.initial_aggregate);
            let _ = writeln!(out, "  Tolerance:         {:e}", c.tolerance);
        }
        ExecutionMode::Participant => {
            let p = &config.participant;
            let _ = writeln!(out, "  Mode:              participant");
            match p.id {
                Some(id) => {
                    let _ = writeln!(out, "  Id:                {} of {}", id, p.participants);
                }
                None => {
                    let _ = writeln!(out, "  Id:                (unset)");
                }
            }
            let _ = writeln!(out, "  Coordinator:       {}", p.coordinator);
            let _ = writeln!(out, "  Initial estimate:  {:.6}", p.initial_estimate);
        }
        ExecutionMode::Simulate => {
            let s = &config.simulation;
            let _ = writeln!(out, "  Mode:              simulate ({:?})", s.transport);
            let _ = writeln!(out, "  Participants:      {}", s.estimates.len());
            let _ = writeln!(out, "  Initial aggregate: {:.6}", s.initial_aggregate);
            let _ = writeln!(out, "  Initial estimates: {}", format_values(&s.estimates));
            let _ = writeln!(out, "  Tolerance:         {:e}", s.tolerance);
        }
    }
    out
}

/// Print coordinator results to console
pub fn print_outcome(outcome: &Outcome) {
    print!("{}", render_outcome(outcome));
}

/// Round-by-round table followed by the converged aggregate
pub fn render_outcome(outcome: &Outcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "═══════════════════════════════════════════════════════════");
    let _ = writeln!(out, "                    CONVERGENCE RESULTS");
    let _ = writeln!(out, "═══════════════════════════════════════════════════════════");
    let _ = writeln!(out);
    let _ = writeln!(out, "{:>6}  {:>14}  {:>14}  values", "round", "max delta", "aggregate");

    for record in &outcome.history {
        let delta = match record.max_delta {
            Some(delta) => format!("{:.6}", delta),
            None => "-".to_string(),
        };
        let marker = if record.terminal { " (final)" } else { "" };
        let _ = writeln!(
            out,
            "{:>6}  {:>14}  {:>14.6}  {}{}",
            record.round,
            delta,
            record.aggregate,
            format_values(&record.values),
            marker
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Participants:    {}", outcome.participants);
    let _ = writeln!(out, "Rounds:          {}", outcome.rounds);
    let _ = writeln!(out, "Final aggregate: {:.6}", outcome.aggregate);
    out
}

/// Print participant results to console
pub fn print_participant(outcome: &ParticipantOutcome) {
    print!("{}", render_participant(outcome));
}

pub fn render_participant(outcome: &ParticipantOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Participant {}:", outcome.id);
    let _ = writeln!(out, "  Rounds:         {}", outcome.rounds);
    let _ = writeln!(out, "  Last estimate:  {:.6}", outcome.estimate);
    let _ = writeln!(out, "  Final value:    {:.6}", outcome.final_value);
    out
}

/// Print simulation results to console
pub fn print_simulation(report: &SimulationReport) {
    print!("{}", render_simulation(report));
}

pub fn render_simulation(report: &SimulationReport) -> String {
    let mut out = render_outcome(&report.coordinator);
    let _ = writeln!(out);
    for participant in &report.participants {
        out.push_str(&render_participant(participant));
    }
    let verdict = if report.is_unanimous() {
        "all participants agree"
    } else {
        "participants DISAGREE"
    };
    let _ = writeln!(out);
    let _ = writeln!(out, "Result: {}", verdict);
    out
}

fn format_values(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{:.6}", v)).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::RoundRecord;

    fn outcome() -> Outcome {
        Outcome {
            participants: 2,
            rounds: 1,
            aggregate: 5.0,
            final_values: vec![5.0, 5.0],
            history: vec![
                RoundRecord {
                    round: 0,
                    values: vec![4.0, 6.0],
                    max_delta: None,
                    aggregate: 5.0,
                    terminal: false,
                },
                RoundRecord {
                    round: 1,
                    values: vec![5.0, 5.0],
                    max_delta: Some(0.0005),
                    aggregate: 5.0,
                    terminal: true,
                },
            ],
        }
    }

    #[test]
    fn test_render_outcome() {
        let text = render_outcome(&outcome());
        assert!(text.contains("Rounds:          1"));
        assert!(text.contains("Final aggregate: 5.000000"));
        assert!(text.contains("[4.000000, 6.000000]"));
        assert!(text.contains("0.000500"));
        assert!(text.contains("(final)"));
    }

    #[test]
    fn test_render_simulation_verdict() {
        let participant = |id| ParticipantOutcome { id, final_value: 5.0, estimate: 5.0, rounds: 1 };
        let mut report = SimulationReport {
            coordinator: outcome(),
            participants: vec![participant(1), participant(2)],
        };
        assert!(render_simulation(&report).contains("all participants agree"));

        report.participants[1].final_value = 4.0;
        assert!(render_simulation(&report).contains("DISAGREE"));
    }

    #[test]
    fn test_render_configuration() {
        let mut config = Config::default();
        config.participant.id = Some(3);
        let text = render_configuration(&config, ExecutionMode::Participant);
        assert!(text.contains("3 of 4"));
        assert!(text.contains("127.0.0.1:9999"));
    }
}
