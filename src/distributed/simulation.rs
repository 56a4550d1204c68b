//! In-process cluster
//!
//! Runs one coordinator and N participants inside a single process, either
//! over loopback TCP (exercises the real network path) or over in-memory
//! duplex pipes (fully deterministic slot assignment, no sockets).

use super::coordinator::{self, CoordinatorEngine, CoordinatorSettings, Outcome};
use super::error::SyncError;
use super::participant::{Participant, ParticipantEngine, ParticipantOutcome, ParticipantSettings};
use super::protocol::MESSAGE_LEN;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

/// Cluster parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub initial_aggregate: f64,

    /// One initial estimate per participant; participant i gets id i + 1
    pub estimates: Vec<f64>,

    pub tolerance: f64,
}

impl SimulationSettings {
    pub fn coordinator(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            participants: self.estimates.len(),
            initial_aggregate: self.initial_aggregate,
            tolerance: self.tolerance,
        }
    }
}

/// Outcome of every role in the cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub coordinator: Outcome,

    /// In id order
    pub participants: Vec<ParticipantOutcome>,
}

impl SimulationReport {
    /// Whether every participant ended on the coordinator's aggregate
    pub fn is_unanimous(&self) -> bool {
        self.participants
            .iter()
            .all(|p| p.final_value.to_bits() == self.coordinator.aggregate.to_bits())
    }
}

type ParticipantHandle = JoinHandle<Result<ParticipantOutcome, SyncError>>;

/// Run the cluster over in-memory pipes
///
/// Slot i is wired to participant i + 1.
pub async fn run_in_memory(settings: &SimulationSettings) -> Result<SimulationReport, SyncError> {
    let mut engine = CoordinatorEngine::new(settings.coordinator());
    let mut handles: Vec<(i32, ParticipantHandle)> = Vec::with_capacity(settings.estimates.len());

    for (index, estimate) in settings.estimates.iter().copied().enumerate() {
        let id = index as i32 + 1;
        let (coordinator_end, participant_end) = tokio::io::duplex(MESSAGE_LEN * 4);
        engine.admit(coordinator_end, format!("memory:{}", id))?;

        let mut participant = ParticipantEngine::new(id, estimate, participant_end);
        handles.push((id, tokio::spawn(async move { participant.run().await })));
    }

    let outcome = engine.run().await?;
    finish(outcome, handles).await
}

/// Run the cluster over loopback TCP
///
/// Participants connect one at a time, so acceptance order follows id order.
pub async fn run_loopback(settings: &SimulationSettings) -> Result<SimulationReport, SyncError> {
    let addr = "127.0.0.1:0";
    let listener = TcpListener::bind(addr).await.map_err(|source| SyncError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    let local = listener.local_addr().map_err(|source| SyncError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    info!(addr = %local, participants = settings.estimates.len(), "simulation coordinator listening");

    drive_loopback(settings, listener, local.to_string()).await
}

/// Serve on `listener` and connect every participant to `coordinator_addr`
///
/// If a participant cannot connect, the coordinator task and the
/// participants already running are aborted before the error is returned.
async fn drive_loopback(
    settings: &SimulationSettings,
    listener: TcpListener,
    coordinator_addr: String,
) -> Result<SimulationReport, SyncError> {
    let server = tokio::spawn(coordinator::serve(settings.coordinator(), listener));

    let mut handles: Vec<(i32, ParticipantHandle)> = Vec::with_capacity(settings.estimates.len());
    for (index, estimate) in settings.estimates.iter().copied().enumerate() {
        let id = index as i32 + 1;
        let participant = Participant::new(ParticipantSettings {
            id,
            initial_estimate: estimate,
            coordinator: coordinator_addr.clone(),
        });
        match participant.connect().await {
            Ok(mut engine) => handles.push((id, tokio::spawn(async move { engine.run().await }))),
            Err(err) => {
                server.abort();
                for (_, handle) in &handles {
                    handle.abort();
                }
                return Err(err);
            }
        }
    }

    let outcome = match server.await {
        Ok(result) => result?,
        Err(source) => return Err(SyncError::CoordinatorTask { source }),
    };
    finish(outcome, handles).await
}

async fn finish(
    coordinator: Outcome,
    handles: Vec<(i32, ParticipantHandle)>,
) -> Result<SimulationReport, SyncError> {
    let mut participants = Vec::with_capacity(handles.len());
    for (id, handle) in handles {
        let outcome = handle
            .await
            .map_err(|source| SyncError::ParticipantTask { id, source })??;
        participants.push(outcome);
    }

    Ok(SimulationReport { coordinator, participants })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> SimulationSettings {
        SimulationSettings {
            initial_aggregate: 50.0,
            estimates: vec![0.0, 10.0, 20.0, 30.0],
            tolerance: 1e-3,
        }
    }

    #[tokio::test]
    async fn test_reference_scenario_in_memory() {
        let report = run_in_memory(&reference()).await.unwrap();
        let history = &report.coordinator.history;

        // Round 0: (2·50 + 0 + 10 + 20 + 30) / 6
        assert_eq!(history[0].values, vec![0.0, 10.0, 20.0, 30.0]);
        assert!((history[0].aggregate - 26.666667).abs() < 1e-6);

        // Round 1 reports are each participant's blend toward 26.67
        let expected = [10.666667, 16.666667, 22.666667, 28.666667];
        for (value, want) in history[1].values.iter().zip(expected) {
            assert!((value - want).abs() < 1e-6, "{} != {}", value, want);
        }

        let last = history.last().unwrap();
        assert!(last.terminal);
        assert!(last.max_delta.unwrap() < 1e-3);
        assert_eq!(history.len() as u64, report.coordinator.rounds + 1);

        assert_eq!(report.participants.len(), 4);
        assert!(report.is_unanimous());
        for p in &report.participants {
            assert_eq!(p.rounds, report.coordinator.rounds);
        }
    }

    #[tokio::test]
    async fn test_rounds_are_deterministic() {
        let first = run_in_memory(&reference()).await.unwrap();
        let second = run_in_memory(&reference()).await.unwrap();

        assert_eq!(first.coordinator.rounds, second.coordinator.rounds);
        assert_eq!(
            first.coordinator.aggregate.to_bits(),
            second.coordinator.aggregate.to_bits()
        );
    }

    #[tokio::test]
    async fn test_deltas_shrink_toward_tolerance() {
        let report = run_in_memory(&reference()).await.unwrap();
        let deltas: Vec<f64> = report
            .coordinator
            .history
            .iter()
            .filter_map(|r| r.max_delta)
            .collect();

        assert!(deltas.len() >= 2);
        assert!(deltas.last().unwrap() < deltas.first().unwrap());
    }

    #[tokio::test]
    async fn test_already_converged_cluster() {
        let settings = SimulationSettings {
            initial_aggregate: 5.0,
            estimates: vec![5.0, 5.0],
            tolerance: 1e-3,
        };
        let report = run_in_memory(&settings).await.unwrap();

        // First round can never converge: there is no previous value yet
        assert_eq!(report.coordinator.rounds, 1);
        assert_eq!(report.coordinator.aggregate, 5.0);
        assert!(report.is_unanimous());
    }

    #[tokio::test]
    async fn test_failed_connect_releases_coordinator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let served = listener.local_addr().unwrap();

        // Reserve a port, then free it so no participant can connect
        let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let err = drive_loopback(&reference(), listener, dead_addr.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Connect { .. }));

        // The aborted coordinator task drops its listener
        let mut refused = false;
        for _ in 0..100 {
            match tokio::net::TcpStream::connect(served).await {
                Err(_) => {
                    refused = true;
                    break;
                }
                Ok(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
        assert!(refused);
    }

    #[tokio::test]
    async fn test_reference_scenario_over_loopback() {
        let tcp = run_loopback(&reference()).await.unwrap();
        let memory = run_in_memory(&reference()).await.unwrap();

        assert!(tcp.is_unanimous());
        assert_eq!(tcp.coordinator.rounds, memory.coordinator.rounds);
        assert!((tcp.coordinator.aggregate - memory.coordinator.aggregate).abs() < 1e-9);
    }
}
