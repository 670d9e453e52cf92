//! Typed error hierarchy for the bastion orchestrator.
//!
//! Three enums cover the three subsystems:
//! - `StartError` — rejected deployment start requests
//! - `RunnerError` — child-process supervision failures
//! - `InventoryError` — opaque Prism Central collaborator failures

use thiserror::Error;

/// Errors raised when a deployment start request is rejected.
///
/// All variants occur before any process is spawned and leave the run state
/// untouched.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("deployment already running")]
    AlreadyRunning,

    #[error("unknown phase label: {0}")]
    UnknownPhase(String),
}

/// Errors from the process runner.
///
/// A non-zero exit code is *not* an error here — it is returned as data for
/// the orchestrator to interpret. These variants cover the cases where the
/// child could not be supervised at all.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("step has an empty command")]
    EmptyCommand,

    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read process output: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to wait for process exit: {0}")]
    Wait(#[source] std::io::Error),
}

/// A single opaque failure from the inventory client.
///
/// Transport, TLS, authentication, and API-status failures all collapse into
/// this — the caller only relays the message, it never retries.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InventoryError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_already_running_message() {
        let err = StartError::AlreadyRunning;
        assert_eq!(err.to_string(), "deployment already running");
    }

    #[test]
    fn start_error_unknown_phase_carries_label() {
        let err = StartError::UnknownPhase("Paint the shed".to_string());
        assert!(err.to_string().contains("Paint the shed"));
    }

    #[test]
    fn runner_error_spawn_is_distinct_from_exit_codes() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = RunnerError::Spawn {
            command: "/missing/script.sh".to_string(),
            source: io_err,
        };
        match &err {
            RunnerError::Spawn { command, source } => {
                assert_eq!(command, "/missing/script.sh");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected Spawn variant"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StartError::AlreadyRunning);
        assert_std_error(&RunnerError::EmptyCommand);
        assert_std_error(&InventoryError("connection refused".into()));
    }
}
