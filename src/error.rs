//! Top-level error type for install/uninstall runs
//!
//! Module errors ([`VersionError`], [`ExecError`], [`PollError`], [`RecordError`])
//! convert into [`Error`], which carries the kinds the CLI reports to the user.

use thiserror::Error;

use crate::components::version::VersionError;
use crate::components::Component;
use crate::convergence::PollError;
use crate::kube::ExecError;
use crate::record::RecordError;

/// Errors surfaced by an orchestrator run
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("Version resolution failed: {0}")]
    VersionResolution(#[from] VersionError),

    #[error("Failed to {action} {component} ({reference}): {source}")]
    ManifestApply {
        component: Component,
        action: &'static str,
        reference: String,
        #[source]
        source: ExecError,
    },

    #[error("Timed out waiting for {component}: {target}")]
    ConvergenceTimeout { component: Component, target: String },

    #[error("Cancelled while processing {0}")]
    Cancelled(Component),

    #[error("Installation record error: {0}")]
    RecordIo(#[from] RecordError),

    #[error("Cluster query failed: {0}")]
    Cluster(#[source] ExecError),

    #[error("Failed to look up the latest release: {0}")]
    Release(String),

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl Error {
    /// Map a poller outcome for `component` into an orchestrator error
    pub fn from_poll(component: Component, err: PollError) -> Self {
        match err {
            PollError::TimedOut(target) => Error::ConvergenceTimeout { component, target },
            PollError::Cancelled(_) => Error::Cancelled(component),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) => 2,
            _ => 1,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_errors_map_to_distinct_kinds() {
        let timeout = Error::from_poll(
            Component::Keda,
            PollError::TimedOut("deployments in keda".to_string()),
        );
        assert!(matches!(timeout, Error::ConvergenceTimeout { .. }));

        let cancelled = Error::from_poll(
            Component::Keda,
            PollError::Cancelled("deployments in keda".to_string()),
        );
        assert!(cancelled.is_cancelled());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Usage("bad flag".to_string()).exit_code(), 2);
        assert_eq!(Error::Cancelled(Component::Dapr).exit_code(), 1);
    }

    #[test]
    fn test_manifest_error_message() {
        let err = Error::ManifestApply {
            component: Component::Keda,
            action: "apply",
            reference: "keda.yaml".to_string(),
            source: ExecError::Failed {
                command: "kubectl apply -f keda.yaml".to_string(),
                stderr: "connection refused".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("apply"));
        assert!(msg.contains("Keda"));
        assert!(msg.contains("connection refused"));
    }
}
