//! Waiting for the cluster to reach a state
//!
//! A [`Poller`] checks a [`ReadinessTarget`] immediately and then on every
//! tick until it holds, the deadline passes, or the run is cancelled.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::kube::{ClusterClient, Deployment, ExecError, Pod};

/// A cluster state to wait for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessTarget {
    /// Every deployment in the namespace is available, and there are at least `min`
    DeploymentsAvailable { namespace: String, min: usize },
    NamespaceGone { namespace: String },
    /// Some pod matching `label` is ready
    PodReady { namespace: String, label: String },
    All(Vec<ReadinessTarget>),
}

impl ReadinessTarget {
    pub fn deployments(namespace: impl Into<String>) -> Self {
        ReadinessTarget::DeploymentsAvailable {
            namespace: namespace.into(),
            min: 1,
        }
    }

    pub fn namespace_gone(namespace: impl Into<String>) -> Self {
        ReadinessTarget::NamespaceGone {
            namespace: namespace.into(),
        }
    }

    pub fn pod_ready(namespace: impl Into<String>, label: impl Into<String>) -> Self {
        ReadinessTarget::PodReady {
            namespace: namespace.into(),
            label: label.into(),
        }
    }

    /// Leaf targets in evaluation order
    pub fn leaves(&self) -> Vec<&ReadinessTarget> {
        match self {
            ReadinessTarget::All(targets) => targets.iter().flat_map(|t| t.leaves()).collect(),
            leaf => vec![leaf],
        }
    }
}

impl fmt::Display for ReadinessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessTarget::DeploymentsAvailable { namespace, .. } => {
                write!(f, "deployments in {namespace} to become available")
            }
            ReadinessTarget::NamespaceGone { namespace } => {
                write!(f, "namespace {namespace} to be deleted")
            }
            ReadinessTarget::PodReady { namespace, label } => {
                write!(f, "pod {label} in {namespace} to become ready")
            }
            ReadinessTarget::All(targets) => {
                let parts: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
                f.write_str(&parts.join(" and "))
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("timed out waiting for {0}")]
    TimedOut(String),

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),
}

// ============================================================================
// SBIO: Pure predicates
// ============================================================================

/// All listed deployments available, and at least `min` of them listed
pub fn deployments_ready(deployments: &[Deployment], min: usize) -> bool {
    deployments.len() >= min.max(1) && deployments.iter().all(Deployment::is_available)
}

pub fn any_pod_ready(pods: &[Pod]) -> bool {
    pods.iter().any(Pod::is_ready)
}

/// Evaluate `target` once against the cluster
pub async fn check(client: &dyn ClusterClient, target: &ReadinessTarget) -> Result<bool, ExecError> {
    for leaf in target.leaves() {
        let holds = match leaf {
            ReadinessTarget::DeploymentsAvailable { namespace, min } => {
                deployments_ready(&client.list_deployments(namespace).await?, *min)
            }
            ReadinessTarget::NamespaceGone { namespace } => {
                !client.namespace_exists(namespace).await?
            }
            ReadinessTarget::PodReady { namespace, label } => {
                any_pod_ready(&client.list_pods(namespace, label).await?)
            }
            ReadinessTarget::All(_) => true,
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

// ============================================================================
// Poller
// ============================================================================

/// Polls a target under a shared deadline and cancellation token
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    deadline: Instant,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(interval: Duration, deadline: Instant, cancel: CancellationToken) -> Self {
        Self {
            interval,
            deadline,
            cancel,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait until `target` holds
    ///
    /// Cluster query errors count as "not yet" and are retried on the next tick.
    pub async fn wait(
        &self,
        client: &dyn ClusterClient,
        target: &ReadinessTarget,
    ) -> Result<(), PollError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = sleep_until(self.deadline) => {
                    return Err(PollError::TimedOut(target.to_string()));
                }
                _ = self.cancel.cancelled() => {
                    return Err(PollError::Cancelled(target.to_string()));
                }
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = sleep_until(self.deadline) => {
                    return Err(PollError::TimedOut(target.to_string()));
                }
                _ = self.cancel.cancelled() => {
                    return Err(PollError::Cancelled(target.to_string()));
                }
                result = check(client, target) => result,
            };

            match outcome {
                Ok(true) => {
                    debug!("Converged: {}", target);
                    return Ok(());
                }
                Ok(false) => trace!("Still waiting for {}", target),
                Err(e) => debug!("Readiness check for {} failed: {}", target, e),
            }
        }
    }
}
