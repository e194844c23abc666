//! Seams to the cluster: read-only queries and mutating commands
//!
//! [`ClusterClient`] and [`CommandRunner`] are the only ways the rest of the
//! crate reaches Kubernetes. [`Kubectl`] implements both by shelling out.

mod kubectl;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use kubectl::Kubectl;

/// Failure of a cluster query or command, classified at the boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("`{command}` failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("failed to run `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("unexpected output from `{command}`: {message}")]
    Parse { command: String, message: String },
}

impl ExecError {
    /// Classify a failed command from its stderr
    pub fn classify(command: &str, stderr: &str) -> Self {
        let lowered = stderr.to_lowercase();
        let message = stderr.trim().to_string();
        if lowered.contains("command not found") {
            // a missing binary says nothing about cluster objects
            ExecError::Failed {
                command: command.to_string(),
                stderr: message,
            }
        } else if lowered.contains("already exists") || lowered.contains("still in use") {
            // dapr init reports an existing control plane as "still in use"
            ExecError::AlreadyExists(message)
        } else if lowered.contains("notfound")
            || lowered.contains("not found")
            || lowered.contains("the server doesn't have a resource type")
        {
            ExecError::NotFound(message)
        } else {
            ExecError::Failed {
                command: command.to_string(),
                stderr: message,
            }
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ExecError::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExecError::NotFound(_))
    }
}

// ============================================================================
// Object shapes (the subset of the Kubernetes schema we read)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

impl Condition {
    pub fn new(kind: impl Into<String>, status: bool) -> Self {
        Self {
            kind: kind.into(),
            status: if status { "True" } else { "False" }.to_string(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl WorkloadStatus {
    fn has(&self, kind: &str) -> bool {
        self.conditions.iter().any(|c| c.kind == kind && c.is_true())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: WorkloadStatus,
}

impl Deployment {
    pub fn new(name: impl Into<String>, available: bool) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            status: WorkloadStatus {
                conditions: vec![Condition::new("Available", available)],
            },
        }
    }

    pub fn is_available(&self) -> bool {
        self.status.has("Available")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: WorkloadStatus,
}

impl Pod {
    pub fn new(name: impl Into<String>, ready: bool) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            status: WorkloadStatus {
                conditions: vec![Condition::new("Ready", ready)],
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status.has("Ready")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub active: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: JobStatus,
}

impl Job {
    pub fn new(name: impl Into<String>, active: u32) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            status: JobStatus { active },
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.active >= 1
    }
}

/// `kubectl get ... -o json` list wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Captured output of an imperative command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

// ============================================================================
// Traits
// ============================================================================

/// Read-only cluster queries
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// The API server's `gitVersion`, e.g. `v1.20.4`
    async fn server_version(&self) -> Result<String, ExecError>;

    async fn current_context(&self) -> Result<String, ExecError>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ExecError>;

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ExecError>;

    async fn list_pods(&self, namespace: &str, label: &str) -> Result<Vec<Pod>, ExecError>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ExecError>;

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ExecError>;
}

/// Mutating commands against the cluster
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn apply(&self, reference: &str, wait: bool) -> Result<(), ExecError>;

    async fn create(&self, reference: &str) -> Result<(), ExecError>;

    async fn delete(&self, reference: &str, wait: bool) -> Result<(), ExecError>;

    async fn delete_namespace(&self, namespace: &str) -> Result<(), ExecError>;

    async fn patch_config_map(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ExecError>;

    /// Run an imperative shell command
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecError>;
}
