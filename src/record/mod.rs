//! The installation record: which component versions are on a cluster
//!
//! A [`Record`] is the persisted map of record key to version. A
//! [`RecordPatch`] is what one run changed; merging a patch overwrites the
//! keys it sets, deletes the keys it tombstones and leaves the rest alone.

mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::Component;

pub use store::RecordStore;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse record: {0}")]
    Parse(String),

    #[error("Failed to serialize record: {0}")]
    Serialize(String),
}

/// Persisted component versions for one cluster context
///
/// Keys that are not known components are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    entries: BTreeMap<String, String>,
}

impl Record {
    pub fn version_of(&self, component: Component) -> Option<&str> {
        self.entries
            .get(component.record_key())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn contains(&self, component: Component) -> bool {
        self.version_of(component).is_some()
    }

    /// Known components with a recorded version
    pub fn installed(&self) -> BTreeMap<Component, String> {
        self.entries
            .iter()
            .filter(|(_, version)| !version.is_empty())
            .filter_map(|(key, version)| {
                Component::from_record_key(key).map(|c| (c, version.clone()))
            })
            .collect()
    }

    /// Raw value for any key, known component or not
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `patch` into this record
    pub fn apply(&mut self, patch: &RecordPatch) {
        for (component, change) in &patch.changes {
            match change {
                Some(version) => {
                    self.entries
                        .insert(component.record_key().to_string(), version.clone());
                }
                None => {
                    self.entries.remove(component.record_key());
                }
            }
        }
    }
}

/// Changes made by one run: a version per installed component, `None` for
/// each removed one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    changes: BTreeMap<Component, Option<String>>,
}

impl RecordPatch {
    pub fn installed(&mut self, component: Component, version: impl Into<String>) {
        self.changes.insert(component, Some(version.into()));
    }

    pub fn removed(&mut self, component: Component) {
        self.changes.insert(component, None);
    }

    pub fn extend(&mut self, other: RecordPatch) {
        self.changes.extend(other.changes);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Parse a record from YAML; empty documents and empty values are absent
pub fn parse_record(content: &str) -> Result<Record, RecordError> {
    if content.trim().is_empty() {
        return Ok(Record::default());
    }
    let mut record: Record =
        serde_yaml::from_str(content).map_err(|e| RecordError::Parse(e.to_string()))?;
    record.entries.retain(|_, v| !v.is_empty());
    Ok(record)
}

pub fn serialize_record(record: &Record) -> Result<String, RecordError> {
    serde_yaml::to_string(record).map_err(|e| RecordError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let yaml = r#"
openFunction: 0.4.0
knativeServing: 1.0.1
kourier: ""
istio: 1.12.0
"#;
        let record = parse_record(yaml).unwrap();
        assert_eq!(record.version_of(Component::OpenFunction), Some("0.4.0"));
        assert_eq!(record.version_of(Component::KnativeServing), Some("1.0.1"));
        assert!(!record.contains(Component::Kourier));
        assert_eq!(record.get("istio"), Some("1.12.0"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_record("").unwrap().is_empty());
        assert!(parse_record("\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid() {
        let result = parse_record("- not\n- a map\n");
        assert!(matches!(result, Err(RecordError::Parse(_))));
    }

    #[test]
    fn test_installed_lists_known_components() {
        let record = parse_record("keda: 2.4.0\ndapr: 1.5.1\nistio: 1.12.0\n").unwrap();
        let installed = record.installed();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[&Component::Keda], "2.4.0");
    }

    #[test]
    fn test_merge_law() {
        let mut record =
            parse_record("keda: 2.4.0\ndapr: 1.5.1\ningress: 1.5.4\nistio: 1.12.0\n").unwrap();

        let mut patch = RecordPatch::default();
        patch.installed(Component::Keda, "2.5.0");
        patch.removed(Component::Dapr);
        patch.installed(Component::OpenFunction, "0.4.0");
        record.apply(&patch);

        // set keys overwrite
        assert_eq!(record.version_of(Component::Keda), Some("2.5.0"));
        assert_eq!(record.version_of(Component::OpenFunction), Some("0.4.0"));
        // tombstones delete
        assert!(!record.contains(Component::Dapr));
        // untouched keys survive
        assert_eq!(record.version_of(Component::IngressNginx), Some("1.5.4"));
        assert_eq!(record.get("istio"), Some("1.12.0"));
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let mut record = parse_record("keda: 2.4.0\n").unwrap();
        let before = record.clone();
        record.apply(&RecordPatch::default());
        assert_eq!(record, before);
    }

    #[test]
    fn test_patch_extend_later_wins() {
        let mut first = RecordPatch::default();
        first.installed(Component::Keda, "2.4.0");
        let mut second = RecordPatch::default();
        second.removed(Component::Keda);
        first.extend(second);

        let mut record = parse_record("keda: 2.3.0\n").unwrap();
        record.apply(&first);
        assert!(!record.contains(Component::Keda));
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut record = Record::default();
        let mut patch = RecordPatch::default();
        patch.installed(Component::TektonPipelines, "0.30.0");
        record.apply(&patch);

        let yaml = serialize_record(&record).unwrap();
        assert!(yaml.contains("tektonPipelines: 0.30.0"));
        assert_eq!(parse_record(&yaml).unwrap(), record);
    }
}
