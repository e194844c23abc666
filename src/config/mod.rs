use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Interval between readiness checks while waiting for a component
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Overall deadline for one install or uninstall run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Directory name under the user's home that holds installation records
pub const RECORD_DIR_NAME: &str = ".ofn";

/// Default record directory: ~/.ofn
pub fn default_record_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(RECORD_DIR_NAME)
}

/// Expand a leading `~` and environment references in a user-supplied path
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

/// Runtime settings shared by every run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where installation records are kept
    pub record_dir: PathBuf,
    /// Readiness poll interval
    pub poll_interval: Duration,
    /// kubectl binary to invoke
    pub kubectl: String,
    /// Shell used for imperative commands
    pub shell: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            record_dir: default_record_dir(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            kubectl: "kubectl".to_string(),
            shell: "/bin/bash".to_string(),
        }
    }
}

impl Settings {
    pub fn with_record_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.record_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_kubectl(mut self, binary: impl Into<String>) -> Self {
        self.kubectl = binary.into();
        self
    }
}

// ============================================================================
// Environment overrides
// ============================================================================

/// Environment variables consulted for version and manifest overrides
pub const OVERRIDE_VARS: &[&str] = &[
    "DAPR_VERSION",
    "KEDA_VERSION",
    "KEDA_YAML",
    "KNATIVE_SERVING_VERSION",
    "KNATIVE_SERVING_CRD_YAML",
    "KNATIVE_SERVING_CORE_YAML",
    "KOURIER_VERSION",
    "KOURIER_YAML",
    "DEFAULT_DOMAIN_VERSION",
    "DEFAULT_DOMAIN_YAML",
    "TEKTON_PIPELINES_VERSION",
    "TEKTON_PIPELINES_YAML",
    "SHIPWRIGHT_VERSION",
    "SHIPWRIGHT_YAML",
    "CERT_MANAGER_VERSION",
    "CERT_MANAGER_YAML",
    "INGRESS_NGINX_VERSION",
    "INGRESS_NGINX_YAML",
    "OPENFUNCTION_YAML",
];

/// Snapshot of the override variables, taken once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    vars: BTreeMap<String, String>,
}

impl Overrides {
    /// Read every known override variable from the process environment
    pub fn from_env() -> Self {
        let vars = OVERRIDE_VARS
            .iter()
            .filter_map(|key| {
                std::env::var(key)
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (key.to_string(), v))
            })
            .collect();
        Self { vars }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_dir() {
        let path = default_record_dir();
        assert!(path.ends_with(".ofn"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.kubectl, "kubectl");
    }

    #[test]
    fn test_settings_builders() {
        let settings = Settings::default()
            .with_record_dir("/tmp/records")
            .with_poll_interval(Duration::from_millis(10))
            .with_kubectl("/usr/local/bin/kubectl");
        assert_eq!(settings.record_dir, PathBuf::from("/tmp/records"));
        assert_eq!(settings.poll_interval, Duration::from_millis(10));
        assert_eq!(settings.kubectl, "/usr/local/bin/kubectl");
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/manifests/keda.yaml");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("manifests/keda.yaml"));
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(
            expand_path("/opt/keda.yaml"),
            PathBuf::from("/opt/keda.yaml")
        );
    }

    #[test]
    fn test_overrides_builder() {
        let overrides = Overrides::default().with("KEDA_VERSION", "2.5.0");
        assert_eq!(overrides.get("KEDA_VERSION"), Some("2.5.0"));
        assert_eq!(overrides.get("DAPR_VERSION"), None);
        assert!(!overrides.is_empty());
    }
}
