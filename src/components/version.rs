//! Version parsing and the compatibility tables
//!
//! Resolution is pure: it takes the cluster's server version and the
//! [`Overrides`] snapshot and never touches the environment itself.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

use super::Component;
use crate::config::Overrides;

pub const DEFAULT_OPENFUNCTION_VERSION: &str = "0.4.0";
pub const DEFAULT_DAPR_VERSION: &str = "1.5.1";
pub const DEFAULT_KEDA_VERSION: &str = "2.4.0";
pub const DEFAULT_SHIPWRIGHT_VERSION: &str = "0.6.1";
pub const DEFAULT_CERT_MANAGER_VERSION: &str = "1.1.0";
pub const DEFAULT_INGRESS_NGINX_VERSION: &str = "1.5.4";

/// Oldest platform release this tool can install
pub const BASE_PLATFORM_VERSION: GenericVersion = GenericVersion::new(0, 3, 1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version '{0}'")]
    Invalid(String),

    #[error("unsupported {component} release {version}")]
    Unsupported { component: Component, version: String },
}

// ============================================================================
// Generic versions
// ============================================================================

/// A `MAJOR.MINOR.PATCH` triple; pre-release and build suffixes are dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl GenericVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `v?MAJOR.MINOR[.PATCH]`, ignoring anything after the numbers
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        let invalid = || VersionError::Invalid(raw.to_string());
        let pattern = Regex::new(r"^v?(\d+)\.(\d+)(?:\.(\d+))?").map_err(|_| invalid())?;
        let caps = pattern.captures(trimmed).ok_or_else(invalid)?;
        let number = |idx: usize| -> Result<u64, VersionError> {
            match caps.get(idx) {
                Some(m) => m.as_str().parse().map_err(|_| invalid()),
                None => Ok(0),
            }
        };
        Ok(Self::new(number(1)?, number(2)?, number(3)?))
    }
}

impl FromStr for GenericVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for GenericVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for GenericVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GenericVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ============================================================================
// Platform version
// ============================================================================

/// The requested OpenFunction release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformVersion {
    /// Track the main branch bundle
    Latest,
    Release(GenericVersion),
}

impl PlatformVersion {
    /// Parse a user-supplied platform version, rejecting releases older than
    /// [`BASE_PLATFORM_VERSION`]
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        if raw.trim() == "latest" {
            return Ok(PlatformVersion::Latest);
        }
        let version = GenericVersion::parse(raw)?;
        if version < BASE_PLATFORM_VERSION {
            return Err(VersionError::Unsupported {
                component: Component::OpenFunction,
                version: version.to_string(),
            });
        }
        Ok(PlatformVersion::Release(version))
    }

    /// Releases 0.4 through 0.6 ship webhooks that need cert-manager
    pub fn requires_cert_manager(&self) -> bool {
        match self {
            PlatformVersion::Latest => false,
            PlatformVersion::Release(v) => v.major == 0 && (4..=6).contains(&v.minor),
        }
    }

    /// Releases before 0.4 are applied rather than created
    pub fn is_legacy(&self) -> bool {
        match self {
            PlatformVersion::Latest => false,
            PlatformVersion::Release(v) => v.major == 0 && v.minor < 4,
        }
    }
}

impl Default for PlatformVersion {
    fn default() -> Self {
        PlatformVersion::Release(GenericVersion::new(0, 4, 0))
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformVersion::Latest => f.write_str("latest"),
            PlatformVersion::Release(v) => v.fmt(f),
        }
    }
}

// ============================================================================
// Compatibility tables
// ============================================================================

/// Inclusive range of accepted minors for one major
#[derive(Debug, Clone, Copy)]
struct MinorRange {
    major: u64,
    low: u64,
    high: u64,
}

impl MinorRange {
    const fn new(major: u64, low: u64, high: u64) -> Self {
        Self { major, low, high }
    }

    fn contains(&self, v: &GenericVersion) -> bool {
        v.major == self.major && (self.low..=self.high).contains(&v.minor)
    }
}

/// One row per Kubernetes 1.x minor
#[derive(Debug, Clone, Copy)]
struct CompatRow {
    server_minor: u64,
    default: &'static str,
    accepts: &'static [MinorRange],
}

const KNATIVE_ROWS: &[CompatRow] = &[
    CompatRow {
        server_minor: 17,
        default: "0.21.1",
        accepts: &[MinorRange::new(0, 21, 21)],
    },
    CompatRow {
        server_minor: 18,
        default: "0.23.3",
        accepts: &[MinorRange::new(0, 22, 23)],
    },
    CompatRow {
        server_minor: 19,
        default: "0.25.2",
        accepts: &[MinorRange::new(0, 24, 25)],
    },
    CompatRow {
        server_minor: 20,
        default: "1.0.1",
        accepts: &[MinorRange::new(0, 26, 26), MinorRange::new(1, 0, 0)],
    },
];

const TEKTON_ROWS: &[CompatRow] = &[
    CompatRow {
        server_minor: 17,
        default: "0.23.0",
        accepts: &[MinorRange::new(0, 23, 23)],
    },
    CompatRow {
        server_minor: 18,
        default: "0.26.0",
        accepts: &[MinorRange::new(0, 24, 26)],
    },
    CompatRow {
        server_minor: 19,
        default: "0.29.0",
        accepts: &[MinorRange::new(0, 27, 29)],
    },
    CompatRow {
        server_minor: 20,
        default: "0.30.0",
        accepts: &[MinorRange::new(0, 30, 30)],
    },
];

/// How a component picks its version
#[derive(Debug, Clone, Copy)]
enum Policy {
    Table(&'static [CompatRow]),
    AnyOverride(&'static str),
    Pinned(&'static str),
}

fn policy(component: Component) -> Policy {
    match component {
        Component::KnativeServing | Component::Kourier | Component::DefaultDomain => {
            Policy::Table(KNATIVE_ROWS)
        }
        Component::TektonPipelines => Policy::Table(TEKTON_ROWS),
        Component::Shipwright => Policy::Pinned(DEFAULT_SHIPWRIGHT_VERSION),
        Component::Dapr => Policy::AnyOverride(DEFAULT_DAPR_VERSION),
        Component::Keda => Policy::AnyOverride(DEFAULT_KEDA_VERSION),
        Component::CertManager => Policy::AnyOverride(DEFAULT_CERT_MANAGER_VERSION),
        Component::IngressNginx => Policy::AnyOverride(DEFAULT_INGRESS_NGINX_VERSION),
        Component::OpenFunction => Policy::AnyOverride(DEFAULT_OPENFUNCTION_VERSION),
    }
}

/// Row for the server's minor; unknown or newer minors use the last row
fn row_for(rows: &'static [CompatRow], server: &GenericVersion) -> &'static CompatRow {
    rows.iter()
        .find(|row| server.major == 1 && row.server_minor == server.minor)
        .unwrap_or(&rows[rows.len() - 1])
}

/// Default version of `component` for a cluster running `server`
pub fn default_version(component: Component, server: &GenericVersion) -> &'static str {
    match policy(component) {
        Policy::Table(rows) => row_for(rows, server).default,
        Policy::AnyOverride(default) | Policy::Pinned(default) => default,
    }
}

/// Whether `candidate` may replace the default on this server
pub fn accepts_override(
    component: Component,
    server: &GenericVersion,
    candidate: &GenericVersion,
) -> bool {
    match policy(component) {
        Policy::Table(rows) => row_for(rows, server)
            .accepts
            .iter()
            .any(|range| range.contains(candidate)),
        Policy::AnyOverride(_) => true,
        Policy::Pinned(default) => GenericVersion::parse(default)
            .map(|pinned| pinned == *candidate)
            .unwrap_or(false),
    }
}

/// Version to install for a dependency component
///
/// An override that does not parse or is outside the accepted range is
/// ignored in favour of the default.
pub fn resolve(component: Component, server: &GenericVersion, overrides: &Overrides) -> String {
    let requested = component
        .version_env()
        .and_then(|key| overrides.get(key))
        .and_then(|raw| GenericVersion::parse(raw).ok());

    match requested {
        Some(candidate) if accepts_override(component, server, &candidate) => {
            candidate.to_string()
        }
        _ => default_version(component, server).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(minor: u64) -> GenericVersion {
        GenericVersion::new(1, minor, 4)
    }

    #[test]
    fn test_parse_generic_versions() {
        assert_eq!(
            GenericVersion::parse("v1.20.4+k3s1").unwrap(),
            GenericVersion::new(1, 20, 4)
        );
        assert_eq!(
            GenericVersion::parse("0.26").unwrap(),
            GenericVersion::new(0, 26, 0)
        );
        assert_eq!(
            GenericVersion::parse(" 2.5.0-rc.1 ").unwrap(),
            GenericVersion::new(2, 5, 0)
        );
        assert!(matches!(
            GenericVersion::parse("latest"),
            Err(VersionError::Invalid(_))
        ));
        assert!(GenericVersion::parse("1").is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(GenericVersion::new(0, 3, 0) < BASE_PLATFORM_VERSION);
        assert!(GenericVersion::new(0, 10, 0) > GenericVersion::new(0, 9, 9));
    }

    #[test]
    fn test_platform_version_parse() {
        assert_eq!(
            PlatformVersion::parse("latest").unwrap(),
            PlatformVersion::Latest
        );
        assert_eq!(
            PlatformVersion::parse("v0.4.0").unwrap(),
            PlatformVersion::Release(GenericVersion::new(0, 4, 0))
        );
        assert!(matches!(
            PlatformVersion::parse("0.3.0"),
            Err(VersionError::Unsupported { .. })
        ));
        assert!(PlatformVersion::parse("v0.3.1").is_ok());
        assert!(PlatformVersion::parse("next").is_err());
    }

    #[test]
    fn test_cert_manager_gating() {
        let gated = |raw: &str| PlatformVersion::parse(raw).unwrap().requires_cert_manager();
        assert!(!gated("latest"));
        assert!(!gated("0.3.1"));
        assert!(gated("0.4.0"));
        assert!(gated("0.6.2"));
        assert!(!gated("0.7.0"));
    }

    #[test]
    fn test_default_rows() {
        let empty = Overrides::default();
        assert_eq!(resolve(Component::KnativeServing, &server(17), &empty), "0.21.1");
        assert_eq!(resolve(Component::KnativeServing, &server(18), &empty), "0.23.3");
        assert_eq!(resolve(Component::Kourier, &server(19), &empty), "0.25.2");
        assert_eq!(resolve(Component::DefaultDomain, &server(20), &empty), "1.0.1");
        assert_eq!(resolve(Component::TektonPipelines, &server(17), &empty), "0.23.0");
        assert_eq!(resolve(Component::TektonPipelines, &server(20), &empty), "0.30.0");
    }

    #[test]
    fn test_unknown_minor_uses_latest_row() {
        let empty = Overrides::default();
        assert_eq!(resolve(Component::KnativeServing, &server(24), &empty), "1.0.1");
        assert_eq!(resolve(Component::TektonPipelines, &server(16), &empty), "0.30.0");
        assert_eq!(
            resolve(
                Component::TektonPipelines,
                &GenericVersion::new(2, 18, 0),
                &empty
            ),
            "0.30.0"
        );
    }

    #[test]
    fn test_table_override_in_range() {
        let overrides = Overrides::default().with("KNATIVE_SERVING_VERSION", "v0.22.0");
        assert_eq!(
            resolve(Component::KnativeServing, &server(18), &overrides),
            "0.22.0"
        );

        let overrides = Overrides::default().with("KNATIVE_SERVING_VERSION", "0.26.1");
        assert_eq!(
            resolve(Component::KnativeServing, &server(21), &overrides),
            "0.26.1"
        );
    }

    #[test]
    fn test_table_override_out_of_range_falls_back() {
        let overrides = Overrides::default().with("KNATIVE_SERVING_VERSION", "0.25.0");
        assert_eq!(
            resolve(Component::KnativeServing, &server(18), &overrides),
            "0.23.3"
        );

        let overrides = Overrides::default().with("TEKTON_PIPELINES_VERSION", "garbage");
        assert_eq!(
            resolve(Component::TektonPipelines, &server(19), &overrides),
            "0.29.0"
        );
    }

    #[test]
    fn test_untabled_overrides() {
        let overrides = Overrides::default()
            .with("KEDA_VERSION", "v2.5")
            .with("SHIPWRIGHT_VERSION", "0.7.0")
            .with("DAPR_VERSION", "1.6.0");
        assert_eq!(resolve(Component::Keda, &server(20), &overrides), "2.5.0");
        assert_eq!(resolve(Component::Dapr, &server(20), &overrides), "1.6.0");
        assert_eq!(
            resolve(Component::Shipwright, &server(20), &overrides),
            "0.6.1"
        );
        assert_eq!(
            resolve(Component::CertManager, &server(20), &overrides),
            "1.1.0"
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let overrides = Overrides::default().with("KOURIER_VERSION", "0.24.0");
        let first = resolve(Component::Kourier, &server(19), &overrides);
        let second = resolve(Component::Kourier, &server(19), &overrides);
        assert_eq!(first, second);
        assert_eq!(first, "0.24.0");
    }
}
