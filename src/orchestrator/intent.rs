//! Turning command-line shortcuts into an explicit component set

use std::collections::BTreeSet;
use std::time::Duration;

use crate::components::{Component, PlatformVersion};
use crate::config::DEFAULT_TIMEOUT;
use crate::error::{Error, Result};
use crate::progress::Action;

pub const RUNTIME_KNATIVE: &str = "knative";
pub const RUNTIME_ASYNC: &str = "async";
pub const INGRESS_NGINX: &str = "nginx";

const KNATIVE_GROUP: [Component; 3] = [
    Component::KnativeServing,
    Component::DefaultDomain,
    Component::Kourier,
];
const ASYNC_GROUP: [Component; 2] = [Component::Dapr, Component::Keda];
const CI_GROUP: [Component; 2] = [Component::TektonPipelines, Component::Shipwright];

/// Install flags as given by the user
#[derive(Debug, Clone)]
pub struct InstallSelection {
    pub runtimes: Vec<String>,
    pub ingress: String,
    pub without_ci: bool,
    pub with_dapr: bool,
    pub with_keda: bool,
    pub with_knative: bool,
    pub with_ingress_nginx: bool,
    pub all: bool,
}

impl Default for InstallSelection {
    fn default() -> Self {
        Self {
            runtimes: vec![RUNTIME_KNATIVE.to_string()],
            ingress: INGRESS_NGINX.to_string(),
            without_ci: false,
            with_dapr: false,
            with_keda: false,
            with_knative: false,
            with_ingress_nginx: false,
            all: false,
        }
    }
}

impl InstallSelection {
    pub fn expand(&self, platform: &PlatformVersion) -> Result<BTreeSet<Component>> {
        let mut set = BTreeSet::from([Component::OpenFunction]);
        set.extend(CI_GROUP);

        for runtime in &self.runtimes {
            match runtime.as_str() {
                RUNTIME_KNATIVE => {
                    set.extend(KNATIVE_GROUP);
                    set.insert(Component::IngressNginx);
                }
                RUNTIME_ASYNC => set.extend(ASYNC_GROUP),
                other => {
                    return Err(Error::Usage(format!(
                        "invalid runtime '{other}', expected '{RUNTIME_KNATIVE}' or '{RUNTIME_ASYNC}'"
                    )))
                }
            }
        }

        match self.ingress.as_str() {
            INGRESS_NGINX => {
                set.insert(Component::IngressNginx);
            }
            other => {
                return Err(Error::Usage(format!(
                    "invalid ingress '{other}', expected '{INGRESS_NGINX}'"
                )))
            }
        }

        if self.with_dapr {
            set.insert(Component::Dapr);
        }
        if self.with_keda {
            set.insert(Component::Keda);
        }
        if self.with_knative {
            set.extend(KNATIVE_GROUP);
        }
        if self.with_ingress_nginx {
            set.insert(Component::IngressNginx);
        }
        if self.all {
            set.extend(Component::ALL.into_iter().filter(|c| *c != Component::CertManager));
        }
        // --without-ci wins over --all
        if self.without_ci {
            set.retain(|c| !CI_GROUP.contains(c));
        }

        if platform.requires_cert_manager() {
            set.insert(Component::CertManager);
        }

        Ok(set)
    }
}

/// Uninstall flags as given by the user
#[derive(Debug, Clone, Default)]
pub struct UninstallSelection {
    pub all: bool,
    pub async_runtime: bool,
    pub sync_runtime: bool,
    pub dapr: bool,
    pub keda: bool,
    pub knative: bool,
    pub shipwright: bool,
    pub cert_manager: bool,
    pub ingress: bool,
}

impl UninstallSelection {
    pub fn expand(&self) -> Result<BTreeSet<Component>> {
        if self.sync_runtime {
            return Err(Error::Usage(
                "the sync runtime cannot be uninstalled on its own yet, use --knative".to_string(),
            ));
        }

        if self.all {
            return Ok(Component::ALL.into_iter().collect());
        }

        let mut set = BTreeSet::from([Component::OpenFunction]);
        if self.async_runtime {
            set.extend(ASYNC_GROUP);
        }
        if self.dapr {
            set.insert(Component::Dapr);
        }
        if self.keda {
            set.insert(Component::Keda);
        }
        if self.knative {
            set.extend(KNATIVE_GROUP);
        }
        if self.shipwright {
            set.extend(CI_GROUP);
        }
        if self.cert_manager {
            set.insert(Component::CertManager);
        }
        if self.ingress {
            set.insert(Component::IngressNginx);
        }
        Ok(set)
    }
}

/// Fully expanded request for one run
#[derive(Debug, Clone)]
pub struct Intent {
    pub action: Action,
    pub components: BTreeSet<Component>,
    /// Platform release to install; uninstall only checks it against the record
    pub platform: Option<PlatformVersion>,
    pub upgrade: bool,
    pub dry_run: bool,
    pub assume_yes: bool,
    pub region_cn: bool,
    pub wait: bool,
    pub timeout: Duration,
}

impl Intent {
    pub fn install(selection: &InstallSelection, platform: PlatformVersion) -> Result<Self> {
        Ok(Self {
            action: Action::Install,
            components: selection.expand(&platform)?,
            platform: Some(platform),
            upgrade: false,
            dry_run: false,
            assume_yes: false,
            region_cn: false,
            wait: true,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Components missing from the record are never touched, whatever `platform` says
    pub fn uninstall(
        selection: &UninstallSelection,
        platform: Option<PlatformVersion>,
    ) -> Result<Self> {
        Ok(Self {
            action: Action::Uninstall,
            components: selection.expand()?,
            platform,
            upgrade: false,
            dry_run: false,
            assume_yes: false,
            region_cn: false,
            wait: false,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_upgrade(mut self, upgrade: bool) -> Self {
        self.upgrade = upgrade;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    pub fn with_region_cn(mut self, region_cn: bool) -> Self {
        self.region_cn = region_cn;
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Parse a user-supplied platform version, mapping failures to usage errors
pub fn parse_platform_version(raw: &str) -> Result<PlatformVersion> {
    PlatformVersion::parse(raw).map_err(|e| {
        Error::Usage(format!(
            "{e}; versions from {} onward are supported",
            crate::components::version::BASE_PLATFORM_VERSION
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> PlatformVersion {
        PlatformVersion::parse(raw).unwrap()
    }

    #[test]
    fn test_default_install_selection() {
        let set = InstallSelection::default().expand(&v("0.4.0")).unwrap();
        let expected = BTreeSet::from([
            Component::OpenFunction,
            Component::TektonPipelines,
            Component::Shipwright,
            Component::KnativeServing,
            Component::DefaultDomain,
            Component::Kourier,
            Component::IngressNginx,
            Component::CertManager,
        ]);
        assert_eq!(set, expected);
    }

    #[test]
    fn test_without_ci_and_async() {
        let selection = InstallSelection {
            runtimes: vec![RUNTIME_ASYNC.to_string()],
            without_ci: true,
            ..Default::default()
        };
        let set = selection.expand(&v("0.3.1")).unwrap();
        assert!(set.contains(&Component::Dapr));
        assert!(set.contains(&Component::Keda));
        assert!(!set.contains(&Component::Shipwright));
        assert!(!set.contains(&Component::TektonPipelines));
        assert!(!set.contains(&Component::KnativeServing));
        assert!(!set.contains(&Component::CertManager));
    }

    #[test]
    fn test_all_with_cert_manager_gate() {
        let selection = InstallSelection {
            all: true,
            ..Default::default()
        };
        assert_eq!(selection.expand(&v("0.5.0")).unwrap().len(), Component::ALL.len());
        let latest = selection.expand(&PlatformVersion::Latest).unwrap();
        assert!(!latest.contains(&Component::CertManager));
        assert_eq!(latest.len(), Component::ALL.len() - 1);
    }

    #[test]
    fn test_all_without_ci() {
        let selection = InstallSelection {
            all: true,
            without_ci: true,
            ..Default::default()
        };
        let set = selection.expand(&v("0.4.0")).unwrap();
        assert!(!set.contains(&Component::TektonPipelines));
        assert!(!set.contains(&Component::Shipwright));
        assert!(set.contains(&Component::Dapr));
        assert!(set.contains(&Component::CertManager));
        assert_eq!(set.len(), Component::ALL.len() - 2);
    }

    #[test]
    fn test_invalid_runtime() {
        let selection = InstallSelection {
            runtimes: vec!["sync".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            selection.expand(&v("0.4.0")),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn test_invalid_ingress() {
        let selection = InstallSelection {
            ingress: "traefik".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            selection.expand(&v("0.4.0")),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn test_with_flags() {
        let selection = InstallSelection {
            runtimes: vec![],
            without_ci: true,
            with_dapr: true,
            ..Default::default()
        };
        let set = selection.expand(&PlatformVersion::Latest).unwrap();
        assert_eq!(
            set,
            BTreeSet::from([
                Component::OpenFunction,
                Component::Dapr,
                Component::IngressNginx
            ])
        );
    }

    #[test]
    fn test_uninstall_selection() {
        let selection = UninstallSelection {
            async_runtime: true,
            shipwright: true,
            ..Default::default()
        };
        let set = selection.expand().unwrap();
        assert_eq!(
            set,
            BTreeSet::from([
                Component::OpenFunction,
                Component::Dapr,
                Component::Keda,
                Component::TektonPipelines,
                Component::Shipwright,
            ])
        );

        let all = UninstallSelection {
            all: true,
            ..Default::default()
        };
        assert_eq!(all.expand().unwrap().len(), Component::ALL.len());
    }

    #[test]
    fn test_uninstall_sync_is_usage_error() {
        let selection = UninstallSelection {
            sync_runtime: true,
            ..Default::default()
        };
        let err = selection.expand().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_parse_platform_version() {
        assert!(parse_platform_version("v0.4.0").is_ok());
        assert!(matches!(
            parse_platform_version("0.2.0"),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            parse_platform_version("newest"),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn test_intent_builders() {
        let intent = Intent::install(&InstallSelection::default(), PlatformVersion::Latest)
            .unwrap()
            .with_upgrade(true)
            .with_dry_run(true)
            .with_timeout(Duration::from_secs(30));
        assert_eq!(intent.action, Action::Install);
        assert!(intent.upgrade && intent.dry_run);
        assert_eq!(intent.timeout, Duration::from_secs(30));
        assert_eq!(intent.platform, Some(PlatformVersion::Latest));
    }
}
