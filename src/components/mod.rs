//! The fixed catalogue of components this tool manages
//!
//! Each [`Component`] knows its record key, namespace, override variables and
//! the deployment used to detect an existing installation.

pub mod inventory;
pub mod manifest;
pub mod version;

use std::fmt;

pub use inventory::{Inventory, InventoryItem};
pub use manifest::{ManifestRole, ManifestSet};
pub use version::{GenericVersion, PlatformVersion, VersionError};

/// A managed component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    OpenFunction,
    Dapr,
    Keda,
    KnativeServing,
    Kourier,
    DefaultDomain,
    TektonPipelines,
    Shipwright,
    CertManager,
    IngressNginx,
}

/// How an existing installation is recognised on the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistenceProbe {
    /// A deployment with this name is available
    Deployment(&'static str),
    /// A job with this name has at least one active pod
    ActiveJob(&'static str),
}

impl Component {
    pub const ALL: [Component; 10] = [
        Component::OpenFunction,
        Component::Dapr,
        Component::Keda,
        Component::KnativeServing,
        Component::Kourier,
        Component::DefaultDomain,
        Component::TektonPipelines,
        Component::Shipwright,
        Component::CertManager,
        Component::IngressNginx,
    ];

    /// Key used in the installation record file
    pub fn record_key(self) -> &'static str {
        match self {
            Component::OpenFunction => "openFunction",
            Component::Dapr => "dapr",
            Component::Keda => "keda",
            Component::KnativeServing => "knativeServing",
            Component::Kourier => "kourier",
            Component::DefaultDomain => "defaultDomain",
            Component::TektonPipelines => "tektonPipelines",
            Component::Shipwright => "shipwright",
            Component::CertManager => "certManager",
            Component::IngressNginx => "ingress",
        }
    }

    pub fn from_record_key(key: &str) -> Option<Component> {
        Component::ALL.into_iter().find(|c| c.record_key() == key)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Component::OpenFunction => "OpenFunction",
            Component::Dapr => "Dapr",
            Component::Keda => "Keda",
            Component::KnativeServing => "Knative Serving",
            Component::Kourier => "Kourier",
            Component::DefaultDomain => "Default Domain",
            Component::TektonPipelines => "Tekton Pipelines",
            Component::Shipwright => "Shipwright",
            Component::CertManager => "Cert Manager",
            Component::IngressNginx => "Ingress Nginx",
        }
    }

    pub fn namespace(self) -> &'static str {
        match self {
            Component::OpenFunction => "openfunction",
            Component::Dapr => "dapr-system",
            Component::Keda => "keda",
            Component::KnativeServing | Component::DefaultDomain => "knative-serving",
            Component::Kourier => "kourier-system",
            Component::TektonPipelines => "tekton-pipelines",
            Component::Shipwright => "shipwright-build",
            Component::CertManager => "cert-manager",
            Component::IngressNginx => "ingress-nginx",
        }
    }

    /// Whether the namespace belongs to another component
    pub fn shares_namespace(self) -> bool {
        matches!(self, Component::DefaultDomain)
    }

    /// Environment variable that overrides the resolved version
    pub fn version_env(self) -> Option<&'static str> {
        match self {
            Component::OpenFunction => None,
            Component::Dapr => Some("DAPR_VERSION"),
            Component::Keda => Some("KEDA_VERSION"),
            Component::KnativeServing => Some("KNATIVE_SERVING_VERSION"),
            Component::Kourier => Some("KOURIER_VERSION"),
            Component::DefaultDomain => Some("DEFAULT_DOMAIN_VERSION"),
            Component::TektonPipelines => Some("TEKTON_PIPELINES_VERSION"),
            Component::Shipwright => Some("SHIPWRIGHT_VERSION"),
            Component::CertManager => Some("CERT_MANAGER_VERSION"),
            Component::IngressNginx => Some("INGRESS_NGINX_VERSION"),
        }
    }

    /// Component that must be in place before this one, if any
    pub fn parent(self) -> Option<Component> {
        match self {
            Component::DefaultDomain => Some(Component::KnativeServing),
            Component::Kourier => Some(Component::DefaultDomain),
            Component::Shipwright => Some(Component::TektonPipelines),
            _ => None,
        }
    }

    /// The platform itself, as opposed to one of its dependencies
    pub fn is_platform(self) -> bool {
        self == Component::OpenFunction
    }

    pub fn existence_probe(self) -> ExistenceProbe {
        match self {
            Component::OpenFunction => {
                ExistenceProbe::Deployment("openfunction-controller-manager")
            }
            Component::Dapr => ExistenceProbe::Deployment("dapr-operator"),
            Component::Keda => ExistenceProbe::Deployment("keda-operator"),
            Component::KnativeServing => ExistenceProbe::Deployment("controller"),
            Component::Kourier => ExistenceProbe::Deployment("3scale-kourier-gateway"),
            Component::DefaultDomain => ExistenceProbe::ActiveJob("default-domain"),
            Component::TektonPipelines => {
                ExistenceProbe::Deployment("tekton-pipelines-controller")
            }
            Component::Shipwright => ExistenceProbe::Deployment("shipwright-build-controller"),
            Component::CertManager => ExistenceProbe::Deployment("cert-manager"),
            Component::IngressNginx => ExistenceProbe::Deployment("ingress-nginx-controller"),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
