//! Manifest locations for each component release
//!
//! Templates point at upstream releases; with the region flag set they point
//! at the China mirror instead. A `*_YAML` override replaces the whole set.

use std::collections::BTreeMap;

use super::version::{GenericVersion, VersionError};
use super::Component;
use crate::config::{expand_path, Overrides};

const MIRROR: &str = "https://openfunction.sh1a.qingstor.com";

const OPENFUNCTION_MAIN_BUNDLE: &str =
    "https://raw.githubusercontent.com/OpenFunction/OpenFunction/main/config/bundle.yaml";

/// Role a manifest plays within a component, in apply order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManifestRole {
    Crd,
    Core,
    Main,
}

impl ManifestRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ManifestRole::Crd => "crd",
            ManifestRole::Core => "core",
            ManifestRole::Main => "main",
        }
    }
}

/// Role-ordered manifest references; iteration yields apply order
pub type ManifestSet = BTreeMap<ManifestRole, String>;

/// Override variables that replace a component's manifests
pub fn manifest_env(component: Component) -> &'static [(ManifestRole, &'static str)] {
    match component {
        Component::KnativeServing => &[
            (ManifestRole::Crd, "KNATIVE_SERVING_CRD_YAML"),
            (ManifestRole::Core, "KNATIVE_SERVING_CORE_YAML"),
        ],
        Component::Kourier => &[(ManifestRole::Main, "KOURIER_YAML")],
        Component::DefaultDomain => &[(ManifestRole::Main, "DEFAULT_DOMAIN_YAML")],
        Component::Keda => &[(ManifestRole::Main, "KEDA_YAML")],
        Component::TektonPipelines => &[(ManifestRole::Main, "TEKTON_PIPELINES_YAML")],
        Component::Shipwright => &[(ManifestRole::Main, "SHIPWRIGHT_YAML")],
        Component::CertManager => &[(ManifestRole::Main, "CERT_MANAGER_YAML")],
        Component::IngressNginx => &[(ManifestRole::Main, "INGRESS_NGINX_YAML")],
        Component::OpenFunction => &[(ManifestRole::Main, "OPENFUNCTION_YAML")],
        Component::Dapr => &[],
    }
}

/// Overrides apply only when every role of the component is given
fn from_overrides(component: Component, overrides: &Overrides) -> Option<ManifestSet> {
    let vars = manifest_env(component);
    if vars.is_empty() {
        return None;
    }
    vars.iter()
        .map(|(role, key)| {
            overrides
                .get(key)
                .map(|raw| (*role, expand_path(raw).to_string_lossy().into_owned()))
        })
        .collect()
}

/// Knative tags are `v0.x.y` before 1.0 and `knative-v1.x.y` after
fn knative_tag(component: Component, version: &str) -> Result<String, VersionError> {
    let parsed = GenericVersion::parse(version)?;
    match parsed.major {
        0 => Ok(format!("v{parsed}")),
        1 => Ok(format!("knative-v{parsed}")),
        _ => Err(VersionError::Unsupported {
            component,
            version: version.to_string(),
        }),
    }
}

fn single(url: String) -> ManifestSet {
    ManifestSet::from([(ManifestRole::Main, url)])
}

/// Manifests for `component` at `version`
pub fn locate(
    component: Component,
    version: &str,
    region_cn: bool,
    overrides: &Overrides,
) -> Result<ManifestSet, VersionError> {
    if let Some(set) = from_overrides(component, overrides) {
        return Ok(set);
    }

    let set = match component {
        Component::Dapr => ManifestSet::new(),

        Component::KnativeServing => {
            let tag = knative_tag(component, version)?;
            let base = if region_cn {
                format!("{MIRROR}/knative/serving/{tag}")
            } else {
                format!("https://github.com/knative/serving/releases/download/{tag}")
            };
            ManifestSet::from([
                (ManifestRole::Crd, format!("{base}/serving-crds.yaml")),
                (ManifestRole::Core, format!("{base}/serving-core.yaml")),
            ])
        }

        Component::Kourier => {
            let tag = knative_tag(component, version)?;
            single(if region_cn {
                format!("{MIRROR}/knative/net-kourier/{tag}/kourier.yaml")
            } else {
                format!("https://github.com/knative-sandbox/net-kourier/releases/download/{tag}/kourier.yaml")
            })
        }

        Component::DefaultDomain => {
            let tag = knative_tag(component, version)?;
            single(if region_cn {
                format!("{MIRROR}/knative/serving/{tag}/serving-default-domain.yaml")
            } else {
                format!("https://github.com/knative/serving/releases/download/{tag}/serving-default-domain.yaml")
            })
        }

        Component::Keda => single(if region_cn {
            format!("{MIRROR}/keda/v{version}/keda-{version}.yaml")
        } else {
            format!("https://github.com/kedacore/keda/releases/download/v{version}/keda-{version}.yaml")
        }),

        Component::TektonPipelines => single(if region_cn {
            format!("{MIRROR}/tekton/pipeline/v{version}/release.yaml")
        } else {
            format!("https://storage.googleapis.com/tekton-releases/pipeline/previous/v{version}/release.yaml")
        }),

        Component::Shipwright => single(if region_cn {
            format!("{MIRROR}/shipwright/v{version}/release.yaml")
        } else {
            format!("https://github.com/shipwright-io/build/releases/download/v{version}/release.yaml")
        }),

        Component::CertManager => single(if region_cn {
            format!("{MIRROR}/cert-manager/v{version}/cert-manager.yaml")
        } else {
            format!("https://github.com/jetstack/cert-manager/releases/download/v{version}/cert-manager.yaml")
        }),

        Component::IngressNginx => single(if region_cn {
            format!("{MIRROR}/ingress-nginx/v{version}/deploy.yml")
        } else {
            format!("https://raw.githubusercontent.com/kubernetes/ingress-nginx/controller-v{version}/deploy/static/provider/cloud/deploy.yaml")
        }),

        Component::OpenFunction => {
            if version == "latest" {
                single(OPENFUNCTION_MAIN_BUNDLE.to_string())
            } else {
                single(format!(
                    "https://github.com/OpenFunction/OpenFunction/releases/download/v{version}/bundle.yaml"
                ))
            }
        }
    };

    Ok(set)
}

/// Shell pipeline that installs the Dapr CLI at `version`
pub fn dapr_cli_installer(version: &str, region_cn: bool) -> String {
    let script = if region_cn {
        format!("{MIRROR}/dapr/install.sh")
    } else {
        "https://raw.githubusercontent.com/dapr/cli/master/install/install.sh".to_string()
    };
    format!("wget -q {script} -O - | /bin/bash -s {version}")
}
