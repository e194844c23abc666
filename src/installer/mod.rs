//! Per-component install and uninstall procedures

use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::components::manifest::dapr_cli_installer;
use crate::components::{Component, InventoryItem, PlatformVersion};
use crate::convergence::{Poller, ReadinessTarget};
use crate::error::{Error, Result};
use crate::kube::{ClusterClient, CommandRunner, ExecError};
use crate::progress::{Action, Progress};

const KOURIER_INGRESS_CLASS: &str = "kourier.ingress.networking.knative.dev";

/// What to wait for after installing `component`
pub fn readiness_target(component: Component) -> Option<ReadinessTarget> {
    match component {
        // the default-domain job runs to completion; nothing stays up
        Component::DefaultDomain => None,
        Component::CertManager => Some(ReadinessTarget::All(vec![
            ReadinessTarget::deployments(component.namespace()),
            ReadinessTarget::pod_ready(component.namespace(), "app.kubernetes.io/name=webhook"),
        ])),
        other => Some(ReadinessTarget::deployments(other.namespace())),
    }
}

/// What to wait for after uninstalling `component` with `--wait`
pub fn removal_target(component: Component) -> Option<ReadinessTarget> {
    if component.shares_namespace() {
        None
    } else {
        Some(ReadinessTarget::namespace_gone(component.namespace()))
    }
}

/// Whether applies for `component` block until the objects are established
pub fn apply_waits(component: Component) -> bool {
    matches!(
        component,
        Component::KnativeServing | Component::TektonPipelines
    )
}

pub fn delete_waits(component: Component) -> bool {
    matches!(component, Component::KnativeServing | Component::Kourier)
}

/// Platform bundles ship CRDs too large for client-side apply, except 0.3.x
fn creates_platform(item: &InventoryItem) -> bool {
    item.component.is_platform()
        && PlatformVersion::parse(&item.version)
            .map(|v| !v.is_legacy())
            .unwrap_or(true)
}

pub struct Installer {
    cluster: Arc<dyn ClusterClient>,
    runner: Arc<dyn CommandRunner>,
    progress: Arc<dyn Progress>,
    region_cn: bool,
}

impl Installer {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        runner: Arc<dyn CommandRunner>,
        progress: Arc<dyn Progress>,
        region_cn: bool,
    ) -> Self {
        Self {
            cluster,
            runner,
            progress,
            region_cn,
        }
    }

    pub async fn install(&self, item: &InventoryItem, poller: &Poller) -> Result<()> {
        self.report(item.component, Action::Install, self.install_steps(item, poller))
            .await
    }

    pub async fn uninstall(&self, item: &InventoryItem, wait: bool, poller: &Poller) -> Result<()> {
        self.report(
            item.component,
            Action::Uninstall,
            self.uninstall_steps(item, wait, poller),
        )
        .await
    }

    async fn report(
        &self,
        component: Component,
        action: Action,
        steps: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        let start = Instant::now();
        self.progress.started(component, action);
        let result = steps.await;
        match &result {
            Ok(()) => self.progress.finished(component, action, start.elapsed()),
            Err(e) if e.is_cancelled() => debug!("{} cancelled", component),
            Err(e) => self.progress.failed(component, &e.to_string()),
        }
        result
    }

    async fn install_steps(&self, item: &InventoryItem, poller: &Poller) -> Result<()> {
        let component = item.component;

        match component {
            Component::Dapr => {
                self.progress.update(component, "installing the dapr CLI");
                let script = dapr_cli_installer(&item.version, self.region_cn);
                self.guarded(component, poller, self.runner.run(&script))
                    .await?
                    .map_err(|e| manifest_error(component, "install", "dapr CLI", e))?;

                let init = format!("dapr init -k --runtime-version {}", item.version);
                let outcome = self.guarded(component, poller, self.runner.run(&init)).await?;
                match outcome {
                    Ok(_) => {}
                    Err(e) if e.is_already_exists() => {
                        warn!("Dapr control plane already present: {}", e)
                    }
                    Err(e) => return Err(manifest_error(component, "install", &init, e)),
                }
            }
            _ if creates_platform(item) => {
                for reference in item.manifests.values() {
                    let outcome = self
                        .guarded(component, poller, self.runner.create(reference))
                        .await?;
                    match outcome {
                        Ok(()) => {}
                        Err(e) if e.is_already_exists() => {
                            warn!("{} objects already exist, keeping them", component)
                        }
                        Err(e) => return Err(manifest_error(component, "create", reference, e)),
                    }
                }
            }
            _ => {
                let wait = apply_waits(component);
                for (role, reference) in &item.manifests {
                    self.progress
                        .update(component, &format!("applying {} manifest", role.as_str()));
                    self.guarded(component, poller, self.runner.apply(reference, wait))
                        .await?
                        .map_err(|e| manifest_error(component, "apply", reference, e))?;
                }
            }
        }

        if component == Component::Kourier {
            let patch = json!({"data": {"ingress.class": KOURIER_INGRESS_CLASS}});
            self.guarded(
                component,
                poller,
                self.runner
                    .patch_config_map("knative-serving", "config-network", &patch),
            )
            .await?
            .map_err(|e| manifest_error(component, "patch", "knative-serving/config-network", e))?;
        }

        if let Some(target) = readiness_target(component) {
            self.progress
                .update(component, &format!("waiting for {target}"));
            poller
                .wait(self.cluster.as_ref(), &target)
                .await
                .map_err(|e| Error::from_poll(component, e))?;
        }
        Ok(())
    }

    async fn uninstall_steps(&self, item: &InventoryItem, wait: bool, poller: &Poller) -> Result<()> {
        let component = item.component;

        if component == Component::Dapr {
            let command = "dapr uninstall -k --all";
            let outcome = self.guarded(component, poller, self.runner.run(command)).await?;
            match outcome {
                Ok(_) => {}
                Err(e) if e.is_not_found() => warn!("Dapr already removed: {}", e),
                Err(e) => return Err(manifest_error(component, "uninstall", command, e)),
            }
            let namespace = component.namespace();
            let outcome = self
                .guarded(component, poller, self.runner.delete_namespace(namespace))
                .await?;
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(manifest_error(component, "delete", namespace, e)),
            }
        } else {
            let wait_delete = delete_waits(component);
            for (role, reference) in item.manifests.iter().rev() {
                self.progress
                    .update(component, &format!("deleting {} manifest", role.as_str()));
                let outcome = self
                    .guarded(component, poller, self.runner.delete(reference, wait_delete))
                    .await?;
                match outcome {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        debug!("{} already gone: {}", reference, e)
                    }
                    Err(e) => return Err(manifest_error(component, "delete", reference, e)),
                }
            }
        }

        if wait {
            if let Some(target) = removal_target(component) {
                self.progress
                    .update(component, &format!("waiting for {target}"));
                poller
                    .wait(self.cluster.as_ref(), &target)
                    .await
                    .map_err(|e| Error::from_poll(component, e))?;
            }
        }
        Ok(())
    }

    /// Run a command, abandoning it when the run is cancelled or out of time
    async fn guarded<T>(
        &self,
        component: Component,
        poller: &Poller,
        command: impl Future<Output = std::result::Result<T, ExecError>>,
    ) -> Result<std::result::Result<T, ExecError>> {
        tokio::select! {
            biased;
            _ = sleep_until(poller.deadline()) => Err(Error::ConvergenceTimeout {
                component,
                target: "command to finish".to_string(),
            }),
            _ = poller.cancel_token().cancelled() => Err(Error::Cancelled(component)),
            outcome = command => Ok(outcome),
        }
    }
}

fn manifest_error(
    component: Component,
    action: &'static str,
    reference: &str,
    source: ExecError,
) -> Error {
    Error::ManifestApply {
        component,
        action,
        reference: reference.to_string(),
        source,
    }
}
