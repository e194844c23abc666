//! Planning and running an install or uninstall
//!
//! A run is split in two halves. [`Orchestrator::plan`] queries the cluster
//! and the record and decides what to do without changing anything.
//! [`Orchestrator::execute`] fans the work out across tasks, one per
//! dependency chain, stops every sibling on the first failure and writes the
//! record once when everything succeeded.

pub mod intent;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use intent::{InstallSelection, Intent, UninstallSelection};

use crate::components::{
    Component, ExistenceProbe, GenericVersion, Inventory, InventoryItem,
};
use crate::config::{Overrides, DEFAULT_POLL_INTERVAL};
use crate::convergence::Poller;
use crate::error::{Error, Result};
use crate::installer::Installer;
use crate::kube::{ClusterClient, CommandRunner};
use crate::progress::{Action, Progress};
use crate::record::{Record, RecordPatch, RecordStore};

/// Asks the user whether to go ahead
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Everything decided before the first mutation
#[derive(Debug, Clone)]
pub struct Plan {
    pub intent: Intent,
    pub context: String,
    /// Only known for installs
    pub server_version: Option<GenericVersion>,
    /// Resolved items for every component that will be touched
    pub inventory: Inventory,
    /// Selected components found in the record
    pub recorded: BTreeSet<Component>,
    /// Selected components found running on the cluster
    pub detected: BTreeSet<Component>,
    /// Components this run will act on
    pub pending: BTreeSet<Component>,
}

impl Plan {
    pub fn action(&self) -> Action {
        self.intent.action
    }

    /// Selected components this run leaves alone
    pub fn skipped(&self) -> BTreeSet<Component> {
        self.intent
            .components
            .difference(&self.pending)
            .copied()
            .collect()
    }

    /// Recorded components an install would re-apply
    pub fn upgrades(&self) -> BTreeSet<Component> {
        match self.action() {
            Action::Install => self.pending.intersection(&self.recorded).copied().collect(),
            Action::Uninstall => BTreeSet::new(),
        }
    }

    pub fn needs_confirmation(&self) -> bool {
        if self.intent.assume_yes || self.pending.is_empty() {
            return false;
        }
        match self.action() {
            Action::Install => !self.upgrades().is_empty(),
            Action::Uninstall => true,
        }
    }

    pub fn confirmation_prompt(&self) -> String {
        let names = |set: &BTreeSet<Component>| {
            set.iter()
                .map(|c| c.display_name())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self.action() {
            Action::Install => format!(
                "{} already installed in {}; upgrade them?",
                names(&self.upgrades()),
                self.context
            ),
            Action::Uninstall => format!(
                "Uninstall {} from {}?",
                names(&self.pending),
                self.context
            ),
        }
    }

    /// Chains to run, grouped into phases that run one after another
    pub fn phases(&self) -> Vec<Vec<Vec<Component>>> {
        match self.action() {
            Action::Install => install_phases(&self.pending),
            Action::Uninstall => uninstall_phases(&self.pending),
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct Summary {
    pub action: Action,
    pub context: String,
    pub processed: Vec<InventoryItem>,
    pub skipped: BTreeSet<Component>,
    pub record: Record,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    DryRun(Plan),
    NothingToDo(Plan),
    Declined(Plan),
    Completed(Summary),
}

// ============================================================================
// SBIO: Pure scheduling
// ============================================================================

fn depth(component: Component) -> usize {
    std::iter::successors(component.parent(), |c| c.parent()).count()
}

/// Group components into chains: each component joins the chain of its
/// nearest selected ancestor, otherwise it starts one
pub fn chains(components: &BTreeSet<Component>) -> Vec<Vec<Component>> {
    let mut ordered: Vec<Component> = components.iter().copied().collect();
    ordered.sort_by_key(|c| (depth(*c), *c));

    let mut chains: Vec<Vec<Component>> = Vec::new();
    for component in ordered {
        let anchor = std::iter::successors(component.parent(), |c| c.parent())
            .find(|ancestor| components.contains(ancestor));
        let existing = anchor.and_then(|a| chains.iter_mut().find(|chain| chain.contains(&a)));
        match existing {
            Some(chain) => chain.push(component),
            None => chains.push(vec![component]),
        }
    }
    chains.sort();
    chains
}

/// Dependencies in parallel first, then the platform
pub fn install_phases(pending: &BTreeSet<Component>) -> Vec<Vec<Vec<Component>>> {
    let (platform, dependencies): (BTreeSet<Component>, BTreeSet<Component>) =
        pending.iter().partition(|c| c.is_platform());
    [chains(&dependencies), chains(&platform)]
        .into_iter()
        .filter(|phase| !phase.is_empty())
        .collect()
}

/// One phase; every chain runs dependents first
pub fn uninstall_phases(pending: &BTreeSet<Component>) -> Vec<Vec<Vec<Component>>> {
    let reversed: Vec<Vec<Component>> = chains(pending)
        .into_iter()
        .map(|mut chain| {
            chain.reverse();
            chain
        })
        .collect();
    if reversed.is_empty() {
        Vec::new()
    } else {
        vec![reversed]
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    cluster: Arc<dyn ClusterClient>,
    runner: Arc<dyn CommandRunner>,
    progress: Arc<dyn Progress>,
    store: RecordStore,
    overrides: Overrides,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        runner: Arc<dyn CommandRunner>,
        progress: Arc<dyn Progress>,
        store: RecordStore,
        overrides: Overrides,
    ) -> Self {
        Self {
            cluster,
            runner,
            progress,
            store,
            overrides,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Plan, confirm and execute `intent`
    pub async fn run(
        &self,
        intent: Intent,
        confirm: &dyn Confirm,
        shutdown: &CancellationToken,
    ) -> Result<Outcome> {
        let plan = self.plan(intent).await?;

        if plan.intent.dry_run {
            return Ok(Outcome::DryRun(plan));
        }
        if plan.pending.is_empty() {
            info!("Nothing to {}", verb(plan.action()));
            return Ok(Outcome::NothingToDo(plan));
        }
        if plan.needs_confirmation() && !confirm.confirm(&plan.confirmation_prompt()) {
            return Ok(Outcome::Declined(plan));
        }

        let summary = self.execute(&plan, shutdown).await?;
        Ok(Outcome::Completed(summary))
    }

    /// Work out what a run would do; changes nothing
    pub async fn plan(&self, intent: Intent) -> Result<Plan> {
        let context = self
            .cluster
            .current_context()
            .await
            .map_err(Error::Cluster)?;
        let record = self.store.load(&context)?;
        debug!("Loaded record for {}: {:?}", context, record);

        let recorded: BTreeSet<Component> = intent
            .components
            .iter()
            .copied()
            .filter(|c| record.contains(*c))
            .collect();

        let (server_version, inventory, pending) = match intent.action {
            Action::Install => {
                let raw = self
                    .cluster
                    .server_version()
                    .await
                    .map_err(Error::Cluster)?;
                let server = GenericVersion::parse(&raw)?;
                let platform = intent.platform.unwrap_or_default();
                let inventory = Inventory::for_install(
                    &intent.components,
                    &server,
                    &platform,
                    intent.region_cn,
                    &self.overrides,
                )?;
                let pending = if intent.upgrade {
                    intent.components.clone()
                } else {
                    intent.components.difference(&recorded).copied().collect()
                };
                (Some(server), inventory, pending)
            }
            Action::Uninstall => {
                let mut versions = record.installed();
                versions.retain(|c, _| intent.components.contains(c));
                // the recorded release is what is on the cluster
                if let (Some(requested), Some(on_cluster)) =
                    (&intent.platform, versions.get(&Component::OpenFunction))
                {
                    if requested.to_string() != *on_cluster {
                        warn!(
                            "Requested OpenFunction {} but {} is recorded; removing {}",
                            requested, on_cluster, on_cluster
                        );
                    }
                }
                let inventory =
                    Inventory::from_recorded(&versions, intent.region_cn, &self.overrides)?;
                let pending = inventory.components();
                (None, inventory, pending)
            }
        };

        let detected = self.detect(&intent.components).await;

        Ok(Plan {
            intent,
            context,
            server_version,
            inventory,
            recorded,
            detected,
            pending,
        })
    }

    /// Components already running on the cluster, whatever the record says
    async fn detect(&self, components: &BTreeSet<Component>) -> BTreeSet<Component> {
        let probes = components.iter().map(|&component| async move {
            let namespace = component.namespace();
            let found = match component.existence_probe() {
                ExistenceProbe::Deployment(name) => self
                    .cluster
                    .get_deployment(namespace, name)
                    .await
                    .map(|d| d.is_some_and(|d| d.is_available())),
                ExistenceProbe::ActiveJob(name) => self
                    .cluster
                    .get_job(namespace, name)
                    .await
                    .map(|j| j.is_some_and(|j| j.is_active())),
            };
            match found {
                Ok(found) => found.then_some(component),
                Err(e) => {
                    debug!("Could not probe {}: {}", component, e);
                    None
                }
            }
        });
        join_all(probes).await.into_iter().flatten().collect()
    }

    /// Run a plan to completion; the record is only written on full success
    pub async fn execute(&self, plan: &Plan, shutdown: &CancellationToken) -> Result<Summary> {
        let start = Instant::now();
        let deadline = start + plan.intent.timeout;
        let token = shutdown.child_token();

        let timer = {
            let token = token.clone();
            tokio::spawn(async move {
                sleep_until(deadline).await;
                token.cancel();
            })
        };

        for component in plan.skipped() {
            let reason = match plan.action() {
                Action::Install => "already installed",
                Action::Uninstall => "not installed",
            };
            self.progress.skipped(component, reason);
        }

        let installer = Arc::new(Installer::new(
            self.cluster.clone(),
            self.runner.clone(),
            self.progress.clone(),
            plan.intent.region_cn,
        ));
        let poller = Poller::new(self.poll_interval, deadline, token.clone());

        let mut patch = RecordPatch::default();
        let mut outcome = Ok(());
        for phase in plan.phases() {
            match self
                .run_phase(plan, phase, installer.clone(), poller.clone(), &token)
                .await
            {
                Ok(done) => patch.extend(done),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        timer.abort();
        outcome?;

        let record = self.store.save(&plan.context, &patch)?;
        info!(
            "{} {} components in {}",
            verb(plan.action()),
            patch.len(),
            plan.context
        );

        Ok(Summary {
            action: plan.action(),
            context: plan.context.clone(),
            processed: plan
                .pending
                .iter()
                .filter_map(|c| plan.inventory.get(*c).cloned())
                .collect(),
            skipped: plan.skipped(),
            record,
            elapsed: start.elapsed(),
        })
    }

    /// Run chains concurrently; the first error cancels the rest
    async fn run_phase(
        &self,
        plan: &Plan,
        chains: Vec<Vec<Component>>,
        installer: Arc<Installer>,
        poller: Poller,
        token: &CancellationToken,
    ) -> Result<RecordPatch> {
        let action = plan.action();
        let wait = plan.intent.wait;
        let mut tasks = JoinSet::new();

        for chain in chains {
            let items: Vec<InventoryItem> = chain
                .iter()
                .filter_map(|c| plan.inventory.get(*c).cloned())
                .collect();
            let installer = installer.clone();
            let poller = poller.clone();
            debug!("Starting chain {:?}", chain);

            tasks.spawn(async move {
                let mut patch = RecordPatch::default();
                for item in &items {
                    match action {
                        Action::Install => {
                            installer.install(item, &poller).await?;
                            patch.installed(item.component, item.version.clone());
                        }
                        Action::Uninstall => {
                            installer.uninstall(item, wait, &poller).await?;
                            patch.removed(item.component);
                        }
                    }
                }
                Ok::<_, Error>(patch)
            });
        }

        let mut patch = RecordPatch::default();
        let mut first_error: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(Error::Task(e.to_string())));
            match result {
                Ok(done) => patch.extend(done),
                Err(e) if first_error.is_none() => {
                    warn!("Stopping remaining work: {}", e);
                    token.cancel();
                    first_error = Some(e);
                }
                Err(e) => debug!("Suppressed after first error: {}", e),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(patch),
        }
    }
}

fn verb(action: Action) -> &'static str {
    match action {
        Action::Install => "install",
        Action::Uninstall => "uninstall",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chains_full_set() {
        let all: BTreeSet<Component> = Component::ALL.into_iter().collect();
        let chains = chains(&all);
        assert!(chains.contains(&vec![
            Component::KnativeServing,
            Component::DefaultDomain,
            Component::Kourier
        ]));
        assert!(chains.contains(&vec![Component::TektonPipelines, Component::Shipwright]));
        assert!(chains.contains(&vec![Component::Dapr]));
        assert_eq!(chains.len(), 7);
    }

    #[test]
    fn test_chain_skips_missing_link() {
        let set = BTreeSet::from([Component::KnativeServing, Component::Kourier]);
        assert_eq!(
            chains(&set),
            vec![vec![Component::KnativeServing, Component::Kourier]]
        );
    }

    #[test]
    fn test_orphan_starts_own_chain() {
        let set = BTreeSet::from([Component::Kourier, Component::Keda]);
        assert_eq!(
            chains(&set),
            vec![vec![Component::Keda], vec![Component::Kourier]]
        );
    }

    #[test]
    fn test_install_phases_put_platform_last() {
        let set = BTreeSet::from([
            Component::OpenFunction,
            Component::Keda,
            Component::Dapr,
        ]);
        let phases = install_phases(&set);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].len(), 2);
        assert_eq!(phases[1], vec![vec![Component::OpenFunction]]);

        let only_platform = install_phases(&BTreeSet::from([Component::OpenFunction]));
        assert_eq!(only_platform.len(), 1);
        assert!(install_phases(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_uninstall_reverses_chains() {
        let set = BTreeSet::from([
            Component::OpenFunction,
            Component::TektonPipelines,
            Component::Shipwright,
        ]);
        let phases = uninstall_phases(&set);
        assert_eq!(phases.len(), 1);
        assert!(phases[0].contains(&vec![Component::Shipwright, Component::TektonPipelines]));
        assert!(phases[0].contains(&vec![Component::OpenFunction]));
        assert!(uninstall_phases(&BTreeSet::new()).is_empty());
    }
}
