//! CLI module for ofn
//!
//! Provides two subcommands:
//! - `ofn install` - Install OpenFunction and the dependencies it needs
//! - `ofn uninstall` - Remove what a previous install put on the cluster

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

use crate::orchestrator::intent::{INGRESS_NGINX, RUNTIME_KNATIVE};
use crate::orchestrator::{InstallSelection, UninstallSelection};

#[derive(Parser, Debug)]
#[command(name = "ofn")]
#[command(about = "Install and uninstall OpenFunction and its dependencies")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding installation records (default: ~/.ofn)
    #[arg(long, global = true, env = "OFN_HOME", value_name = "DIR")]
    pub record_dir: Option<String>,

    /// Path to a .env file with version or manifest overrides
    #[arg(long, global = true, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// kubectl binary to use
    #[arg(long, global = true, env = "OFN_KUBECTL", default_value = "kubectl", hide = true)]
    pub kubectl: String,

    /// Seconds between readiness checks
    #[arg(long, global = true, default_value_t = 5, hide = true)]
    pub poll_interval: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install OpenFunction and its dependencies
    Install(InstallArgs),

    /// Uninstall OpenFunction and its dependencies
    Uninstall(UninstallArgs),
}

/// Options shared by install and uninstall
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Show what would be done without touching the cluster
    #[arg(long)]
    pub dry_run: bool,

    /// Use the China mirror for manifests and scripts
    #[arg(long)]
    pub region_cn: bool,

    /// Overall time limit, e.g. 10m, 90s, 1h
    #[arg(long, value_name = "DURATION", default_value = "10m", value_parser = parse_duration)]
    pub timeout: Duration,

    /// OpenFunction release (default: the latest published release)
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Install every dependency
    #[arg(long)]
    pub all: bool,

    /// Function runtime: knative (sync) or async; repeatable
    #[arg(long, value_name = "RUNTIME", default_value = RUNTIME_KNATIVE)]
    pub runtime: Vec<String>,

    /// Ingress controller
    #[arg(long, value_name = "INGRESS", default_value = INGRESS_NGINX)]
    pub ingress: String,

    /// Skip the build pipeline (Tekton and Shipwright)
    #[arg(long)]
    pub without_ci: bool,

    /// Also install Dapr
    #[arg(long)]
    pub with_dapr: bool,

    /// Also install Keda
    #[arg(long)]
    pub with_keda: bool,

    /// Also install Knative Serving with Kourier
    #[arg(long)]
    pub with_knative: bool,

    /// Also install ingress-nginx
    #[arg(long)]
    pub with_ingress_nginx: bool,

    /// Re-apply components that are already installed
    #[arg(long)]
    pub upgrade: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the uninstall command
#[derive(Parser, Debug)]
pub struct UninstallArgs {
    /// Uninstall every recorded dependency
    #[arg(long)]
    pub all: bool,

    /// Uninstall the async runtime (Dapr and Keda)
    #[arg(long = "async")]
    pub async_runtime: bool,

    /// Uninstall the sync runtime
    #[arg(long = "sync")]
    pub sync_runtime: bool,

    /// Uninstall Dapr
    #[arg(long)]
    pub dapr: bool,

    /// Uninstall Keda
    #[arg(long)]
    pub keda: bool,

    /// Uninstall Knative Serving with Kourier
    #[arg(long)]
    pub knative: bool,

    /// Uninstall Shipwright and Tekton Pipelines
    #[arg(long)]
    pub shipwright: bool,

    /// Uninstall cert-manager
    #[arg(long)]
    pub cert_manager: bool,

    /// Uninstall ingress-nginx
    #[arg(long)]
    pub ingress: bool,

    /// Wait for namespaces to be deleted
    #[arg(long)]
    pub wait: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

impl InstallArgs {
    pub fn selection(&self) -> InstallSelection {
        InstallSelection {
            runtimes: self.runtime.clone(),
            ingress: self.ingress.clone(),
            without_ci: self.without_ci,
            with_dapr: self.with_dapr,
            with_keda: self.with_keda,
            with_knative: self.with_knative,
            with_ingress_nginx: self.with_ingress_nginx,
            all: self.all,
        }
    }
}

impl UninstallArgs {
    pub fn selection(&self) -> UninstallSelection {
        UninstallSelection {
            all: self.all,
            async_runtime: self.async_runtime,
            sync_runtime: self.sync_runtime,
            dapr: self.dapr,
            keda: self.keda,
            knative: self.knative,
            shipwright: self.shipwright,
            cert_manager: self.cert_manager,
            ingress: self.ingress,
        }
    }
}

/// Parse `90s`, `10m`, `1h`, `500ms` or a bare number of seconds
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{raw}'"))?;
    let duration = match unit {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        other => return Err(format!("unknown duration unit '{other}' in '{raw}'")),
    };
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}
