//! Command implementations for the CLI
//!
//! SBIO pattern: commands return rendered output, the caller prints it

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::display::{format_nothing_to_do, format_plan, format_summary};
use super::{InstallArgs, RunArgs, UninstallArgs};
use crate::components::PlatformVersion;
use crate::error::Result;
use crate::orchestrator::intent::parse_platform_version;
use crate::orchestrator::{Confirm, Intent, Orchestrator, Outcome};
use crate::release::{latest_release, LATEST_RELEASE_URL};

/// Interactive yes/no prompt on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

// ============================================================================
// Intent construction (Pure business logic)
// ============================================================================

fn apply_run_args(intent: Intent, run: &RunArgs) -> Intent {
    intent
        .with_dry_run(run.dry_run)
        .with_assume_yes(run.yes)
        .with_region_cn(run.region_cn)
        .with_timeout(run.timeout)
}

pub fn install_intent(args: &InstallArgs, platform: PlatformVersion) -> Result<Intent> {
    let intent = Intent::install(&args.selection(), platform)?.with_upgrade(args.upgrade);
    Ok(apply_run_args(intent, &args.run))
}

pub fn uninstall_intent(args: &UninstallArgs) -> Result<Intent> {
    let platform = args
        .run
        .version
        .as_deref()
        .map(parse_platform_version)
        .transpose()?;
    let intent = Intent::uninstall(&args.selection(), platform)?.with_wait(args.wait);
    Ok(apply_run_args(intent, &args.run))
}

/// Render what a run did for the terminal
pub fn render_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::DryRun(plan) => format_plan(plan),
        Outcome::NothingToDo(plan) => format_nothing_to_do(plan),
        Outcome::Declined(_) => "Aborted, nothing was changed.\n".to_string(),
        Outcome::Completed(summary) => format_summary(summary),
    }
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// The requested platform release, or the latest published one
pub async fn resolve_platform_version(requested: Option<&str>) -> Result<PlatformVersion> {
    match requested {
        Some(raw) => parse_platform_version(raw),
        None => {
            info!("No --version given, looking up the latest release");
            latest_release(LATEST_RELEASE_URL).await
        }
    }
}

pub async fn install(
    orchestrator: &Orchestrator,
    args: &InstallArgs,
    confirm: &dyn Confirm,
    shutdown: &CancellationToken,
) -> Result<String> {
    // validate flags before any network access
    args.selection().expand(&PlatformVersion::Latest)?;
    let platform = resolve_platform_version(args.run.version.as_deref()).await?;
    let intent = install_intent(args, platform)?;
    let outcome = orchestrator.run(intent, confirm, shutdown).await?;
    Ok(render_outcome(&outcome))
}

pub async fn uninstall(
    orchestrator: &Orchestrator,
    args: &UninstallArgs,
    confirm: &dyn Confirm,
    shutdown: &CancellationToken,
) -> Result<String> {
    let intent = uninstall_intent(args)?;
    let outcome = orchestrator.run(intent, confirm, shutdown).await?;
    Ok(render_outcome(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::components::Component;
    use crate::error::Error;
    use crate::progress::Action;
    use clap::Parser;
    use std::time::Duration;

    fn install_args(argv: &[&str]) -> InstallArgs {
        let mut full = vec!["ofn", "install"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Install(args) => args,
            _ => panic!("Expected Install command"),
        }
    }

    fn uninstall_args(argv: &[&str]) -> UninstallArgs {
        let mut full = vec!["ofn", "uninstall"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Uninstall(args) => args,
            _ => panic!("Expected Uninstall command"),
        }
    }

    #[test]
    fn test_install_intent() {
        let args = install_args(&["--upgrade", "--dry-run", "--region-cn", "--timeout", "2m"]);
        let intent = install_intent(&args, PlatformVersion::Latest).unwrap();
        assert_eq!(intent.action, Action::Install);
        assert!(intent.upgrade);
        assert!(intent.dry_run);
        assert!(intent.region_cn);
        assert!(!intent.assume_yes);
        assert_eq!(intent.timeout, Duration::from_secs(120));
        assert!(intent.components.contains(&Component::KnativeServing));
    }

    #[test]
    fn test_install_intent_rejects_bad_runtime() {
        let args = install_args(&["--runtime", "wasm"]);
        let err = install_intent(&args, PlatformVersion::Latest).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn test_uninstall_intent() {
        let args = uninstall_args(&["--keda", "--wait", "-y", "--version", "0.4.0"]);
        let intent = uninstall_intent(&args).unwrap();
        assert_eq!(intent.action, Action::Uninstall);
        assert!(intent.wait);
        assert!(intent.assume_yes);
        assert!(intent.components.contains(&Component::Keda));
        assert_eq!(intent.platform.map(|p| p.to_string()).as_deref(), Some("0.4.0"));
    }

    #[test]
    fn test_uninstall_intent_bad_version() {
        let args = uninstall_args(&["--version", "0.1.0"]);
        assert!(matches!(uninstall_intent(&args), Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn test_resolve_explicit_version_skips_lookup() {
        let version = resolve_platform_version(Some("v0.5.0")).await.unwrap();
        assert_eq!(version.to_string(), "0.5.0");
        let latest = resolve_platform_version(Some("latest")).await.unwrap();
        assert_eq!(latest, PlatformVersion::Latest);
    }
}
