use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ofn::cli::{Cli, Commands, PromptConfirm};
use ofn::config::{default_record_dir, expand_path, Overrides, Settings};
use ofn::kube::Kubectl;
use ofn::orchestrator::Orchestrator;
use ofn::progress::TerminalProgress;
use ofn::record::RecordStore;

/// Cancel `token` on Ctrl-C or SIGTERM
fn watch_signals(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(e) => {
                    warn!("Cannot listen for SIGTERM: {}", e);
                    if tokio::signal::ctrl_c().await.is_ok() {
                        token.cancel();
                    }
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        warn!("Interrupted, stopping");
        token.cancel();
    });
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified, before the overrides snapshot
    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let settings = Settings::default()
        .with_record_dir(
            cli.record_dir
                .as_deref()
                .map(expand_path)
                .unwrap_or_else(default_record_dir),
        )
        .with_poll_interval(Duration::from_secs(cli.poll_interval.max(1)))
        .with_kubectl(cli.kubectl.clone());
    let store = RecordStore::new(settings.record_dir.clone());
    info!("Records kept in {}", store.dir().display());

    let kubectl = Arc::new(Kubectl::new(settings.kubectl.clone(), settings.shell.clone()));
    let orchestrator = Orchestrator::new(
        kubectl.clone(),
        kubectl,
        Arc::new(TerminalProgress),
        store,
        Overrides::from_env(),
    )
    .with_poll_interval(settings.poll_interval);

    let shutdown = CancellationToken::new();
    watch_signals(shutdown.clone());

    let result = match &cli.command {
        Commands::Install(args) => {
            ofn::cli::install(&orchestrator, args, &PromptConfirm, &shutdown).await
        }
        Commands::Uninstall(args) => {
            ofn::cli::uninstall(&orchestrator, args, &PromptConfirm, &shutdown).await
        }
    };

    match result {
        Ok(output) => print!("{}", output),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}
