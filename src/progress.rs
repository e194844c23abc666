//! Reporting per-component progress
//!
//! The orchestrator and installer never print directly; they report through
//! an injected [`Progress`] implementation.

use std::io::Write;
use std::time::Duration;

use tracing::{info, warn};

use crate::components::Component;

/// Which way a run is going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Uninstall,
}

impl Action {
    pub fn verb(self) -> &'static str {
        match self {
            Action::Install => "Installing",
            Action::Uninstall => "Uninstalling",
        }
    }

    pub fn past(self) -> &'static str {
        match self {
            Action::Install => "installed",
            Action::Uninstall => "uninstalled",
        }
    }
}

pub trait Progress: Send + Sync {
    fn started(&self, component: Component, action: Action);

    fn update(&self, component: Component, message: &str);

    fn finished(&self, component: Component, action: Action, elapsed: Duration);

    fn skipped(&self, component: Component, reason: &str);

    fn failed(&self, component: Component, error: &str);
}

/// Reports through `tracing` only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn started(&self, component: Component, action: Action) {
        info!("{} {}", action.verb(), component);
    }

    fn update(&self, component: Component, message: &str) {
        info!("{}: {}", component, message);
    }

    fn finished(&self, component: Component, action: Action, elapsed: Duration) {
        info!("{} {} in {:.1}s", component, action.past(), elapsed.as_secs_f64());
    }

    fn skipped(&self, component: Component, reason: &str) {
        info!("Skipping {}: {}", component, reason);
    }

    fn failed(&self, component: Component, error: &str) {
        warn!("{} failed: {}", component, error);
    }
}

/// One line per event on stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalProgress;

impl TerminalProgress {
    fn line(&self, text: String) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{text}");
    }
}

impl Progress for TerminalProgress {
    fn started(&self, component: Component, action: Action) {
        self.line(format!("-> {} {}...", action.verb(), component));
        LogProgress.started(component, action);
    }

    fn update(&self, component: Component, message: &str) {
        self.line(format!("   {component}: {message}"));
    }

    fn finished(&self, component: Component, action: Action, elapsed: Duration) {
        self.line(format!(
            "OK {} {} ({})",
            component,
            action.past(),
            format_elapsed(elapsed)
        ));
    }

    fn skipped(&self, component: Component, reason: &str) {
        self.line(format!("-- {component} skipped: {reason}"));
    }

    fn failed(&self, component: Component, error: &str) {
        self.line(format!("!! {component} failed: {error}"));
        LogProgress.failed(component, error);
    }
}

/// `1m05s` / `12s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(12)), "12s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1m05s");
        assert_eq!(format_elapsed(Duration::from_millis(400)), "0s");
    }

    #[test]
    fn test_action_words() {
        assert_eq!(Action::Install.verb(), "Installing");
        assert_eq!(Action::Uninstall.past(), "uninstalled");
    }
}
