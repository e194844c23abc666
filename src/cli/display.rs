//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use std::collections::BTreeSet;

use crate::components::{Component, Inventory};
use crate::orchestrator::{Plan, Summary};
use crate::progress::{format_elapsed, Action};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No components.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    let mut push_row = |cells: Vec<String>| {
        let line: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(width) => format!("{:width$}", cell, width = width),
                None => cell.clone(),
            })
            .collect();
        output.push_str(line.join("   ").trim_end());
        output.push('\n');
    };

    push_row(headers.iter().map(|h| h.to_uppercase()).collect());
    for row in rows {
        push_row(row);
    }

    output
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "-" }.to_string()
}

fn component_list(set: &BTreeSet<Component>) -> String {
    if set.is_empty() {
        return "none".to_string();
    }
    set.iter()
        .map(|c| c.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Plans and results
// ============================================================================

/// Component, version and manifest per inventory item, one manifest per line
pub fn format_inventory(inventory: &Inventory) -> String {
    let mut rows = Vec::new();
    for item in inventory.iter() {
        let name = item.component.display_name().to_string();
        if item.manifests.is_empty() {
            rows.push(vec![name, item.version.clone(), "(dapr CLI)".to_string()]);
            continue;
        }
        for (i, manifest) in item.manifests.values().enumerate() {
            if i == 0 {
                rows.push(vec![name.clone(), item.version.clone(), manifest.clone()]);
            } else {
                rows.push(vec![String::new(), String::new(), manifest.clone()]);
            }
        }
    }
    format_table(&["Component", "Version", "Manifests"], rows)
}

/// Dry-run report: what would run, what is recorded, what is on the cluster
pub fn format_plan(plan: &Plan) -> String {
    let mut output = String::new();
    let verb = match plan.action() {
        Action::Install => "install",
        Action::Uninstall => "uninstall",
    };

    output.push_str(&format!("Context: {}\n", plan.context));
    if let Some(server) = &plan.server_version {
        output.push_str(&format!("Kubernetes: v{}\n", server));
    }
    if plan.intent.region_cn {
        output.push_str("Region: cn\n");
    }
    output.push('\n');

    let rows = plan
        .intent
        .components
        .iter()
        .map(|&component| {
            let version = plan
                .inventory
                .get(component)
                .map(|item| item.version.clone())
                .unwrap_or_else(|| "-".to_string());
            vec![
                component.display_name().to_string(),
                version,
                yes_no(plan.recorded.contains(&component)),
                yes_no(plan.detected.contains(&component)),
                yes_no(plan.pending.contains(&component)),
            ]
        })
        .collect();
    output.push_str(&format_table(
        &["Component", "Version", "Recorded", "Detected", verb],
        rows,
    ));

    let pending: Inventory = {
        let mut inventory = plan.inventory.clone();
        inventory.retain(&plan.pending);
        inventory
    };
    if !pending.is_empty() {
        output.push_str("\nManifests:\n");
        output.push_str(&format_inventory(&pending));
    }

    let untracked: BTreeSet<Component> = plan
        .detected
        .difference(&plan.recorded)
        .copied()
        .collect();
    if !untracked.is_empty() {
        output.push_str(&format!(
            "\nRunning but not recorded: {}\n",
            component_list(&untracked)
        ));
    }

    output
}

pub fn format_summary(summary: &Summary) -> String {
    let mut output = String::new();
    let done: BTreeSet<Component> = summary.processed.iter().map(|i| i.component).collect();
    output.push_str(&format!(
        "{} {} in {} ({})\n",
        match summary.action {
            Action::Install => "Installed",
            Action::Uninstall => "Uninstalled",
        },
        component_list(&done),
        summary.context,
        format_elapsed(summary.elapsed)
    ));
    if !summary.skipped.is_empty() {
        output.push_str(&format!("Skipped: {}\n", component_list(&summary.skipped)));
    }

    let rows: Vec<Vec<String>> = summary
        .record
        .installed()
        .into_iter()
        .map(|(component, version)| vec![component.display_name().to_string(), version])
        .collect();
    output.push_str("\nInstalled components:\n");
    output.push_str(&format_table(&["Component", "Version"], rows));
    output
}

/// Message for a run with nothing left to do
pub fn format_nothing_to_do(plan: &Plan) -> String {
    match plan.action() {
        Action::Install => format!(
            "All selected components are already installed in {} (use --upgrade to re-apply).\n",
            plan.context
        ),
        Action::Uninstall => format!(
            "None of the selected components are recorded in {}.\n",
            plan.context
        ),
    }
}
