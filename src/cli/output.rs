//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::TopologyHasher;
use crate::planner::{ApplyReport, DiffResult, ExecutionPlan, StepAction, StepOutcome};
use crate::state::AppliedSnapshot;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan step row for table display.
#[derive(Tabled)]
struct PlanStepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
}

/// Resource record row for table display.
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Provider ID")]
    provider_id: String,
    #[tabled(rename = "Outputs")]
    outputs: usize,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an execution plan for display.
    #[must_use]
    pub fn format_plan(
        &self,
        plan: &ExecutionPlan,
        diff: &DiffResult,
        topology_hash: &str,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::new(plan, diff, topology_hash))
                    .unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, diff, topology_hash),
        }
    }

    fn format_plan_text(plan: &ExecutionPlan, diff: &DiffResult, topology_hash: &str) -> String {
        if plan.is_noop() {
            return format!(
                "{} No changes required - infrastructure is up to date.\n",
                "✓".green()
            );
        }

        let mut output = String::new();
        let _ = writeln!(output, "\nExecution Plan");
        let _ = writeln!(
            output,
            "   Topology hash: {}\n",
            TopologyHasher::new().short_hash(topology_hash)
        );

        let rows: Vec<PlanStepRow> = plan
            .actionable_steps()
            .iter()
            .enumerate()
            .map(|(i, s)| PlanStepRow {
                index: i + 1,
                action: Self::format_action(&s.action),
                resource: s.name.clone(),
                kind: s.kind.as_str().to_string(),
            })
            .collect();

        if !rows.is_empty() {
            let table = Table::new(rows).to_string();
            output.push_str(&table);
            output.push('\n');
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to delete, {} unchanged\n",
            diff.creates.to_string().green(),
            diff.updates.to_string().yellow(),
            diff.replaces.to_string().yellow(),
            diff.deletes.to_string().red(),
            diff.unchanged
        );

        output
    }

    /// Formats per-attribute diff details.
    #[must_use]
    pub fn format_diff_details(diff: &DiffResult) -> String {
        let mut output = String::new();
        for node_diff in diff.actionable_diffs() {
            let _ = writeln!(output, "  {} {}", node_diff.diff_type, node_diff.name);
            for detail in &node_diff.details {
                let _ = writeln!(
                    output,
                    "      {}: {} -> {}",
                    detail.field,
                    detail.old_value.as_deref().unwrap_or("(none)"),
                    detail.new_value.as_deref().unwrap_or("(none)")
                );
            }
        }
        output
    }

    /// Formats an apply report for display.
    #[must_use]
    pub fn format_report(&self, report: &ApplyReport) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&ReportJson::from(report)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    fn format_report_text(report: &ApplyReport) -> String {
        let status = if report.success() {
            format!("{} Apply complete", "✓".green())
        } else {
            format!("{} Apply failed", "✗".red())
        };

        let mut output = format!("{status}\n\n");
        for step in &report.steps {
            let marker = match &step.outcome {
                StepOutcome::Done => "✓".green().to_string(),
                StepOutcome::Failed(_) => "✗".red().to_string(),
                StepOutcome::Skipped => "-".dimmed().to_string(),
            };
            let _ = write!(output, "   {marker} {} {}", step.action, step.name);
            if let StepOutcome::Failed(msg) = &step.outcome {
                let _ = write!(output, ": {msg}");
            }
            output.push('\n');
        }

        let _ = write!(
            output,
            "\nResult: {} done, {} failed, {} skipped\n",
            report.done.to_string().green(),
            report.failed.to_string().red(),
            report.skipped
        );

        output
    }

    /// Formats a snapshot for display.
    #[must_use]
    pub fn format_snapshot(&self, snapshot: &AppliedSnapshot) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(snapshot).unwrap_or_default(),
            OutputFormat::Text => Self::format_snapshot_text(snapshot),
        }
    }

    fn format_snapshot_text(snapshot: &AppliedSnapshot) -> String {
        let mut output = String::new();

        let _ = write!(
            output,
            "\nSnapshot: {}/{}\n\n",
            snapshot.project, snapshot.environment
        );
        let _ = writeln!(output, "   Version: {}", snapshot.version);
        let _ = writeln!(
            output,
            "   Topology hash: {}",
            TopologyHasher::new().short_hash(&snapshot.topology_hash)
        );
        let _ = writeln!(output, "   Last updated: {}", snapshot.last_updated);
        let _ = writeln!(output, "   Resources: {}", snapshot.nodes.len());

        if !snapshot.nodes.is_empty() {
            output.push('\n');
            let rows: Vec<RecordRow> = snapshot
                .nodes
                .values()
                .map(|r| RecordRow {
                    name: r.name.clone(),
                    kind: r.kind.as_str().to_string(),
                    provider_id: Self::truncate(&r.provider_id, 20),
                    outputs: r.outputs.len(),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !snapshot.history.is_empty() {
            let _ = writeln!(output, "\n   Recent history ({}):", snapshot.history.len());
            for entry in snapshot.history.iter().rev().take(5) {
                let status = if entry.success { "✓" } else { "✗" };
                let _ = writeln!(
                    output,
                    "     {status} {} - {} ({} resources)",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.operation,
                    entry.resources.len()
                );
            }
        }

        output
    }

    /// Formats emergent outputs, optionally filtered to one resource.
    #[must_use]
    pub fn format_outputs(&self, snapshot: &AppliedSnapshot, resource: Option<&str>) -> String {
        match self.format {
            OutputFormat::Json => {
                let filtered: serde_json::Map<String, serde_json::Value> = snapshot
                    .nodes
                    .values()
                    .filter(|r| resource.is_none_or(|name| r.name == name))
                    .map(|r| {
                        (
                            r.name.clone(),
                            serde_json::to_value(&r.outputs).unwrap_or_default(),
                        )
                    })
                    .collect();
                serde_json::to_string_pretty(&filtered).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                for record in snapshot.nodes.values() {
                    if resource.is_some_and(|name| record.name != name) {
                        continue;
                    }
                    if record.outputs.is_empty() {
                        continue;
                    }
                    let _ = writeln!(output, "{}:", record.name.bold());
                    for (key, value) in &record.outputs {
                        let _ = writeln!(output, "   {key} = {value}");
                    }
                }
                if output.is_empty() {
                    output.push_str("No outputs recorded.\n");
                }
                output
            }
        }
    }

    /// Formats a step action with color.
    fn format_action(action: &StepAction) -> String {
        match action {
            StepAction::Create => "+create".green().to_string(),
            StepAction::Update { .. } => "~update".yellow().to_string(),
            StepAction::Delete { .. } => "-delete".red().to_string(),
            StepAction::RemoveReplaced { .. } => "-replaced".red().to_string(),
            StepAction::NoOp => "noop".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    ///
    /// Counts and cuts at character boundaries, so multibyte provider IDs
    /// never split mid-codepoint.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{cut}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    topology_hash: String,
    creates: usize,
    updates: usize,
    replaces: usize,
    deletes: usize,
    unchanged: usize,
    steps: Vec<StepJson>,
}

#[derive(serde::Serialize)]
struct StepJson {
    action: String,
    resource: String,
    kind: String,
}

impl PlanJson {
    fn new(plan: &ExecutionPlan, diff: &DiffResult, topology_hash: &str) -> Self {
        Self {
            topology_hash: topology_hash.to_string(),
            creates: diff.creates,
            updates: diff.updates,
            replaces: diff.replaces,
            deletes: diff.deletes,
            unchanged: diff.unchanged,
            steps: plan
                .actionable_steps()
                .iter()
                .map(|s| StepJson {
                    action: s.action.to_string(),
                    resource: s.name.clone(),
                    kind: s.kind.as_str().to_string(),
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct ReportJson {
    success: bool,
    done: usize,
    failed: usize,
    skipped: usize,
    steps: Vec<ReportStepJson>,
}

#[derive(serde::Serialize)]
struct ReportStepJson {
    resource: String,
    action: String,
    outcome: String,
    error: Option<String>,
}

impl From<&ApplyReport> for ReportJson {
    fn from(report: &ApplyReport) -> Self {
        Self {
            success: report.success(),
            done: report.done,
            failed: report.failed,
            skipped: report.skipped,
            steps: report
                .steps
                .iter()
                .map(|s| ReportStepJson {
                    resource: s.name.clone(),
                    action: s.action.clone(),
                    outcome: match &s.outcome {
                        StepOutcome::Done => String::from("done"),
                        StepOutcome::Failed(_) => String::from("failed"),
                        StepOutcome::Skipped => String::from("skipped"),
                    },
                    error: match &s.outcome {
                        StepOutcome::Failed(msg) => Some(msg.clone()),
                        _ => None,
                    },
                })
                .collect(),
        }
    }
}
