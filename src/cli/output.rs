//! CLI output formatting

use crate::core::{PipelineDescriptor, StageConfig};
use crate::execution::{BuildEvent, BuildReport, BuildWarning};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "> ");

/// Create a spinner shown while modules are processed
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} modules {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// One line per stage: position, name and the interesting bits of its config
pub fn format_stage_list(descriptor: &PipelineDescriptor) -> String {
    descriptor
        .stages
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            let detail = stage_detail(&stage.config);
            if detail.is_empty() {
                format!("  {:>2}. {}", i + 1, style(stage.id.name()).cyan())
            } else {
                format!(
                    "  {:>2}. {} {}",
                    i + 1,
                    style(stage.id.name()).cyan(),
                    style(detail).dim()
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn stage_detail(config: &StageConfig) -> String {
    match config {
        StageConfig::ExternalizeBuiltins {
            node_platform,
            keep_node_prefix,
        } => format!("(node platform: {}, keep node: prefix: {})", node_platform, keep_node_prefix),
        StageConfig::TsconfigPaths { base, patterns } => {
            format!("({} patterns from {})", patterns.len(), base.display())
        }
        StageConfig::Alias { entries } => format!("({} entries)", entries.len()),
        StageConfig::NodeResolve {
            export_conditions, ..
        } => format!("(conditions: {})", export_conditions.join(", ")),
        StageConfig::EnvReplace { values, .. } => format!("({} values)", values.len()),
        StageConfig::SyntaxTransform { target, .. } | StageConfig::Minify { target } => format!(
            "({})",
            target.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        ),
        StageConfig::PatchBinary { executables } if !executables.is_empty() => format!(
            "({})",
            executables
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        _ => String::new(),
    }
}

pub fn format_warning(warning: &BuildWarning) -> String {
    format!(
        "{}{} [{}] {}",
        WARN,
        style(warning.module.display()).yellow(),
        style(warning.stage).dim(),
        warning.message
    )
}

/// Format a build event for display; `None` for events that only move the
/// spinner
pub fn format_build_event(event: &BuildEvent) -> Option<String> {
    match event {
        BuildEvent::BuildStarted { build_id, stages } => Some(format!(
            "{}Building with {} stages ({})",
            PACKAGE,
            style(stages.len()).cyan(),
            style(&build_id.to_string()[..8]).dim()
        )),
        BuildEvent::Warning(warning) => Some(format_warning(warning)),
        BuildEvent::ChunkWritten { file, bytes } => Some(format!(
            "  {} {}",
            style(file.display()).green(),
            style(format_size(*bytes)).dim()
        )),
        BuildEvent::ModuleTransformed { .. } | BuildEvent::BuildFinished { .. } => None,
    }
}

/// Final build summary
pub fn format_report(report: &BuildReport, root: Option<&Path>) -> String {
    let mut lines = Vec::new();
    let duration = report
        .finished_at
        .signed_duration_since(report.started_at)
        .to_std()
        .unwrap_or_default();

    lines.push(format!(
        "{}Built {} files in {}",
        CHECK,
        style(report.outputs.len()).cyan(),
        style(format_duration(duration)).dim()
    ));
    for output in report.outputs.iter().filter(|o| o.is_entry) {
        let module = root
            .and_then(|r| output.module.strip_prefix(r).ok())
            .unwrap_or(&output.module);
        lines.push(format!(
            "  {} {} {}",
            style(module.display()).bold(),
            style("→").dim(),
            output.file.display()
        ));
    }
    if !report.externals.is_empty() {
        lines.push(format!(
            "{}External: {}",
            INFO,
            report.externals.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !report.warnings.is_empty() {
        lines.push(format!("{}{} warnings", WARN, style(report.warnings.len()).yellow()));
    }
    lines.join("\n")
}

pub fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} kB", bytes as f64 / 1024.0)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 kB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
