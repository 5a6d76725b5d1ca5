//! Report generation for scenario comparisons.
//!
//! Generates both JSON and human-readable text reports.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};

use super::types::*;

pub const JSON_REPORT_NAME: &str = "comparison_report.json";
pub const TEXT_REPORT_NAME: &str = "comparison_report.txt";

const METRIC_COLUMN_WIDTH: usize = 34;
const VALUE_COLUMN_WIDTH: usize = 18;

/// Generate JSON report
pub fn generate_json_report(report: &ComparisonReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

fn metric_label(name: &str, unit: &str) -> String {
    if unit.is_empty() {
        name.to_string()
    } else {
        format!("{} ({})", name, unit)
    }
}

/// Render the text report
pub fn render_text_report(report: &ComparisonReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    // Header
    lines.push("=".repeat(80));
    lines.push("                    RPL NETWORK PERFORMANCE COMPARISON".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    // Metadata
    lines.push(format!("Analysis Date: {}", report.metadata.analysis_timestamp));
    lines.push(format!("Configuration: {}", report.metadata.config_path));
    lines.push(format!("Capture Decoder: {}", report.metadata.decoder));
    lines.push(format!("Scenarios: {}", report.metadata.scenario_count));
    lines.push(String::new());

    if !report.scenarios.is_empty() {
        lines.push("=".repeat(80));
        lines.push("                              METRICS".to_string());
        lines.push("=".repeat(80));
        lines.push(String::new());

        let mut header = format!("{:<width$}", "Metric", width = METRIC_COLUMN_WIDTH);
        for scenario in &report.scenarios {
            header.push_str(&format!("{:>width$}", scenario.name, width = VALUE_COLUMN_WIDTH));
        }
        lines.push(header);
        lines.push("-".repeat(METRIC_COLUMN_WIDTH + VALUE_COLUMN_WIDTH * report.scenarios.len()));

        let rows: Vec<_> = report.scenarios.iter().map(|s| s.metrics.rows()).collect();
        for (i, (name, unit, _)) in rows[0].iter().enumerate() {
            let mut line = format!("{:<width$}", metric_label(name, unit), width = METRIC_COLUMN_WIDTH);
            for scenario_rows in &rows {
                line.push_str(&format!("{:>width$.2}", scenario_rows[i].2, width = VALUE_COLUMN_WIDTH));
            }
            lines.push(line);
        }
        lines.push(String::new());
    }

    // Per-scenario inputs and diagnostics
    for scenario in &report.scenarios {
        lines.push(format!("{} ({})", scenario.name, scenario.kind));
        match &scenario.capture_path {
            Some(capture) => lines.push(format!("  Capture: {}", capture)),
            None => lines.push("  Capture: none (log events correlated)".to_string()),
        }
        lines.push(format!("  Log: {}", scenario.log_path));

        if let Some(ref stats) = scenario.capture_stats {
            lines.push(format!(
                "  Capture records: {} ({} skipped), sent {}, received {}",
                stats.records, stats.skipped_records, stats.sent, stats.received
            ));
        }
        if let Some(ref profile) = scenario.capture_profile {
            lines.extend(profile.summary_lines().into_iter().map(|l| format!("  {}", l)));
        }
        if let Some(ref stats) = scenario.correlation_stats {
            lines.push(format!(
                "  Log events: sent {}, received {}, paired {}, unmatched receives {}",
                stats.sent, stats.received, stats.paired, stats.unmatched_receives
            ));
        }
        lines.push(format!(
            "  Log lines: {} ({} timestamped), nodes {}, control messages {}, ETX samples {}",
            scenario.log_stats.lines,
            scenario.log_stats.timestamped_lines,
            scenario.log_stats.distinct_nodes,
            scenario.log_stats.control_messages,
            scenario.log_stats.link_quality_samples
        ));
        lines.push(String::new());
    }

    // Anomalies
    if !report.anomalies.is_empty() {
        lines.push("=".repeat(80));
        lines.push("                         CAPTURE ANOMALIES".to_string());
        lines.push("=".repeat(80));
        lines.push(String::new());

        for findings in &report.anomalies {
            lines.push(format!(
                "{} vs {}:",
                findings.attack_scenario, findings.baseline_scenario
            ));
            let messages = findings.messages();
            if messages.is_empty() {
                lines.push("  No significant anomalies detected.".to_string());
            }
            for message in messages {
                lines.push(format!("  - {}", message));
            }
            lines.push(String::new());
        }
    }

    // Footer
    lines.push("=".repeat(80));
    lines.join("\n")
}

/// Generate human-readable text report
pub fn generate_text_report(report: &ComparisonReport, output_path: &Path) -> Result<()> {
    let content = render_text_report(report);
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Write both reports into `output_dir`
pub fn write_reports(report: &ComparisonReport, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    generate_json_report(report, &output_dir.join(JSON_REPORT_NAME))?;
    generate_text_report(report, &output_dir.join(TEXT_REPORT_NAME))?;
    Ok(())
}

/// Print a summary to stdout
pub fn print_summary(report: &ComparisonReport) {
    println!("\n=== RPL METRICS COMPARISON SUMMARY ===\n");
    println!("Scenarios: {}", report.metadata.scenario_count);

    for scenario in &report.scenarios {
        println!("\n{} ({}):", scenario.name, scenario.kind);
        for (name, unit, value) in scenario.metrics.rows() {
            if unit.is_empty() {
                println!("  {}: {:.2}", name, value);
            } else {
                println!("  {}: {:.2} {}", name, value, unit);
            }
        }
    }

    for findings in &report.anomalies {
        let messages = findings.messages();
        if !messages.is_empty() {
            println!("\nAnomalies in {}:", findings.attack_scenario);
            for message in messages {
                println!("  - {}", message);
            }
        }
    }

    println!();
}
