//! RPL metrics comparison CLI.
//!
//! Parses packet captures and simulation logs for the configured scenarios
//! and reports delivery, delay, overhead, energy, throughput and ETX.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};

use rpl_metrics::analysis;
use rpl_metrics::config::Config;
use rpl_metrics::{config_loader, orchestrator};

#[derive(Parser, Debug)]
#[command(name = "rpl-metrics")]
#[command(about = "Performance metrics comparison for RPL mesh simulations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the analysis configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory for reports (overrides output.dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Compute all metrics for every scenario and write the reports
    Compare {
        /// Do not print the summary to stdout
        #[arg(long)]
        quiet: bool,
    },

    /// Compare attack captures against the baseline capture only
    Anomalies,

    /// Show the resolved inputs without parsing them
    Summary,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Load errors surface through color-eyre, so logging can wait for the configured level
    let mut config = config_loader::load_config(&cli.config)?;
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.general.log_level.clone());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&log_level)).init();
    log::debug!("Loaded configuration from {}", cli.config.display());

    if let Some(output) = &cli.output {
        config.output.dir = output.clone();
    }

    // Set thread pool size
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Compare { quiet } => {
            let report = orchestrator::run_comparison(&config, &cli.config)?;
            analysis::write_reports(&report, &config.output.dir)?;
            if !quiet {
                analysis::print_summary(&report);
            }
        }
        Commands::Anomalies => {
            let findings = orchestrator::run_anomalies(&config)?;
            if findings.is_empty() {
                println!("No attack/baseline capture pairs to compare.");
            }
            for f in &findings {
                println!("{} vs {}:", f.attack_scenario, f.baseline_scenario);
                let messages = f.messages();
                if messages.is_empty() {
                    println!("  No significant anomalies detected.");
                }
                for message in messages {
                    println!("  - {}", message);
                }
            }
        }
        Commands::Summary => print_inputs(&config),
    }

    Ok(())
}

fn print_inputs(config: &Config) {
    println!("\n=== CONFIGURED SCENARIOS ===\n");
    println!("Base directory: {}", config.base_dir().display());
    println!("Decoder: {:?}", config.capture.decoder);
    println!("Decode timeout: {:?}", config.general.decode_timeout);
    println!("Output: {}", config.output.dir.display());

    for scenario in &config.scenarios {
        println!("\n{} ({}):", scenario.name, scenario.kind);
        match &scenario.capture {
            Some(capture) => {
                let path = config.resolve_path(capture);
                let marker = if path.is_file() { "" } else { " [missing]" };
                println!("  Capture: {}{}", path.display(), marker);
            }
            None => println!("  Capture: none (log events correlated)"),
        }
        let log_path = config.resolve_path(&scenario.log);
        let marker = if log_path.is_file() { "" } else { " [missing]" };
        println!("  Log: {}{}", log_path.display(), marker);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_compare() {
        let cli = Cli::parse_from(["rpl-metrics", "--config", "rpl.yaml", "-j", "4", "compare"]);
        assert_eq!(cli.config, PathBuf::from("rpl.yaml"));
        assert_eq!(cli.threads, 4);
        assert_eq!(cli.command, Commands::Compare { quiet: false });
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "rpl-metrics",
            "-c",
            "rpl.yaml",
            "--output",
            "out",
            "--log-level",
            "debug",
            "anomalies",
        ]);
        assert_eq!(cli.output, Some(PathBuf::from("out")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.command, Commands::Anomalies);
    }

    #[test]
    fn test_cli_requires_config() {
        assert!(Cli::try_parse_from(["rpl-metrics", "summary"]).is_err());
    }
}
