//! Comparison orchestrator.
//!
//! This module coordinates one analysis run: it builds the decoder and log
//! patterns from the configuration, parses every scenario (in parallel when
//! enabled), merges each scenario's partial metrics, and compares attack
//! captures against the baseline.

use std::path::Path;

use color_eyre::eyre::{Context, Result};
use rayon::prelude::*;

use crate::analysis::aggregate::aggregate;
use crate::analysis::correlator::correlate_log_file;
use crate::analysis::log_trace::{parse_log_file, LogPatterns};
use crate::analysis::packet_trace::{parse_capture_file, CaptureSettings};
use crate::analysis::profile::{detect_anomalies, AnomalyFindings, CaptureProfile};
use crate::analysis::types::*;
use crate::capture::{build_decoder, CaptureDecoder};
use crate::config::{Config, ScenarioConfig, ScenarioKind};

/// Shared, read-only state for parsing the scenarios of one run
pub struct RunContext<'c> {
    config: &'c Config,
    decoder: Box<dyn CaptureDecoder>,
    settings: CaptureSettings,
    patterns: LogPatterns,
}

impl<'c> RunContext<'c> {
    pub fn new(config: &'c Config) -> Result<Self> {
        let patterns = LogPatterns::new(&config.log).context("Failed to compile log patterns")?;
        Ok(Self {
            config,
            decoder: build_decoder(&config.capture, config.general.decode_timeout),
            settings: CaptureSettings::from_config(&config.capture, &config.general),
            patterns,
        })
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    /// Parse one scenario's capture (or correlate its log) and its log
    pub fn run_scenario(&self, scenario: &ScenarioConfig) -> ScenarioReport {
        let log_path = self.config.resolve_path(&scenario.log);
        let capture_path = scenario.capture.as_deref().map(|p| self.config.resolve_path(p));
        log::info!("Analyzing scenario '{}' ({})", scenario.name, scenario.kind);

        let mut parts = Vec::with_capacity(2);
        let mut capture_stats = None;
        let mut correlation_stats = None;
        let mut capture_profile = None;

        match &capture_path {
            Some(path) => {
                let summary = parse_capture_file(path, self.decoder.as_ref(), &self.settings);
                parts.push(summary.metrics);
                capture_stats = Some(summary.stats);
                capture_profile = Some(summary.profile);
            }
            None => {
                let summary = correlate_log_file(&log_path, &self.patterns);
                parts.push(summary.metrics);
                correlation_stats = Some(summary.stats);
            }
        }

        // log partial last: its fields take precedence
        let log_summary = parse_log_file(&log_path, &self.patterns);
        parts.push(log_summary.metrics);
        let metrics = aggregate(&parts);

        log::info!(
            "Scenario '{}': PDR {:.2}%, delay {:.2} ms, overhead {:.2}, energy {:.2}, throughput {:.2} pkts/s, ETX {:.2}",
            scenario.name,
            metrics.pdr(),
            metrics.avg_delay_ms(),
            metrics.overhead_packets(),
            metrics.energy_consumption(),
            metrics.throughput(),
            metrics.avg_link_quality()
        );

        ScenarioReport {
            name: scenario.name.clone(),
            kind: scenario.kind,
            capture_path: capture_path.map(|p| p.display().to_string()),
            log_path: log_path.display().to_string(),
            metrics,
            capture_stats,
            correlation_stats,
            capture_profile,
            log_stats: log_summary.stats,
            log_timeline: log_summary.timeline,
        }
    }

    /// Profile one scenario's capture without touching its log
    pub fn profile_scenario(&self, scenario: &ScenarioConfig) -> Option<CaptureProfile> {
        let path = self.config.resolve_path(scenario.capture.as_deref()?);
        Some(parse_capture_file(&path, self.decoder.as_ref(), &self.settings).profile)
    }

    fn map_scenarios<T, F>(&self, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&ScenarioConfig) -> T + Sync + Send,
    {
        if self.config.general.parallel {
            self.config.scenarios.par_iter().map(f).collect()
        } else {
            self.config.scenarios.iter().map(f).collect()
        }
    }
}

/// Compare every attack scenario's profile against the first baseline's.
///
/// `profiles` is indexed like `config.scenarios`.
pub fn compare_profiles(config: &Config, profiles: &[Option<&CaptureProfile>]) -> Vec<AnomalyFindings> {
    let baseline = config.baseline().and_then(|baseline| {
        let index = config.scenarios.iter().position(|s| std::ptr::eq(s, baseline))?;
        Some((baseline, (*profiles.get(index)?)?))
    });

    let Some((baseline, baseline_profile)) = baseline else {
        log::info!("No baseline capture configured, skipping anomaly detection");
        return Vec::new();
    };

    config
        .scenarios
        .iter()
        .zip(profiles)
        .filter(|(s, _)| s.kind == ScenarioKind::Attack)
        .filter_map(|(s, profile)| {
            Some(detect_anomalies(&s.name, (*profile)?, &baseline.name, baseline_profile))
        })
        .collect()
}

/// Run the full comparison described by `config`
pub fn run_comparison(config: &Config, config_path: &Path) -> Result<ComparisonReport> {
    let ctx = RunContext::new(config)?;
    log::info!(
        "Running {} scenarios with the {} decoder",
        config.scenarios.len(),
        ctx.decoder_name()
    );

    let scenarios = ctx.map_scenarios(|scenario| ctx.run_scenario(scenario));
    let profiles: Vec<_> = scenarios.iter().map(|s| s.capture_profile.as_ref()).collect();
    let anomalies = compare_profiles(config, &profiles);

    Ok(ComparisonReport {
        metadata: ReportMetadata {
            analysis_timestamp: chrono::Utc::now().to_rfc3339(),
            config_path: config_path.display().to_string(),
            decoder: ctx.decoder_name().to_string(),
            scenario_count: scenarios.len(),
        },
        scenarios,
        anomalies,
    })
}

/// Profile captures only and compare them
pub fn run_anomalies(config: &Config) -> Result<Vec<AnomalyFindings>> {
    let ctx = RunContext::new(config)?;
    let profiles = ctx.map_scenarios(|scenario| ctx.profile_scenario(scenario));
    let profiles: Vec<_> = profiles.iter().map(Option::as_ref).collect();
    Ok(compare_profiles(config, &profiles))
}
