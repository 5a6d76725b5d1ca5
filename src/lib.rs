//! # rpl-metrics - Performance metrics for RPL mesh simulations
//!
//! This library extracts network-performance metrics for the RPL low-power
//! routing protocol from packet captures and free-text simulation logs, and
//! compares a scenario under attack against a baseline.
//!
//! ## Overview
//!
//! Each scenario contributes an optional packet capture and a node log. The
//! capture yields delivery ratio, end-to-end delay and throughput; the log
//! yields control overhead, an energy score and the average ETX. Without a
//! capture, delivery metrics come from correlating the log's discrete
//! broadcast send/receive events instead.
//!
//! ## Metrics
//!
//! - **PDR**: received / sent × 100, 0 when nothing was sent
//! - **Average end-to-end delay**: milliseconds, i-th receive paired with i-th send
//! - **Overhead**: control messages per distinct node
//! - **Energy consumption**: last reported total, else TX/RX activity count
//! - **Throughput**: received packets per second of observation (at least 1 s)
//! - **Average ETX**: mean link-quality sample, 1.0 without samples
//!
//! ## Architecture
//!
//! - `config`: Analysis configuration structures and validation
//! - `config_loader`: YAML loading and path resolution
//! - `capture`: Capture decoders (native pcap with 6LoWPAN, external tshark)
//! - `analysis`: Trace parsers, event correlation, aggregation and reports
//! - `orchestrator`: Per-scenario runs and attack-vs-baseline comparison
//! - `error`: Per-file and per-record error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use rpl_metrics::{analysis, config_loader, orchestrator};
//!
//! let config = config_loader::load_config(Path::new("rpl.yaml"))?;
//! let report = orchestrator::run_comparison(&config, Path::new("rpl.yaml"))?;
//! analysis::write_reports(&report, &config.output.dir)?;
//! # Ok::<(), color_eyre::eyre::Report>(())
//! ```
//!
//! ## Error Handling
//!
//! Parsers never fail a run. An unreadable file produces a neutral fallback
//! record and a warning; a malformed record or line is skipped. Application
//! level functions return `color_eyre::Result`.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod orchestrator;

pub use analysis::types::{ComparisonReport, ScenarioMetrics};
pub use config::Config;
pub use error::{RecordError, TraceError};
