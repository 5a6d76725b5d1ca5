//! Core data types for RPL trace analysis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::profile::{AnomalyFindings, CaptureProfile};
use crate::config::ScenarioKind;

/// Trace timestamp in seconds (capture epoch time, or simulation time for logs)
pub type SimTime = f64;

/// Energy evidence found on a log line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EnergySignal {
    /// Explicit "Total energy: N" report, replaces the running score
    Total(f64),
    /// Transmit and receive markers on the same line, adds one unit
    RadioActivity,
}

/// What a trace event represents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Send,
    Receive,
    ControlMessage,
    EnergySample(EnergySignal),
    LinkQualitySample(f64),
    NodeAnnounce(u32),
}

/// A discrete event extracted from one log line.
///
/// Events borrow the line they came from and are folded into accumulators
/// immediately; nothing keeps them past the line.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent<'a> {
    pub timestamp: Option<SimTime>,
    pub node_id: Option<u32>,
    pub kind: EventKind,
    pub raw: &'a str,
}

/// One line of a simulation log with its extracted prefix fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogLine<'a> {
    pub text: &'a str,
    pub timestamp: Option<SimTime>,
    pub node_id: Option<u32>,
}

impl<'a> LogLine<'a> {
    /// Build an event of `kind` that inherits this line's timestamp and node
    pub fn event(&self, kind: EventKind) -> TraceEvent<'a> {
        TraceEvent {
            timestamp: self.timestamp,
            node_id: self.node_id,
            kind,
            raw: self.text,
        }
    }
}

/// Control-layer (ICMPv6) header of a capture record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlHeader {
    /// ICMPv6 type; 155 carries RPL control messages
    pub msg_type: u8,
    pub code: u8,
}

/// A decoded capture entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketRecord {
    pub timestamp: SimTime,
    pub node_id: Option<u32>,
    pub has_network_header: bool,
    pub control: Option<ControlHeader>,
    /// Captured frame length in bytes
    pub frame_len: usize,
    /// Leading bytes of the frame, empty when the decoder does not expose them
    pub head: Vec<u8>,
}

impl PacketRecord {
    pub fn has_control_header(&self) -> bool {
        self.control.is_some()
    }

    pub fn control_type(&self) -> Option<u8> {
        self.control.map(|c| c.msg_type)
    }
}

/// Partial metrics produced by one parser.
///
/// Every parser fills only the fields it owns; the aggregator merges the
/// partials with last-writer-wins semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_delay_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overhead_packets: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_consumption: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_link_quality: Option<f64>,
}

/// Canonical per-scenario metrics record.
///
/// Only the aggregator constructs it; fields are read through accessors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    pub(crate) pdr: f64,
    pub(crate) avg_delay_ms: f64,
    pub(crate) overhead_packets: f64,
    pub(crate) energy_consumption: f64,
    pub(crate) throughput: f64,
    pub(crate) avg_link_quality: f64,
}

impl ScenarioMetrics {
    /// Packet delivery ratio in percent
    pub fn pdr(&self) -> f64 {
        self.pdr
    }

    /// Average end-to-end delay in milliseconds
    pub fn avg_delay_ms(&self) -> f64 {
        self.avg_delay_ms
    }

    /// Control messages per node
    pub fn overhead_packets(&self) -> f64 {
        self.overhead_packets
    }

    pub fn energy_consumption(&self) -> f64 {
        self.energy_consumption
    }

    /// Received packets per second of observation
    pub fn throughput(&self) -> f64 {
        self.throughput
    }

    /// Average ETX
    pub fn avg_link_quality(&self) -> f64 {
        self.avg_link_quality
    }

    /// The six metrics as (name, unit, value) rows, in report order
    pub fn rows(&self) -> [(&'static str, &'static str, f64); 6] {
        [
            ("PDR", "%", self.pdr),
            ("Average End-to-End Delay", "ms", self.avg_delay_ms),
            ("Overhead Packets", "count", self.overhead_packets),
            ("Energy Consumption", "units", self.energy_consumption),
            ("Throughput", "pkts/sec", self.throughput),
            ("Average ETX", "", self.avg_link_quality),
        ]
    }
}

/// Counters from one capture parse pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    pub records: u64,
    pub skipped_records: u64,
    pub sent: u64,
    pub received: u64,
}

/// Result of parsing one capture file
#[derive(Debug, Clone, Default)]
pub struct CaptureSummary {
    pub metrics: PartialMetrics,
    pub stats: CaptureStats,
    pub profile: CaptureProfile,
}

/// Counters from one log parse pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStats {
    pub lines: u64,
    pub timestamped_lines: u64,
    pub distinct_nodes: usize,
    pub control_messages: u64,
    pub link_quality_samples: usize,
}

/// Result of parsing one log file
#[derive(Debug, Clone, Default)]
pub struct LogSummary {
    pub metrics: PartialMetrics,
    pub stats: LogStats,
    /// Log lines per whole second of simulation time
    pub timeline: BTreeMap<u64, usize>,
}

/// Counters from correlating discrete send/receive log events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationStats {
    pub sent: u64,
    pub received: u64,
    pub paired: u64,
    pub unmatched_receives: u64,
}

/// Result of the log-only send/receive correlation path
#[derive(Debug, Clone, Default)]
pub struct CorrelationSummary {
    pub metrics: PartialMetrics,
    pub stats: CorrelationStats,
}

/// Per-scenario section of the comparison report
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub kind: ScenarioKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_path: Option<String>,
    pub log_path: String,
    pub metrics: ScenarioMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_stats: Option<CaptureStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_stats: Option<CorrelationStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_profile: Option<CaptureProfile>,
    pub log_stats: LogStats,
    pub log_timeline: BTreeMap<u64, usize>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub analysis_timestamp: String,
    pub config_path: String,
    pub decoder: String,
    pub scenario_count: usize,
}

/// Complete comparison report handed to the reporter
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub metadata: ReportMetadata,
    pub scenarios: Vec<ScenarioReport>,
    pub anomalies: Vec<AnomalyFindings>,
}
