//! Log parsing for Cooja log listener output.
//!
//! Scans line-oriented simulation logs for node announcements, link-quality
//! samples, RPL control messages and energy evidence. Every extractor runs
//! independently on each line; a line that does not parse is simply skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::aggregate::{mean_or, per_node, DEFAULT_LINK_QUALITY};
use super::types::*;
use crate::config::LogConfig;
use crate::error::TraceError;

/// Patterns with a fixed shape, independent of configuration
pub struct LinePatterns {
    /// Match: "01:23.456" at line start (minutes:seconds)
    pub timestamp: Regex,
    /// Match: "83456\tID:2" raw millisecond timestamp at line start
    pub raw_millis: Regex,
    /// Match: "ID:2" node tag
    pub node_tag: Regex,
    /// Match: "Node id is set to 2"
    pub node_announce: Regex,
    /// Match: "Total energy: 12.5"
    pub total_energy: Regex,
}

impl LinePatterns {
    pub fn new() -> Self {
        Self {
            timestamp: Regex::new(r"^\s*(\d+):(\d+(?:\.\d+)?)")
                .expect("Invalid timestamp regex"),
            raw_millis: Regex::new(r"^\s*(\d+)\s+ID:\d+")
                .expect("Invalid raw_millis regex"),
            node_tag: Regex::new(r"\bID:(\d+)")
                .expect("Invalid node_tag regex"),
            node_announce: Regex::new(r"Node id is set to (\d+)")
                .expect("Invalid node_announce regex"),
            total_energy: Regex::new(r"(?i)Total\s*energy:\s*(\d+\.?\d*)")
                .expect("Invalid total_energy regex"),
        }
    }
}

/// Global fixed patterns instance
pub static PATTERNS: LazyLock<LinePatterns> = LazyLock::new(LinePatterns::new);

/// Patterns built from the configured vocabulary
#[derive(Debug, Clone)]
pub struct LogPatterns {
    /// "<label>[:=]<number>", case-insensitive
    pub link_quality: Regex,
    /// Whole-word control frame names, optionally prefixed by the protocol name
    pub control_frame: Regex,
    pub transport_marker: Regex,
    /// Protocol name, or its reserved code as a whole word
    pub protocol_ref: Regex,
    pub send_event: Regex,
    pub receive_event: Regex,
    pub tx_marker: String,
    pub rx_marker: String,
}

impl LogPatterns {
    pub fn new(config: &LogConfig) -> Result<Self, regex::Error> {
        let frames = config
            .control_frames
            .iter()
            .map(|f| regex::escape(f.trim()))
            .collect::<Vec<_>>()
            .join("|");
        let name = regex::escape(&config.protocol_name);

        Ok(Self {
            link_quality: Regex::new(&format!(
                r"(?i){}\s*[:=]\s*(\d+\.?\d*)",
                regex::escape(&config.link_quality_label)
            ))?,
            control_frame: Regex::new(&format!(r"(?i)\b(?:{}\s*)?(?:{})\b", name, frames))?,
            transport_marker: Regex::new(&format!("(?i){}", regex::escape(&config.transport_marker)))?,
            protocol_ref: Regex::new(&format!(r"(?i){}|\b{}\b", name, config.protocol_code))?,
            send_event: Regex::new(&format!("(?i){}", regex::escape(&config.send_marker)))?,
            receive_event: Regex::new(&format!("(?i){}", regex::escape(&config.receive_marker)))?,
            tx_marker: config.tx_marker.clone(),
            rx_marker: config.rx_marker.clone(),
        })
    }

    /// Whole-word control frame, or transport marker next to the protocol name/code
    pub fn is_control_message(&self, text: &str) -> bool {
        self.control_frame.is_match(text)
            || (self.transport_marker.is_match(text) && self.protocol_ref.is_match(text))
    }
}

/// Parse the timestamp and node tag prefix of a log line
pub fn parse_line(text: &str) -> LogLine<'_> {
    let timestamp = parse_timestamp(text);
    let node_id = PATTERNS
        .node_tag
        .captures(text)
        .and_then(|caps| caps.get(1)?.as_str().parse().ok());
    LogLine {
        text,
        timestamp,
        node_id,
    }
}

/// Parse a line-start timestamp to seconds.
///
/// Formats: "mm:ss.mmm" and raw milliseconds followed by an "ID:" tag.
pub fn parse_timestamp(text: &str) -> Option<SimTime> {
    if let Some(caps) = PATTERNS.timestamp.captures(text) {
        let minutes: f64 = caps.get(1)?.as_str().parse().ok()?;
        let seconds: f64 = caps.get(2)?.as_str().parse().ok()?;
        return Some(minutes * 60.0 + seconds);
    }
    let caps = PATTERNS.raw_millis.captures(text)?;
    let millis: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(millis / 1000.0)
}

/// Run every extractor over one line, appending the events it yields
pub fn extract_events<'a>(line: &LogLine<'a>, patterns: &LogPatterns, out: &mut Vec<TraceEvent<'a>>) {
    let text = line.text;

    if let Some(caps) = PATTERNS.node_announce.captures(text) {
        match caps[1].parse::<u32>() {
            Ok(id) => out.push(line.event(EventKind::NodeAnnounce(id))),
            Err(_) => log::debug!("Skipping out-of-range node id '{}'", &caps[1]),
        }
    }

    if let Some(caps) = patterns.link_quality.captures(text) {
        match caps[1].parse::<f64>() {
            Ok(value) => out.push(line.event(EventKind::LinkQualitySample(value))),
            Err(_) => log::debug!("Skipping link-quality literal '{}'", &caps[1]),
        }
    }

    if patterns.is_control_message(text) {
        out.push(line.event(EventKind::ControlMessage));
    }

    if let Some(caps) = PATTERNS.total_energy.captures(text) {
        if let Ok(total) = caps[1].parse::<f64>() {
            out.push(line.event(EventKind::EnergySample(EnergySignal::Total(total))));
        }
    } else if text.contains(patterns.tx_marker.as_str()) && text.contains(patterns.rx_marker.as_str()) {
        out.push(line.event(EventKind::EnergySample(EnergySignal::RadioActivity)));
    }

    if patterns.send_event.is_match(text) {
        out.push(line.event(EventKind::Send));
    } else if patterns.receive_event.is_match(text) {
        out.push(line.event(EventKind::Receive));
    }
}

/// Stream a log file line by line.
///
/// Invalid UTF-8 is replaced rather than rejected. Returns the number of lines.
pub fn for_each_line<F>(path: &Path, mut f: F) -> Result<u64, TraceError>
where
    F: FnMut(LogLine<'_>),
{
    let file = File::open(path).map_err(|e| TraceError::io(path, e))?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut buf = Vec::new();
    let mut lines = 0;

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| TraceError::io(path, e))?;
        if n == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf);
        f(parse_line(text.trim_end_matches(['\r', '\n'])));
        lines += 1;
    }

    Ok(lines)
}

/// Running state of one log parse pass
#[derive(Debug, Default)]
struct LogAccumulator {
    node_ids: BTreeSet<u32>,
    link_quality: Vec<f64>,
    control_messages: u64,
    energy: f64,
    lines: u64,
    timestamped_lines: u64,
    timeline: BTreeMap<u64, usize>,
}

impl LogAccumulator {
    fn observe_line(&mut self, line: &LogLine<'_>, patterns: &LogPatterns) {
        let mut events = Vec::new();
        extract_events(line, patterns, &mut events);
        self.observe(line, &events);
    }

    fn observe(&mut self, line: &LogLine<'_>, events: &[TraceEvent<'_>]) {
        self.lines += 1;
        if let Some(ts) = line.timestamp {
            self.timestamped_lines += 1;
            *self.timeline.entry(ts.floor() as u64).or_insert(0) += 1;
        }

        for event in events {
            match event.kind {
                EventKind::NodeAnnounce(id) => {
                    self.node_ids.insert(id);
                }
                EventKind::LinkQualitySample(value) => self.link_quality.push(value),
                EventKind::ControlMessage => self.control_messages += 1,
                EventKind::EnergySample(EnergySignal::Total(total)) => self.energy = total,
                EventKind::EnergySample(EnergySignal::RadioActivity) => self.energy += 1.0,
                EventKind::Send | EventKind::Receive => {}
            }
        }
    }

    fn finish(self) -> LogSummary {
        let metrics = PartialMetrics {
            overhead_packets: Some(per_node(self.control_messages, self.node_ids.len())),
            energy_consumption: Some(self.energy),
            avg_link_quality: Some(mean_or(&self.link_quality, DEFAULT_LINK_QUALITY)),
            ..Default::default()
        };
        LogSummary {
            metrics,
            stats: LogStats {
                lines: self.lines,
                timestamped_lines: self.timestamped_lines,
                distinct_nodes: self.node_ids.len(),
                control_messages: self.control_messages,
                link_quality_samples: self.link_quality.len(),
            },
            timeline: self.timeline,
        }
    }
}

impl LogSummary {
    /// Neutral record for an unreadable log
    pub fn fallback() -> Self {
        LogSummary {
            metrics: PartialMetrics {
                overhead_packets: Some(0.0),
                energy_consumption: Some(0.0),
                avg_link_quality: Some(DEFAULT_LINK_QUALITY),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Derive overhead, energy and link quality from in-memory log text
pub fn summarize_log_text(text: &str, patterns: &LogPatterns) -> LogSummary {
    let mut acc = LogAccumulator::default();
    for raw in text.lines() {
        acc.observe_line(&parse_line(raw), patterns);
    }
    acc.finish()
}

fn try_parse_log_file(path: &Path, patterns: &LogPatterns) -> Result<LogSummary, TraceError> {
    let mut acc = LogAccumulator::default();
    for_each_line(path, |line| acc.observe_line(&line, patterns))?;
    Ok(acc.finish())
}

/// Parse one scenario log.
///
/// Never fails: an unreadable file yields [`LogSummary::fallback`] and a warning.
pub fn parse_log_file(path: &Path, patterns: &LogPatterns) -> LogSummary {
    match try_parse_log_file(path, patterns) {
        Ok(summary) => {
            log::debug!(
                "Parsed {}: {} lines, {} nodes, {} control messages",
                path.display(),
                summary.stats.lines,
                summary.stats.distinct_nodes,
                summary.stats.control_messages
            );
            summary
        }
        Err(e) => {
            log::warn!("Failed to parse log {}: {}", path.display(), e);
            LogSummary::fallback()
        }
    }
}
