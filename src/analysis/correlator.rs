//! Send/receive correlation for logs without a packet capture.
//!
//! Broadcast floods are many-to-many, so strict 1:1 pairing is impossible.
//! Each receive consumes the most recent outstanding send (LIFO); a receive
//! with nothing outstanding still counts as delivered but adds no delay.

use std::path::Path;

use super::aggregate::{delivery_ratio, mean_or, observation_duration};
use super::log_trace::{extract_events, for_each_line, LogPatterns};
use super::types::*;
use crate::error::TraceError;

/// LIFO pairing of discrete send/receive events
#[derive(Debug, Default)]
pub struct EventCorrelator {
    outstanding: Vec<SimTime>,
    delays_ms: Vec<f64>,
    first_seen: Option<SimTime>,
    last_seen: Option<SimTime>,
    stats: CorrelationStats,
}

impl EventCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the observation window with a timestamped line
    pub fn observe_time(&mut self, ts: SimTime) {
        self.first_seen = Some(self.first_seen.map_or(ts, |t| t.min(ts)));
        self.last_seen = Some(self.last_seen.map_or(ts, |t| t.max(ts)));
    }

    /// Fold one event; kinds other than send and receive are ignored
    pub fn observe(&mut self, event: &TraceEvent<'_>) {
        match event.kind {
            EventKind::Send => {
                self.stats.sent += 1;
                if let Some(ts) = event.timestamp {
                    self.outstanding.push(ts);
                }
            }
            EventKind::Receive => {
                self.stats.received += 1;
                let Some(ts) = event.timestamp else {
                    self.stats.unmatched_receives += 1;
                    return;
                };
                match self.outstanding.pop() {
                    Some(sent_at) => {
                        self.delays_ms.push((ts - sent_at) * 1000.0);
                        self.stats.paired += 1;
                    }
                    None => self.stats.unmatched_receives += 1,
                }
            }
            _ => {}
        }
    }

    /// Sends not yet consumed by a receive
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn finish(self) -> CorrelationSummary {
        let duration = observation_duration(self.first_seen.into_iter().chain(self.last_seen));
        let metrics = PartialMetrics {
            pdr: Some(delivery_ratio(self.stats.sent, self.stats.received)),
            avg_delay_ms: Some(mean_or(&self.delays_ms, 0.0)),
            throughput: Some(self.stats.received as f64 / duration),
            ..Default::default()
        };
        CorrelationSummary {
            metrics,
            stats: self.stats,
        }
    }
}

impl CorrelationSummary {
    /// Neutral record for an unreadable log, same shape as the capture fallback
    pub fn fallback() -> Self {
        CorrelationSummary {
            metrics: PartialMetrics {
                pdr: Some(0.0),
                avg_delay_ms: Some(0.0),
                throughput: Some(0.0),
                ..Default::default()
            },
            stats: CorrelationStats::default(),
        }
    }
}

fn try_correlate_log_file(path: &Path, patterns: &LogPatterns) -> Result<CorrelationSummary, TraceError> {
    let mut correlator = EventCorrelator::new();
    for_each_line(path, |line| {
        if let Some(ts) = line.timestamp {
            correlator.observe_time(ts);
        }
        let mut events = Vec::new();
        extract_events(&line, patterns, &mut events);
        for event in &events {
            correlator.observe(event);
        }
    })?;

    if correlator.outstanding() > 0 {
        log::debug!("{} sends in {} were never received", correlator.outstanding(), path.display());
    }
    Ok(correlator.finish())
}

/// Derive delivery ratio, delay and throughput from a log's discrete events.
///
/// Never fails: an unreadable file yields [`CorrelationSummary::fallback`].
pub fn correlate_log_file(path: &Path, patterns: &LogPatterns) -> CorrelationSummary {
    match try_correlate_log_file(path, patterns) {
        Ok(summary) => summary,
        Err(e) => {
            log::warn!("Failed to correlate events in {}: {}", path.display(), e);
            CorrelationSummary::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn event(kind: EventKind, ts: Option<f64>) -> TraceEvent<'static> {
        TraceEvent {
            timestamp: ts,
            node_id: None,
            kind,
            raw: "",
        }
    }

    #[test]
    fn test_lifo_pairing() {
        let mut c = EventCorrelator::new();
        c.observe(&event(EventKind::Send, Some(1.0)));
        c.observe(&event(EventKind::Send, Some(2.0)));
        // consumes the send at 2.0
        c.observe(&event(EventKind::Receive, Some(2.5)));
        // consumes the send at 1.0
        c.observe(&event(EventKind::Receive, Some(3.0)));
        assert_eq!(c.outstanding(), 0);

        let summary = c.finish();
        assert_eq!(summary.stats.paired, 2);
        // (500 + 2000) / 2
        assert_eq!(summary.metrics.avg_delay_ms, Some(1250.0));
        assert_eq!(summary.metrics.pdr, Some(100.0));
    }

    #[test]
    fn test_receive_without_send() {
        let mut c = EventCorrelator::new();
        c.observe(&event(EventKind::Receive, Some(1.0)));
        c.observe(&event(EventKind::Send, Some(2.0)));
        c.observe(&event(EventKind::Receive, Some(2.1)));

        let summary = c.finish();
        assert_eq!(summary.stats.received, 2);
        assert_eq!(summary.stats.unmatched_receives, 1);
        assert_eq!(summary.stats.paired, 1);
        let delay = summary.metrics.avg_delay_ms.unwrap();
        assert!((delay - 100.0).abs() < 1e-6);
        // two receives of one send clamp to 100%
        assert_eq!(summary.metrics.pdr, Some(100.0));
    }

    #[test]
    fn test_no_events() {
        let summary = EventCorrelator::new().finish();
        assert_eq!(summary.metrics.pdr, Some(0.0));
        assert_eq!(summary.metrics.avg_delay_ms, Some(0.0));
        assert_eq!(summary.metrics.throughput, Some(0.0));
    }

    #[test]
    fn test_correlate_log_file() {
        let log = "\
00:00.000\tID:1\tStarting
00:01.000\tID:1\tBroadcast message sent
00:01.050\tID:2\tBroadcast message received from 1
00:01.080\tID:3\tBroadcast message received from 1
00:02.000\tID:1\tBroadcast message sent
00:02.040\tID:2\tBroadcast message received from 1
00:03.000\tID:1\tBroadcast message sent
00:04.000\tID:2\tshutting down
";
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", log).unwrap();

        let patterns = LogPatterns::new(&LogConfig::default()).unwrap();
        let summary = correlate_log_file(file.path(), &patterns);
        assert_eq!(summary.stats.sent, 3);
        assert_eq!(summary.stats.received, 3);
        assert_eq!(summary.stats.paired, 2);
        assert_eq!(summary.stats.unmatched_receives, 1);
        assert_eq!(summary.metrics.pdr, Some(100.0));
        // duration 4 s
        assert_eq!(summary.metrics.throughput, Some(0.75));
        let delay = summary.metrics.avg_delay_ms.unwrap();
        assert!((delay - 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_correlate_missing_file() {
        let patterns = LogPatterns::new(&LogConfig::default()).unwrap();
        let summary = correlate_log_file(Path::new("/nonexistent/log.txt"), &patterns);
        assert_eq!(summary.metrics.pdr, Some(0.0));
        assert_eq!(summary.stats, CorrelationStats::default());
    }
}
