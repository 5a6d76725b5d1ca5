//! Capture-based delivery metrics.
//!
//! Every record with a network-layer header is a send. A record whose
//! ICMPv6 type is in the accepted-reply set is additionally a receive. From
//! those two timestamp lists come PDR, the file-order delay approximation and
//! throughput. The same pass folds each record into a [`CaptureProfile`].

use std::path::Path;
use std::time::{Duration, Instant};

use super::aggregate::{delivery_ratio, observation_duration, paired_delay_ms};
use super::profile::CaptureProfile;
use super::types::*;
use crate::capture::CaptureDecoder;
use crate::config::{CaptureConfig, GeneralConfig};
use crate::error::{RecordError, TraceError};

/// Capture parsing settings
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// ICMPv6 types that count as delivered replies
    pub accepted_reply_codes: Vec<u8>,
    /// Upper bound for one capture file
    pub decode_timeout: Duration,
}

impl CaptureSettings {
    pub fn from_config(capture: &CaptureConfig, general: &GeneralConfig) -> Self {
        Self {
            accepted_reply_codes: capture.accepted_reply_codes.clone(),
            decode_timeout: general.decode_timeout,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default(), &GeneralConfig::default())
    }
}

#[derive(Default)]
struct PacketAccumulator {
    send_times: Vec<SimTime>,
    recv_times: Vec<SimTime>,
    stats: CaptureStats,
    profile: CaptureProfile,
}

impl PacketAccumulator {
    fn observe(&mut self, record: &PacketRecord, accepted: &[u8]) {
        self.stats.records += 1;
        self.profile.observe(record);

        if !record.has_network_header {
            return;
        }
        let ts = record.timestamp;
        self.stats.sent += 1;
        self.send_times.push(ts);

        if record.control_type().is_some_and(|t| accepted.contains(&t)) {
            self.stats.received += 1;
            self.recv_times.push(ts);
        }
    }

    fn skip(&mut self, err: &RecordError) {
        self.stats.skipped_records += 1;
        log::debug!("Skipping capture record: {}", err);
    }

    fn finish(self) -> CaptureSummary {
        // window spans sends and receives only, link-layer frames do not widen it
        let duration = observation_duration(
            self.send_times
                .iter()
                .chain(&self.recv_times)
                .copied()
                .filter(|t| t.is_finite()),
        );
        let metrics = PartialMetrics {
            pdr: Some(delivery_ratio(self.stats.sent, self.stats.received)),
            avg_delay_ms: Some(paired_delay_ms(&self.send_times, &self.recv_times)),
            throughput: Some(self.stats.received as f64 / duration),
            ..Default::default()
        };
        CaptureSummary {
            metrics,
            stats: self.stats,
            profile: self.profile,
        }
    }
}

impl CaptureSummary {
    /// Neutral record for a capture that could not be read
    pub fn fallback() -> Self {
        CaptureSummary {
            metrics: PartialMetrics {
                pdr: Some(0.0),
                avg_delay_ms: Some(0.0),
                throughput: Some(0.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Fold already decoded records into capture metrics
pub fn summarize_records<I>(records: I, accepted_reply_codes: &[u8]) -> CaptureSummary
where
    I: IntoIterator<Item = Result<PacketRecord, RecordError>>,
{
    let mut acc = PacketAccumulator::default();
    for record in records {
        match record {
            Ok(record) => acc.observe(&record, accepted_reply_codes),
            Err(e) => acc.skip(&e),
        }
    }
    acc.finish()
}

fn try_parse_capture(
    path: &Path,
    decoder: &dyn CaptureDecoder,
    settings: &CaptureSettings,
) -> Result<CaptureSummary, TraceError> {
    if !path.is_file() {
        return Err(TraceError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let started = Instant::now();
    let mut acc = PacketAccumulator::default();
    for record in decoder.decode(path)? {
        if started.elapsed() > settings.decode_timeout {
            return Err(TraceError::Timeout {
                path: path.to_path_buf(),
                limit: settings.decode_timeout,
            });
        }
        match record {
            Ok(record) => acc.observe(&record, &settings.accepted_reply_codes),
            Err(e) => acc.skip(&e),
        }
    }

    if acc.stats.skipped_records > 0 {
        log::info!(
            "Skipped {} undecodable records in {}",
            acc.stats.skipped_records,
            path.display()
        );
    }
    Ok(acc.finish())
}

/// Derive delivery ratio, delay and throughput from one capture file.
///
/// Never fails: a missing or unreadable capture, a decoder that cannot start
/// or a decode that overruns its time bound all yield
/// [`CaptureSummary::fallback`] and a warning.
pub fn parse_capture_file(
    path: &Path,
    decoder: &dyn CaptureDecoder,
    settings: &CaptureSettings,
) -> CaptureSummary {
    match try_parse_capture(path, decoder, settings) {
        Ok(summary) => {
            log::debug!(
                "{}: {} records, {} sent, {} received",
                path.display(),
                summary.stats.records,
                summary.stats.sent,
                summary.stats.received
            );
            summary
        }
        Err(e) => {
            log::warn!("Failed to parse capture {}: {}", path.display(), e);
            CaptureSummary::fallback()
        }
    }
}
