//! Metric formulas and the per-scenario merge.
//!
//! The parsers fill [`PartialMetrics`] with the fields they own. Merging is
//! last-writer-wins per field and never recomputes a metric; the canonical
//! [`ScenarioMetrics`] is built once from the merged partial.

use super::types::*;

/// Link-quality value meaning "no extra path cost"
pub const DEFAULT_LINK_QUALITY: f64 = 1.0;

/// Floor for observation durations in seconds
pub const MIN_DURATION_SECS: f64 = 1.0;

/// Floor for the node count used to normalize overhead
pub const MIN_NODE_COUNT: usize = 1;

/// Delivery ratio in percent, 0 when nothing was sent.
///
/// Clamped to [0, 100]: with rebroadcasts one send can be received many times.
pub fn delivery_ratio(sent: u64, received: u64) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    (received as f64 / sent as f64 * 100.0).clamp(0.0, 100.0)
}

/// Average delay in milliseconds pairing the i-th receive with the i-th send.
///
/// The traces carry no sequence numbers, so this is a file-order
/// approximation rather than a per-packet round trip.
pub fn paired_delay_ms(send_times: &[SimTime], recv_times: &[SimTime]) -> f64 {
    if recv_times.is_empty() {
        return 0.0;
    }
    let n = recv_times.len();
    let recv_sum: f64 = recv_times.iter().sum();
    let send_sum: f64 = send_times.iter().take(n).sum();
    (recv_sum - send_sum) / n as f64 * 1000.0
}

/// Span between the earliest and latest timestamp, floored at [`MIN_DURATION_SECS`]
pub fn observation_duration<I>(times: I) -> f64
where
    I: IntoIterator<Item = SimTime>,
{
    let mut bounds: Option<(f64, f64)> = None;
    for t in times {
        bounds = Some(match bounds {
            Some((lo, hi)) => (lo.min(t), hi.max(t)),
            None => (t, t),
        });
    }
    match bounds {
        Some((lo, hi)) => (hi - lo).max(MIN_DURATION_SECS),
        None => MIN_DURATION_SECS,
    }
}

/// Mean of `values`, or `default` when there are none
pub fn mean_or(values: &[f64], default: f64) -> f64 {
    if values.is_empty() {
        default
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Control messages per node, with the node count floored at [`MIN_NODE_COUNT`]
pub fn per_node(count: u64, nodes: usize) -> f64 {
    count as f64 / nodes.max(MIN_NODE_COUNT) as f64
}

impl PartialMetrics {
    /// Overlay `later` on `self`: any field `later` sets wins, unset fields keep ours
    pub fn merge(self, later: PartialMetrics) -> PartialMetrics {
        PartialMetrics {
            pdr: later.pdr.or(self.pdr),
            avg_delay_ms: later.avg_delay_ms.or(self.avg_delay_ms),
            overhead_packets: later.overhead_packets.or(self.overhead_packets),
            energy_consumption: later.energy_consumption.or(self.energy_consumption),
            throughput: later.throughput.or(self.throughput),
            avg_link_quality: later.avg_link_quality.or(self.avg_link_quality),
        }
    }
}

impl ScenarioMetrics {
    /// Build the canonical record from a fully merged partial
    pub fn from_partial(partial: &PartialMetrics) -> Self {
        let non_negative = |v: Option<f64>| v.filter(|x| x.is_finite()).unwrap_or(0.0).max(0.0);
        Self {
            pdr: non_negative(partial.pdr).min(100.0),
            avg_delay_ms: non_negative(partial.avg_delay_ms),
            overhead_packets: non_negative(partial.overhead_packets),
            energy_consumption: non_negative(partial.energy_consumption),
            throughput: non_negative(partial.throughput),
            avg_link_quality: partial
                .avg_link_quality
                .filter(|x| x.is_finite() && *x >= 0.0)
                .unwrap_or(DEFAULT_LINK_QUALITY),
        }
    }
}

/// Merge partial metrics in order (later parts win) into one scenario record
pub fn aggregate<'a, I>(parts: I) -> ScenarioMetrics
where
    I: IntoIterator<Item = &'a PartialMetrics>,
{
    let merged = parts
        .into_iter()
        .fold(PartialMetrics::default(), |acc, part| acc.merge(*part));
    ScenarioMetrics::from_partial(&merged)
}
