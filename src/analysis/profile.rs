//! Capture profiles and attack-vs-baseline anomaly detection.
//!
//! A profile is folded from the same records as the delivery metrics: packets
//! per node, frame lengths, frame-head prefixes, packets per second and the
//! RPL control breakdown.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::types::PacketRecord;

/// ICMPv6 type carrying RPL control messages
pub const RPL_CONTROL_TYPE: u8 = 155;

/// Bytes of the frame head compared between scenarios
pub const HEAD_PREFIX_LEN: usize = 4;

/// Standard deviations above the mean that flag a node as a spike
pub const SPIKE_SIGMA: f64 = 3.0;

/// How many unique prefixes a finding lists
const MAX_REPORTED_PREFIXES: usize = 10;

/// Name of an RPL control message by ICMPv6 code
pub fn rpl_message_name(code: u8) -> &'static str {
    match code {
        0x00 => "DIS",
        0x01 => "DIO",
        0x02 => "DAO",
        0x03 => "DAO-ACK",
        0x80 => "Secure DIS",
        0x81 => "Secure DIO",
        0x82 => "Secure DAO",
        0x83 => "Secure DAO-ACK",
        0x8A => "Consistency Check",
        _ => "Unknown",
    }
}

/// Traffic profile of one capture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureProfile {
    pub records: usize,
    pub packets_per_node: BTreeMap<u32, usize>,
    /// Frame length -> number of frames
    pub frame_lengths: BTreeMap<usize, usize>,
    /// Hex of the first bytes of each frame
    pub head_prefixes: BTreeSet<String>,
    /// Whole second -> number of frames
    pub packets_per_second: BTreeMap<i64, usize>,
    /// RPL message name -> count
    pub control_messages: BTreeMap<String, usize>,
}

impl CaptureProfile {
    pub fn observe(&mut self, record: &PacketRecord) {
        self.records += 1;

        if let Some(node) = record.node_id {
            *self.packets_per_node.entry(node).or_insert(0) += 1;
        }
        *self.frame_lengths.entry(record.frame_len).or_insert(0) += 1;
        if !record.head.is_empty() {
            self.head_prefixes.insert(hex_prefix(&record.head));
        }
        if record.timestamp.is_finite() {
            *self.packets_per_second.entry(record.timestamp.floor() as i64).or_insert(0) += 1;
        }
        if let Some(control) = record.control.filter(|c| c.msg_type == RPL_CONTROL_TYPE) {
            *self
                .control_messages
                .entry(rpl_message_name(control.code).to_string())
                .or_insert(0) += 1;
        }
    }

    /// Busiest whole second and its frame count; the earliest wins a tie
    pub fn peak_second(&self) -> Option<(i64, usize)> {
        self.packets_per_second
            .iter()
            .fold(None, |peak: Option<(i64, usize)>, (&sec, &count)| match peak {
                Some((_, best)) if best >= count => peak,
                _ => Some((sec, count)),
            })
    }

    /// Report lines: node and rate summary, then the RPL control breakdown
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Profile: {} frames from {} nodes",
            self.records,
            self.packets_per_node.len()
        )];
        if let Some((sec, count)) = self.peak_second() {
            lines.push(format!("Peak rate: {} pkts/s at t={}s", count, sec));
        }
        if !self.packets_per_node.is_empty() {
            let nodes: Vec<String> = self
                .packets_per_node
                .iter()
                .map(|(node, count)| format!("{}={}", node, count))
                .collect();
            lines.push(format!("Packets per node: {}", nodes.join(", ")));
        }
        let control = if self.control_messages.is_empty() {
            "none".to_string()
        } else {
            self.control_messages
                .iter()
                .map(|(name, count)| format!("{} {}", name, count))
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(format!("RPL control: {}", control));
        lines
    }
}

fn hex_prefix(head: &[u8]) -> String {
    head.iter()
        .take(HEAD_PREFIX_LEN)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Differences between an attack capture and the baseline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFindings {
    pub attack_scenario: String,
    pub baseline_scenario: String,
    /// Nodes sending more than mean + 3 sigma packets under attack
    pub spike_nodes: Vec<u32>,
    pub unique_frame_lengths: Vec<usize>,
    pub unique_head_prefixes: Vec<String>,
}

impl AnomalyFindings {
    pub fn is_empty(&self) -> bool {
        self.spike_nodes.is_empty()
            && self.unique_frame_lengths.is_empty()
            && self.unique_head_prefixes.is_empty()
    }

    /// Human-readable findings, one per line
    pub fn messages(&self) -> Vec<String> {
        let mut messages = Vec::new();
        if !self.spike_nodes.is_empty() {
            messages.push(format!("Spike in packet count for nodes: {:?}", self.spike_nodes));
        }
        if !self.unique_frame_lengths.is_empty() {
            messages.push(format!(
                "Payload lengths unique to attack: {:?}",
                self.unique_frame_lengths
            ));
        }
        if !self.unique_head_prefixes.is_empty() {
            messages.push(format!(
                "Payload prefixes unique to attack: {:?}",
                self.unique_head_prefixes
            ));
        }
        messages
    }
}

/// Nodes whose packet count exceeds mean + [`SPIKE_SIGMA`] sample standard deviations
pub fn spike_nodes(packets_per_node: &BTreeMap<u32, usize>) -> Vec<u32> {
    let n = packets_per_node.len();
    if n < 2 {
        return Vec::new();
    }
    let counts: Vec<f64> = packets_per_node.values().map(|&c| c as f64).collect();
    let mean = counts.iter().sum::<f64>() / n as f64;
    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let threshold = mean + SPIKE_SIGMA * variance.sqrt();

    packets_per_node
        .iter()
        .filter(|(_, &count)| count as f64 > threshold)
        .map(|(&node, _)| node)
        .collect()
}

/// Compare an attack profile against a baseline profile
pub fn detect_anomalies(
    attack_name: &str,
    attack: &CaptureProfile,
    baseline_name: &str,
    baseline: &CaptureProfile,
) -> AnomalyFindings {
    let unique_frame_lengths = attack
        .frame_lengths
        .keys()
        .filter(|len| !baseline.frame_lengths.contains_key(len))
        .copied()
        .collect();

    let unique_head_prefixes = attack
        .head_prefixes
        .difference(&baseline.head_prefixes)
        .take(MAX_REPORTED_PREFIXES)
        .cloned()
        .collect();

    AnomalyFindings {
        attack_scenario: attack_name.to_string(),
        baseline_scenario: baseline_name.to_string(),
        spike_nodes: spike_nodes(&attack.packets_per_node),
        unique_frame_lengths,
        unique_head_prefixes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::ControlHeader;

    fn record(node: u32, ts: f64, len: usize, head: &[u8]) -> PacketRecord {
        PacketRecord {
            timestamp: ts,
            node_id: Some(node),
            has_network_header: true,
            control: None,
            frame_len: len,
            head: head.to_vec(),
        }
    }

    #[test]
    fn test_profile_observe() {
        let mut profile = CaptureProfile::default();
        profile.observe(&record(1, 10.2, 60, &[0x41, 0xd8, 0x01, 0xcd, 0xab]));
        profile.observe(&record(1, 10.9, 60, &[0x41, 0xd8, 0x01, 0xcd]));
        let mut dio = record(2, 11.0, 80, &[0x61, 0xdc]);
        dio.control = Some(ControlHeader { msg_type: 155, code: 1 });
        profile.observe(&dio);

        assert_eq!(profile.records, 3);
        assert_eq!(profile.packets_per_node.get(&1), Some(&2));
        assert_eq!(profile.frame_lengths.get(&60), Some(&2));
        assert!(profile.head_prefixes.contains("41d801cd"));
        assert!(profile.head_prefixes.contains("61dc"));
        assert_eq!(profile.packets_per_second.get(&10), Some(&2));
        assert_eq!(profile.control_messages.get("DIO"), Some(&1));
    }

    #[test]
    fn test_profile_summary_lines() {
        let mut profile = CaptureProfile::default();
        profile.observe(&record(1, 3.1, 60, &[]));
        profile.observe(&record(2, 4.2, 60, &[]));
        profile.observe(&record(2, 4.7, 60, &[]));
        let mut dao = record(1, 5.0, 80, &[]);
        dao.control = Some(ControlHeader { msg_type: 155, code: 2 });
        profile.observe(&dao);

        assert_eq!(profile.peak_second(), Some((4, 2)));
        let lines = profile.summary_lines();
        assert_eq!(lines[0], "Profile: 4 frames from 2 nodes");
        assert_eq!(lines[1], "Peak rate: 2 pkts/s at t=4s");
        assert_eq!(lines[2], "Packets per node: 1=2, 2=2");
        assert_eq!(lines[3], "RPL control: DAO 1");

        let empty = CaptureProfile::default();
        assert_eq!(empty.peak_second(), None);
        assert_eq!(
            empty.summary_lines(),
            vec!["Profile: 0 frames from 0 nodes", "RPL control: none"]
        );
    }

    #[test]
    fn test_spike_nodes() {
        let mut counts: BTreeMap<u32, usize> = (1..=20).map(|n| (n, 10)).collect();
        counts.insert(21, 500);
        assert_eq!(spike_nodes(&counts), vec![21]);

        let flat: BTreeMap<u32, usize> = (1..=5).map(|n| (n, 7)).collect();
        assert!(spike_nodes(&flat).is_empty());

        let single: BTreeMap<u32, usize> = [(1, 1000)].into_iter().collect();
        assert!(spike_nodes(&single).is_empty());
    }

    #[test]
    fn test_detect_anomalies() {
        let mut baseline = CaptureProfile::default();
        baseline.observe(&record(1, 0.0, 60, &[1, 2, 3, 4]));
        baseline.observe(&record(2, 0.5, 70, &[5, 6, 7, 8]));

        let mut attack = CaptureProfile::default();
        attack.observe(&record(1, 0.0, 60, &[1, 2, 3, 4]));
        attack.observe(&record(3, 0.5, 127, &[9, 9, 9, 9]));

        let findings = detect_anomalies("with_attack", &attack, "without_attack", &baseline);
        assert_eq!(findings.unique_frame_lengths, vec![127]);
        assert_eq!(findings.unique_head_prefixes, vec!["09090909".to_string()]);
        assert!(findings.spike_nodes.is_empty());
        assert_eq!(findings.messages().len(), 2);
        assert!(!findings.is_empty());
    }

    #[test]
    fn test_identical_profiles_have_no_findings() {
        let mut profile = CaptureProfile::default();
        profile.observe(&record(1, 0.0, 60, &[1, 2, 3, 4]));
        let findings = detect_anomalies("a", &profile, "b", &profile);
        assert!(findings.is_empty());
        assert!(findings.messages().is_empty());
    }
}
