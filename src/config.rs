use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which side of the comparison a scenario is on
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    /// Simulation with the attacker node active
    Attack,
    /// Reference simulation without the attacker
    Baseline,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::Attack => write!(f, "With Attack"),
            ScenarioKind::Baseline => write!(f, "Without Attack"),
        }
    }
}

/// Capture decoding backend
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    /// External `tshark` field extraction
    Tshark,
    /// Built-in pcap reader
    Pcap,
}

/// Top-level analysis configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub log: LogConfig,
    pub scenarios: Vec<ScenarioConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.scenarios.is_empty() {
            return Err(ValidationError::InvalidScenario(
                "at least one scenario is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            if scenario.name.trim().is_empty() {
                return Err(ValidationError::InvalidScenario(
                    "scenario name cannot be empty".to_string(),
                ));
            }
            if !names.insert(scenario.name.as_str()) {
                return Err(ValidationError::InvalidScenario(format!(
                    "duplicate scenario name '{}'",
                    scenario.name
                )));
            }
            if scenario.log.as_os_str().is_empty() {
                return Err(ValidationError::InvalidScenario(format!(
                    "scenario '{}' has an empty log path",
                    scenario.name
                )));
            }
        }

        if self.general.decode_timeout.is_zero() {
            return Err(ValidationError::InvalidGeneral(
                "decode_timeout must be greater than zero".to_string(),
            ));
        }

        if self.capture.accepted_reply_codes.is_empty() {
            return Err(ValidationError::InvalidCapture(
                "accepted_reply_codes cannot be empty".to_string(),
            ));
        }
        if self.capture.decoder == DecoderKind::Tshark && self.capture.tshark_binary.is_empty() {
            return Err(ValidationError::InvalidCapture(
                "tshark_binary cannot be empty for the tshark decoder".to_string(),
            ));
        }

        self.log.validate()
    }

    /// Directory that relative scenario paths are resolved against
    pub fn base_dir(&self) -> &Path {
        self.general.base_dir.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Resolve a configured path against the base directory
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// First baseline scenario, the reference for anomaly detection
    pub fn baseline(&self) -> Option<&ScenarioConfig> {
        self.scenarios.iter().find(|s| s.kind == ScenarioKind::Baseline)
    }
}

/// Run-wide settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound for decoding a single capture file
    #[serde(default = "default_decode_timeout", with = "humantime_serde")]
    pub decode_timeout: Duration,
    /// Parse scenarios concurrently
    #[serde(default = "default_true")]
    pub parallel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            decode_timeout: default_decode_timeout(),
            parallel: true,
            base_dir: None,
        }
    }
}

/// Capture decoding settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_decoder")]
    pub decoder: DecoderKind,
    #[serde(default = "default_tshark_binary")]
    pub tshark_binary: String,
    /// Wireshark configuration profile passed with `-C`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tshark_profile: Option<String>,
    /// ICMPv6 types that count as a delivered reply
    #[serde(default = "default_accepted_reply_codes")]
    pub accepted_reply_codes: Vec<u8>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            decoder: default_decoder(),
            tshark_binary: default_tshark_binary(),
            tshark_profile: None,
            accepted_reply_codes: default_accepted_reply_codes(),
        }
    }
}

/// Log extractor vocabulary
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Label in front of link-quality samples, e.g. "ETX: 1.5"
    pub link_quality_label: String,
    /// Control frame names matched as whole words
    pub control_frames: Vec<String>,
    /// Lower-layer transport marker, e.g. "icmpv6"
    pub transport_marker: String,
    /// Routing protocol name co-occurring with the transport marker
    pub protocol_name: String,
    /// Reserved numeric code co-occurring with the transport marker
    pub protocol_code: u16,
    /// Case-sensitive transmit marker for the energy heuristic
    pub tx_marker: String,
    /// Case-sensitive receive marker for the energy heuristic
    pub rx_marker: String,
    /// Discrete send event text for log-only correlation
    pub send_marker: String,
    /// Discrete receive event text for log-only correlation
    pub receive_marker: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            link_quality_label: "ETX".to_string(),
            control_frames: vec!["DIO".to_string(), "DAO".to_string(), "DIS".to_string()],
            transport_marker: "icmpv6".to_string(),
            protocol_name: "rpl".to_string(),
            protocol_code: 155,
            tx_marker: "TX".to_string(),
            rx_marker: "RX".to_string(),
            send_marker: "broadcast message sent".to_string(),
            receive_marker: "broadcast message received".to_string(),
        }
    }
}

impl LogConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let markers = [
            ("link_quality_label", &self.link_quality_label),
            ("transport_marker", &self.transport_marker),
            ("protocol_name", &self.protocol_name),
            ("tx_marker", &self.tx_marker),
            ("rx_marker", &self.rx_marker),
            ("send_marker", &self.send_marker),
            ("receive_marker", &self.receive_marker),
        ];
        for (field, value) in markers {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidLog(format!("{} cannot be empty", field)));
            }
        }

        if self.control_frames.is_empty() || self.control_frames.iter().any(|f| f.trim().is_empty()) {
            return Err(ValidationError::InvalidLog(
                "control_frames must be a non-empty list of names".to_string(),
            ));
        }

        Ok(())
    }
}

/// One scenario's resolved inputs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    pub kind: ScenarioKind,
    /// Packet capture; without it the log's send/receive events are correlated instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<PathBuf>,
    pub log: PathBuf,
}

/// Report output settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_decode_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_true() -> bool {
    true
}

fn default_decoder() -> DecoderKind {
    DecoderKind::Pcap
}

fn default_tshark_binary() -> String {
    "tshark".to_string()
}

/// Echo reply, packet-too-big and RPL control
fn default_accepted_reply_codes() -> Vec<u8> {
    vec![129, 2, 155]
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("analysis_output")
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid capture configuration: {0}")]
    InvalidCapture(String),
    #[error("Invalid log configuration: {0}")]
    InvalidLog(String),
    #[error("Invalid scenario configuration: {0}")]
    InvalidScenario(String),
}
