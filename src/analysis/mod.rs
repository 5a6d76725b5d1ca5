//! RPL trace analysis: parsers, correlation, aggregation and reporting.
//!
//! Captures and logs are parsed independently into partial metrics, which
//! the aggregator merges into one record per scenario.

pub mod aggregate;
pub mod correlator;
pub mod log_trace;
pub mod packet_trace;
pub mod profile;
pub mod report;
pub mod types;

pub use types::*;
pub use aggregate::aggregate;
pub use correlator::{correlate_log_file, EventCorrelator};
pub use log_trace::{parse_log_file, LogPatterns};
pub use packet_trace::{parse_capture_file, CaptureSettings};
pub use profile::{detect_anomalies, AnomalyFindings, CaptureProfile};
pub use report::{generate_json_report, generate_text_report, print_summary, write_reports};
