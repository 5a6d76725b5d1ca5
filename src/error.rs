//! Error types shared by the capture decoders and trace parsers.
//!
//! Two severities exist. A [`TraceError`] makes a whole input file unusable;
//! the owning parser turns it into a neutral fallback record and a warning.
//! A [`RecordError`] only affects one capture record or log line, which is
//! skipped while the scan continues.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// Fatal-to-file condition
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Trace file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pcap error: {0}")]
    Pcap(#[from] pcap_file::PcapError),

    #[error("Failed to start capture decoder '{program}': {source}")]
    DecoderSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture decoder exited with {status}: {stderr}")]
    DecoderFailed { status: ExitStatus, stderr: String },

    #[error("Decoding {} exceeded the {limit:?} time bound", path.display())]
    Timeout { path: PathBuf, limit: Duration },
}

impl TraceError {
    /// Wrap an I/O error for `path`, keeping "not found" distinguishable
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            TraceError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            TraceError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Per-record recoverable condition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("Malformed field {field}: '{value}'")]
    MalformedField { field: &'static str, value: String },

    #[error("Truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Unsupported {what}: {value:#x}")]
    Unsupported { what: &'static str, value: u32 },

    #[error("Undecodable frame: {0}")]
    Undecodable(String),
}

impl RecordError {
    /// Shorthand for a field that failed to parse
    pub fn malformed(field: &'static str, value: &str) -> Self {
        RecordError::MalformedField {
            field,
            value: value.to_string(),
        }
    }

    /// Return an error unless `buf` holds at least `needed` bytes
    pub fn ensure_len(what: &'static str, buf: &[u8], needed: usize) -> Result<(), Self> {
        if buf.len() < needed {
            Err(RecordError::Truncated {
                what,
                needed,
                available: buf.len(),
            })
        } else {
            Ok(())
        }
    }
}
