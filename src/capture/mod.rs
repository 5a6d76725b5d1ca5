//! Capture decoding backends.
//!
//! A decoder turns a capture file into a stream of [`PacketRecord`]s. Opening
//! the file (or starting the external dissector) can fail as a whole with a
//! [`TraceError`]; individual records fail with a [`RecordError`] and the
//! caller skips them.

pub mod lowpan;
pub mod pcap;
pub mod tshark;

use std::path::Path;
use std::time::Duration;

use crate::analysis::types::PacketRecord;
use crate::config::{CaptureConfig, DecoderKind};
use crate::error::{RecordError, TraceError};

pub use self::pcap::PcapDecoder;
pub use self::tshark::TsharkDecoder;

/// Decoded records of one capture, in file order
pub type RecordStream = Box<dyn Iterator<Item = Result<PacketRecord, RecordError>> + Send>;

/// Number of leading frame bytes kept on each record
pub const HEAD_LEN: usize = 4;

/// Source of decoded capture records
pub trait CaptureDecoder: Send + Sync {
    /// Short backend name for logs and report metadata
    fn name(&self) -> &'static str;

    /// Open `path` and return its records
    fn decode(&self, path: &Path) -> Result<RecordStream, TraceError>;
}

/// Build the decoder selected in the configuration
pub fn build_decoder(config: &CaptureConfig, timeout: Duration) -> Box<dyn CaptureDecoder> {
    match config.decoder {
        DecoderKind::Pcap => Box::new(PcapDecoder::new()),
        DecoderKind::Tshark => Box::new(TsharkDecoder::new(
            config.tshark_binary.clone(),
            config.tshark_profile.clone(),
            timeout,
        )),
    }
}
