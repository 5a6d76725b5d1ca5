//! External `tshark` field-extraction backend.
//!
//! tshark runs once per capture with `-T fields`; its output is buffered
//! while the process is polled against the decode timeout, then tokenized
//! line by line. The child is always reaped, and killed when it overruns.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{CaptureDecoder, RecordStream};
use crate::analysis::types::{ControlHeader, PacketRecord};
use crate::error::{RecordError, TraceError};

/// Fields requested from tshark, in output column order
pub const FIELDS: [&str; 6] = [
    "frame.time_epoch",
    "frame.len",
    "wpan.src16",
    "ipv6.version",
    "icmpv6.type",
    "icmpv6.code",
];

const SEPARATOR: char = ';';
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_STDERR_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct TsharkDecoder {
    program: String,
    profile: Option<String>,
    timeout: Duration,
}

impl TsharkDecoder {
    pub fn new(program: String, profile: Option<String>, timeout: Duration) -> Self {
        Self {
            program,
            profile,
            timeout,
        }
    }

    /// Command-line arguments for decoding `path`
    pub fn args(&self, path: &Path) -> Vec<String> {
        let mut args = vec!["-r".to_string(), path.to_string_lossy().to_string()];
        if let Some(profile) = &self.profile {
            args.push("-C".to_string());
            args.push(profile.clone());
        }
        args.extend(["-T", "fields", "-E"].map(String::from));
        args.push(format!("separator={}", SEPARATOR));
        for field in FIELDS {
            args.push("-e".to_string());
            args.push(field.to_string());
        }
        args
    }

    fn run(&self, path: &Path) -> Result<String, TraceError> {
        let mut child = Command::new(&self.program)
            .args(self.args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TraceError::DecoderSpawn {
                program: self.program.clone(),
                source,
            })?;

        // drain both pipes so a chatty child never blocks on a full buffer
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = wait_with_deadline(&mut child, self.timeout).map_err(|e| match e {
            WaitError::TimedOut => TraceError::Timeout {
                path: path.to_path_buf(),
                limit: self.timeout,
            },
            WaitError::Io(source) => TraceError::io(path, source),
        })?;
        // on timeout the readers are left detached; they end once the pipes close

        let stdout = join_reader(stdout);
        let stderr = join_reader(stderr).unwrap_or_default();

        if !status.success() {
            return Err(TraceError::DecoderFailed {
                status,
                stderr: stderr.trim().chars().take(MAX_STDERR_CHARS).collect(),
            });
        }
        stdout.map_err(|e| TraceError::io(path, e))
    }
}

impl CaptureDecoder for TsharkDecoder {
    fn name(&self) -> &'static str {
        "tshark"
    }

    fn decode(&self, path: &Path) -> Result<RecordStream, TraceError> {
        if !path.is_file() {
            return Err(TraceError::NotFound {
                path: path.to_path_buf(),
            });
        }
        log::debug!("Running {} on {}", self.program, path.display());
        let output = self.run(path)?;

        let records: Vec<_> = output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_field_line)
            .collect();
        Ok(Box::new(records.into_iter()))
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(handle: thread::JoinHandle<io::Result<String>>) -> io::Result<String> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe reader thread panicked")))
}

enum WaitError {
    TimedOut,
    Io(std::io::Error),
}

/// Poll `child` until it exits or `limit` elapses; an overrun child is killed and reaped
fn wait_with_deadline(child: &mut Child, limit: Duration) -> Result<std::process::ExitStatus, WaitError> {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(WaitError::TimedOut);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(WaitError::Io(e));
            }
        }
    }
}

/// First value of a possibly repeated field (tshark joins repeats with ',')
fn first_value(field: &str) -> Option<&str> {
    field.split(',').map(str::trim).find(|v| !v.is_empty())
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, RecordError> {
    value.parse().map_err(|_| RecordError::malformed(field, value))
}

/// Tokenize one `-T fields` output line into a record
pub fn parse_field_line(line: &str) -> Result<PacketRecord, RecordError> {
    let columns: Vec<&str> = line.split(SEPARATOR).collect();
    if columns.len() < FIELDS.len() {
        return Err(RecordError::malformed("field line", line));
    }
    let column = |i: usize| first_value(columns[i]);

    let timestamp_str = column(0).ok_or_else(|| RecordError::malformed(FIELDS[0], columns[0]))?;
    let timestamp: f64 = timestamp_str
        .parse()
        .map_err(|_| RecordError::malformed(FIELDS[0], timestamp_str))?;

    let frame_len = match column(1) {
        Some(v) => v.parse().map_err(|_| RecordError::malformed(FIELDS[1], v))?,
        None => 0,
    };

    let node_id = match column(2) {
        Some(v) => {
            let hex = v.trim_start_matches("0x").trim_start_matches("0X");
            Some(u32::from_str_radix(hex, 16).map_err(|_| RecordError::malformed(FIELDS[2], v))?)
        }
        None => None,
    };

    let control = match (column(4), column(5)) {
        (Some(t), code) => Some(ControlHeader {
            msg_type: parse_u8(FIELDS[4], t)?,
            code: code.map(|c| parse_u8(FIELDS[5], c)).transpose()?.unwrap_or(0),
        }),
        (None, _) => None,
    };

    Ok(PacketRecord {
        timestamp,
        node_id,
        has_network_header: column(3).is_some() || control.is_some(),
        control,
        frame_len,
        head: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_include_profile_and_fields() {
        let decoder = TsharkDecoder::new("tshark".into(), Some("rpl".into()), Duration::from_secs(5));
        let args = decoder.args(Path::new("capture.pcap"));
        assert_eq!(&args[..4], &["-r", "capture.pcap", "-C", "rpl"]);
        assert!(args.contains(&"separator=;".to_string()));
        assert_eq!(args.iter().filter(|a| *a == "-e").count(), FIELDS.len());
    }

    #[test]
    fn test_parse_field_line_icmpv6() {
        let record = parse_field_line("1700000000.250000000;64;0x0002;6;155;1").unwrap();
        assert!((record.timestamp - 1_700_000_000.25).abs() < 1e-3);
        assert_eq!(record.frame_len, 64);
        assert_eq!(record.node_id, Some(2));
        assert!(record.has_network_header);
        assert_eq!(record.control, Some(ControlHeader { msg_type: 155, code: 1 }));
    }

    #[test]
    fn test_parse_field_line_no_network() {
        let record = parse_field_line("12.5;5;0x0003;;;").unwrap();
        assert!(!record.has_network_header);
        assert!(!record.has_control_header());
    }

    #[test]
    fn test_parse_field_line_repeated_values() {
        // ICMPv6 error quoting another ICMPv6 packet
        let record = parse_field_line("3.0;90;;6,6;2,129;0,0").unwrap();
        assert_eq!(record.control_type(), Some(2));
        assert_eq!(record.node_id, None);
    }

    #[test]
    fn test_parse_field_line_malformed() {
        assert!(matches!(
            parse_field_line("not-a-time;64;;6;;"),
            Err(RecordError::MalformedField { field: "frame.time_epoch", .. })
        ));
        assert!(parse_field_line("1.0;64").is_err());
        assert!(parse_field_line("1.0;64;0xzz;;;").is_err());
        assert!(parse_field_line("1.0;64;;6;999;0").is_err());
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let decoder = TsharkDecoder::new(
            "/nonexistent/bin/tshark".into(),
            None,
            Duration::from_secs(1),
        );
        assert!(matches!(
            decoder.decode(file.path()).err(),
            Some(TraceError::DecoderSpawn { .. })
        ));
    }

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    #[test]
    fn test_reader_surfaces_read_errors() {
        let err = join_reader(spawn_reader(Some(BrokenPipe))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(join_reader(spawn_reader(None::<BrokenPipe>)).unwrap(), "");
        assert_eq!(join_reader(spawn_reader(Some(&b"1.0;64"[..]))).unwrap(), "1.0;64");
    }

    #[cfg(unix)]
    #[test]
    fn test_overrunning_decoder_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        use crate::analysis::packet_trace::{parse_capture_file, CaptureSettings};

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("slow-tshark");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let capture = dir.path().join("capture.pcap");
        std::fs::write(&capture, b"").unwrap();

        let limit = Duration::from_millis(300);
        let decoder = TsharkDecoder::new(script.to_string_lossy().to_string(), None, limit);

        let started = Instant::now();
        match decoder.decode(&capture).err() {
            Some(TraceError::Timeout { limit: reported, .. }) => assert_eq!(reported, limit),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));

        let summary = parse_capture_file(&capture, &decoder, &CaptureSettings::default());
        assert_eq!(summary.metrics.pdr, Some(0.0));
        assert_eq!(summary.metrics.throughput, Some(0.0));
        assert_eq!(summary.stats.records, 0);
    }

    #[test]
    fn test_missing_capture_is_not_found() {
        let decoder = TsharkDecoder::new("tshark".into(), None, Duration::from_secs(1));
        assert!(matches!(
            decoder.decode(Path::new("/nonexistent/capture.pcap")).err(),
            Some(TraceError::NotFound { .. })
        ));
    }
}
