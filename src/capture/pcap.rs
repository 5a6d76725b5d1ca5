//! Native pcap backend built on pcap-file and etherparse.
//!
//! Supported link types: Ethernet, raw IP, and IEEE 802.15.4 (with or without
//! FCS, and the TAP encapsulation Cooja radio logs use).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap_file::pcap::PcapReader;

use super::lowpan::{self, LowpanPayload};
use super::{CaptureDecoder, RecordStream, HEAD_LEN};
use crate::analysis::types::{ControlHeader, PacketRecord};
use crate::error::{RecordError, TraceError};

const LINKTYPE_ETHERNET: u32 = 1;
const LINKTYPE_RAW: u32 = 101;
const LINKTYPE_RAW_ALT: [u32; 2] = [12, 14];
const LINKTYPE_IPV6: u32 = 229;
const LINKTYPE_IEEE802_15_4_WITHFCS: u32 = 195;
const LINKTYPE_IEEE802_15_4_NOFCS: u32 = 230;
const LINKTYPE_IEEE802_15_4_TAP: u32 = 283;

/// 802.15.4 frame check sequence length
const FCS_LEN: usize = 2;

/// How the frames of one capture are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    RawIp,
    /// 802.15.4 MAC frames; `true` when a trailing FCS is present
    Ieee802154 { fcs: bool },
    /// 802.15.4 behind a TLV TAP header
    Ieee802154Tap,
}

impl LinkLayer {
    pub fn from_linktype(linktype: u32) -> Option<Self> {
        match linktype {
            LINKTYPE_ETHERNET => Some(LinkLayer::Ethernet),
            LINKTYPE_RAW | LINKTYPE_IPV6 => Some(LinkLayer::RawIp),
            t if LINKTYPE_RAW_ALT.contains(&t) => Some(LinkLayer::RawIp),
            LINKTYPE_IEEE802_15_4_WITHFCS => Some(LinkLayer::Ieee802154 { fcs: true }),
            LINKTYPE_IEEE802_15_4_NOFCS => Some(LinkLayer::Ieee802154 { fcs: false }),
            LINKTYPE_IEEE802_15_4_TAP => Some(LinkLayer::Ieee802154Tap),
            _ => None,
        }
    }
}

/// Reads classic pcap files directly
#[derive(Debug, Default, Clone)]
pub struct PcapDecoder;

impl PcapDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureDecoder for PcapDecoder {
    fn name(&self) -> &'static str {
        "pcap"
    }

    fn decode(&self, path: &Path) -> Result<RecordStream, TraceError> {
        let file = File::open(path).map_err(|e| TraceError::io(path, e))?;
        let reader = PcapReader::new(BufReader::new(file))?;
        let linktype = u32::from(reader.header().datalink);
        let link = LinkLayer::from_linktype(linktype);
        if link.is_none() {
            log::warn!(
                "Unsupported link type {} in {}, every record will be skipped",
                linktype,
                path.display()
            );
        }
        log::debug!("Decoding {} as {:?}", path.display(), link);

        Ok(Box::new(PcapRecords {
            reader,
            link,
            linktype,
            done: false,
        }))
    }
}

/// Record iterator over an open pcap file; the file closes on drop
struct PcapRecords {
    reader: PcapReader<BufReader<File>>,
    link: Option<LinkLayer>,
    linktype: u32,
    done: bool,
}

impl Iterator for PcapRecords {
    type Item = Result<PacketRecord, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let packet = match self.reader.next_packet()? {
            Ok(packet) => packet,
            Err(e) => {
                // pcap framing is lost after a bad packet header
                self.done = true;
                return Some(Err(RecordError::Undecodable(e.to_string())));
            }
        };

        let timestamp = packet.timestamp.as_secs_f64();
        let frame_len = packet.orig_len as usize;
        let data: &[u8] = &packet.data;
        let head = data[..data.len().min(HEAD_LEN)].to_vec();

        let Some(link) = self.link else {
            return Some(Err(RecordError::Unsupported {
                what: "pcap link type",
                value: self.linktype,
            }));
        };

        Some(decode_packet(link, data).map(|decoded| PacketRecord {
            timestamp,
            frame_len,
            head,
            ..decoded
        }))
    }
}

/// Decode the link, network and control layers of one captured frame
pub fn decode_packet(link: LinkLayer, data: &[u8]) -> Result<PacketRecord, RecordError> {
    match link {
        LinkLayer::Ethernet => {
            let sliced = SlicedPacket::from_ethernet(data)
                .map_err(|e| RecordError::Undecodable(e.to_string()))?;
            Ok(from_sliced(&sliced))
        }
        LinkLayer::RawIp => {
            let sliced = SlicedPacket::from_ip(data).map_err(|e| RecordError::Undecodable(e.to_string()))?;
            Ok(from_sliced(&sliced))
        }
        LinkLayer::Ieee802154 { fcs } => {
            let frame = if fcs {
                RecordError::ensure_len("802.15.4 frame", data, FCS_LEN)?;
                &data[..data.len() - FCS_LEN]
            } else {
                data
            };
            Ok(from_lowpan(lowpan::decode_frame(frame)?))
        }
        LinkLayer::Ieee802154Tap => Ok(from_lowpan(lowpan::decode_frame(strip_tap_header(data)?)?)),
    }
}

/// Skip the TAP header: version, reserved, little-endian total length
fn strip_tap_header(data: &[u8]) -> Result<&[u8], RecordError> {
    RecordError::ensure_len("802.15.4 TAP header", data, 4)?;
    let len = u16::from_le_bytes([data[2], data[3]]) as usize;
    RecordError::ensure_len("802.15.4 TAP header", data, len)?;
    Ok(&data[len..])
}

fn from_sliced(sliced: &SlicedPacket<'_>) -> PacketRecord {
    let control = match &sliced.transport {
        Some(TransportSlice::Icmpv6(icmp)) => Some(ControlHeader {
            msg_type: icmp.type_u8(),
            code: icmp.code_u8(),
        }),
        _ => None,
    };
    PacketRecord {
        has_network_header: matches!(sliced.net, Some(NetSlice::Ipv6(_))),
        control,
        ..Default::default()
    }
}

fn from_lowpan(frame: lowpan::LowpanFrame) -> PacketRecord {
    let (has_network_header, control) = match frame.payload {
        LowpanPayload::Ipv6 { control } => (true, control),
        LowpanPayload::Fragment | LowpanPayload::Other => (false, None),
    };
    PacketRecord {
        node_id: frame.src_node,
        has_network_header,
        control,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;
    use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
    use pcap_file::DataLink;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn echo_reply_frame() -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv6([0xfe; 16], [0xfd; 16], 64)
            .icmpv6_echo_reply(1, 1);
        let payload = [0u8; 8];
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, &payload).unwrap();
        frame
    }

    fn udp_frame() -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv6([0xfe; 16], [0xfd; 16], 64)
            .udp(5678, 1234);
        let payload = [1u8, 2, 3, 4];
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, &payload).unwrap();
        frame
    }

    fn write_pcap(datalink: DataLink, frames: &[Vec<u8>]) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let header = PcapHeader {
            datalink,
            ..Default::default()
        };
        let mut writer = PcapWriter::with_header(file.reopen().unwrap(), header).unwrap();
        for (i, frame) in frames.iter().enumerate() {
            let ts = Duration::from_millis(1000 + 250 * i as u64);
            writer
                .write_packet(&PcapPacket::new(ts, frame.len() as u32, frame))
                .unwrap();
        }
        drop(writer);
        file
    }

    #[test]
    fn test_linktype_mapping() {
        assert_eq!(LinkLayer::from_linktype(1), Some(LinkLayer::Ethernet));
        assert_eq!(LinkLayer::from_linktype(101), Some(LinkLayer::RawIp));
        assert_eq!(LinkLayer::from_linktype(229), Some(LinkLayer::RawIp));
        assert_eq!(
            LinkLayer::from_linktype(195),
            Some(LinkLayer::Ieee802154 { fcs: true })
        );
        assert_eq!(LinkLayer::from_linktype(147), None);
    }

    #[test]
    fn test_decode_ethernet_capture() {
        let file = write_pcap(DataLink::ETHERNET, &[echo_reply_frame(), udp_frame()]);
        let records: Vec<_> = PcapDecoder::new()
            .decode(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].has_network_header);
        assert_eq!(records[0].control_type(), Some(129));
        assert!((records[0].timestamp - 1.0).abs() < 1e-9);
        assert_eq!(records[0].head, vec![7, 8, 9, 10]);
        assert!(records[1].has_network_header);
        assert!(!records[1].has_control_header());
        assert!((records[1].timestamp - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_undecodable_frame_is_record_error() {
        let file = write_pcap(DataLink::ETHERNET, &[vec![0u8; 5], echo_reply_frame()]);
        let records: Vec<_> = PcapDecoder::new().decode(file.path()).unwrap().collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_err());
        assert!(records[1].is_ok());
    }

    #[test]
    fn test_decode_802154_with_fcs() {
        // data frame, PAN compression, short addresses, src node 9
        let mut frame = vec![0x41, 0x88, 0x01, 0xcd, 0xab, 0xff, 0xff, 0x09, 0x00];
        frame.extend_from_slice(&[0x7B, 0x33, 58, 155, 0, 0, 0]);
        frame.extend_from_slice(&[0xaa, 0xbb]);

        let record = decode_packet(LinkLayer::Ieee802154 { fcs: true }, &frame).unwrap();
        assert_eq!(record.node_id, Some(9));
        assert!(record.has_network_header);
        assert_eq!(record.control, Some(ControlHeader { msg_type: 155, code: 0 }));
    }

    #[test]
    fn test_missing_file() {
        let err = PcapDecoder::new()
            .decode(Path::new("/nonexistent/capture.pcap"))
            .err()
            .unwrap();
        assert!(matches!(err, TraceError::NotFound { .. }));
    }

    #[test]
    fn test_garbage_header_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"definitely not a pcap file").unwrap();
        assert!(matches!(
            PcapDecoder::new().decode(file.path()).err(),
            Some(TraceError::Pcap(_))
        ));
    }
}
