//! IEEE 802.15.4 MAC and 6LoWPAN header decoding.
//!
//! Only as much of each frame is decoded as the metrics need: the source
//! node, whether an IPv6 packet is carried, and the ICMPv6 type/code when
//! the final next header is ICMPv6. Uncompressed IPv6 payloads are handed to
//! etherparse; IPHC (RFC 6282) headers are walked by hand.

use etherparse::{SlicedPacket, TransportSlice};

use crate::analysis::types::ControlHeader;
use crate::error::RecordError;

const FRAME_TYPE_DATA: u16 = 1;

const DISPATCH_IPV6: u8 = 0x41;
const NEXT_HEADER_ICMPV6: u8 = 58;

/// IPv6 extension headers that may precede the ICMPv6 header
const EXTENSION_HEADERS: [u8; 3] = [0, 43, 60];

/// Decoded 802.15.4 MAC header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacFrame<'a> {
    pub frame_type: u8,
    /// Source node derived from the low two bytes of the source address
    pub src_node: Option<u32>,
    pub payload: &'a [u8],
}

/// What a 6LoWPAN payload carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowpanPayload {
    Ipv6 { control: Option<ControlHeader> },
    /// Subsequent fragment of a larger datagram
    Fragment,
    /// Not a LoWPAN dispatch
    Other,
}

/// Decoded 802.15.4 frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowpanFrame {
    pub src_node: Option<u32>,
    pub payload: LowpanPayload,
}

fn address_len(mode: u16) -> Result<usize, RecordError> {
    match mode {
        0 => Ok(0),
        2 => Ok(2),
        3 => Ok(8),
        other => Err(RecordError::Unsupported {
            what: "802.15.4 address mode",
            value: other as u32,
        }),
    }
}

/// Parse the MAC header of an 802.15.4 frame without FCS
pub fn parse_mac(frame: &[u8]) -> Result<MacFrame<'_>, RecordError> {
    RecordError::ensure_len("802.15.4 header", frame, 3)?;
    let fcf = u16::from_le_bytes([frame[0], frame[1]]);
    let frame_type = fcf & 0x7;
    let security = fcf & (1 << 3) != 0;
    let pan_compression = fcf & (1 << 6) != 0;
    let dst_mode = (fcf >> 10) & 0x3;
    let src_mode = (fcf >> 14) & 0x3;

    if security {
        return Err(RecordError::Unsupported {
            what: "802.15.4 security",
            value: fcf as u32,
        });
    }

    let dst_len = address_len(dst_mode)?;
    let src_len = address_len(src_mode)?;

    // frame control + sequence number
    let mut offset = 3;
    if dst_len > 0 {
        offset += 2 + dst_len;
    }
    if src_len > 0 {
        if !(pan_compression && dst_len > 0) {
            offset += 2;
        }
        RecordError::ensure_len("802.15.4 source address", frame, offset + src_len)?;
    }

    let src_node = (src_len > 0).then(|| u16::from_le_bytes([frame[offset], frame[offset + 1]]) as u32);
    offset += src_len;
    RecordError::ensure_len("802.15.4 header", frame, offset)?;

    Ok(MacFrame {
        frame_type: frame_type as u8,
        src_node,
        payload: &frame[offset..],
    })
}

/// Decode a complete 802.15.4 frame (FCS already stripped)
pub fn decode_frame(frame: &[u8]) -> Result<LowpanFrame, RecordError> {
    let mac = parse_mac(frame)?;
    let payload = if u16::from(mac.frame_type) == FRAME_TYPE_DATA {
        parse_lowpan(mac.payload)?
    } else {
        LowpanPayload::Other
    };
    Ok(LowpanFrame {
        src_node: mac.src_node,
        payload,
    })
}

/// Decode the 6LoWPAN dispatch chain of a MAC payload
pub fn parse_lowpan(mut buf: &[u8]) -> Result<LowpanPayload, RecordError> {
    loop {
        let Some(&dispatch) = buf.first() else {
            return Ok(LowpanPayload::Other);
        };

        if dispatch == DISPATCH_IPV6 {
            return parse_uncompressed(&buf[1..]);
        }
        if dispatch & 0xE0 == 0x60 {
            return parse_iphc(buf);
        }
        if dispatch & 0xC0 == 0x80 {
            buf = skip_mesh_header(buf)?;
            continue;
        }
        match dispatch & 0xF8 {
            // FRAG1: dispatch/size, tag
            0xC0 => {
                RecordError::ensure_len("FRAG1 header", buf, 4)?;
                buf = &buf[4..];
            }
            0xE0 => return Ok(LowpanPayload::Fragment),
            _ => return Ok(LowpanPayload::Other),
        }
    }
}

fn skip_mesh_header(buf: &[u8]) -> Result<&[u8], RecordError> {
    let dispatch = buf[0];
    let originator = if dispatch & 0x20 != 0 { 2 } else { 8 };
    let final_dst = if dispatch & 0x10 != 0 { 2 } else { 8 };
    let hops_ext = usize::from(dispatch & 0x0F == 0x0F);
    let len = 1 + hops_ext + originator + final_dst;
    RecordError::ensure_len("mesh header", buf, len)?;
    Ok(&buf[len..])
}

fn parse_uncompressed(packet: &[u8]) -> Result<LowpanPayload, RecordError> {
    let sliced = SlicedPacket::from_ip(packet)
        .map_err(|e| RecordError::Undecodable(format!("IPv6 after 6LoWPAN dispatch: {}", e)))?;
    let control = match sliced.transport {
        Some(TransportSlice::Icmpv6(icmp)) => Some(ControlHeader {
            msg_type: icmp.type_u8(),
            code: icmp.code_u8(),
        }),
        _ => None,
    };
    Ok(LowpanPayload::Ipv6 { control })
}

fn source_address_len(sac: bool, sam: u8) -> usize {
    match (sac, sam) {
        (false, 0) => 16,
        (true, 0) => 0,
        (_, 1) => 8,
        (_, 2) => 2,
        _ => 0,
    }
}

fn destination_address_len(multicast: bool, dac: bool, dam: u8) -> Result<usize, RecordError> {
    let len = match (multicast, dac, dam) {
        (false, false, 0) => 16,
        (false, _, 1) => 8,
        (false, _, 2) => 2,
        (false, _, 3) => 0,
        (true, false, 0) => 16,
        (true, false, 1) => 6,
        (true, false, 2) => 4,
        (true, false, 3) => 1,
        (true, true, 0) => 6,
        _ => {
            return Err(RecordError::Unsupported {
                what: "IPHC destination mode",
                value: u32::from(dam) | (u32::from(dac) << 2) | (u32::from(multicast) << 3),
            })
        }
    };
    Ok(len)
}

/// Walk an IPHC-compressed IPv6 header up to its transport header
fn parse_iphc(buf: &[u8]) -> Result<LowpanPayload, RecordError> {
    RecordError::ensure_len("IPHC header", buf, 2)?;
    let (b0, b1) = (buf[0], buf[1]);

    let tf = (b0 >> 3) & 0x3;
    let nh_compressed = b0 & 0x04 != 0;
    let hlim = b0 & 0x3;
    let cid = b1 & 0x80 != 0;
    let sac = b1 & 0x40 != 0;
    let sam = (b1 >> 4) & 0x3;
    let multicast = b1 & 0x08 != 0;
    let dac = b1 & 0x04 != 0;
    let dam = b1 & 0x3;

    let mut offset = 2 + usize::from(cid);
    offset += match tf {
        0 => 4,
        1 => 3,
        2 => 1,
        _ => 0,
    };

    let inline_next_header = if nh_compressed {
        None
    } else {
        RecordError::ensure_len("IPHC next header", buf, offset + 1)?;
        offset += 1;
        Some(buf[offset - 1])
    };

    if hlim == 0 {
        offset += 1;
    }
    offset += source_address_len(sac, sam);
    offset += destination_address_len(multicast, dac, dam)?;
    RecordError::ensure_len("IPHC header", buf, offset)?;

    let rest = &buf[offset..];
    let control = match inline_next_header {
        Some(next_header) => walk_inline(next_header, rest)?,
        None => walk_nhc(rest)?,
    };
    Ok(LowpanPayload::Ipv6 { control })
}

/// Follow uncompressed extension headers to the transport header
fn walk_inline(mut next_header: u8, mut buf: &[u8]) -> Result<Option<ControlHeader>, RecordError> {
    while EXTENSION_HEADERS.contains(&next_header) {
        RecordError::ensure_len("IPv6 extension header", buf, 2)?;
        let len = (usize::from(buf[1]) + 1) * 8;
        RecordError::ensure_len("IPv6 extension header", buf, len)?;
        next_header = buf[0];
        buf = &buf[len..];
    }

    if next_header != NEXT_HEADER_ICMPV6 {
        return Ok(None);
    }
    RecordError::ensure_len("ICMPv6 header", buf, 2)?;
    Ok(Some(ControlHeader {
        msg_type: buf[0],
        code: buf[1],
    }))
}

/// Follow NHC-compressed headers (RFC 6282 section 4)
fn walk_nhc(mut buf: &[u8]) -> Result<Option<ControlHeader>, RecordError> {
    loop {
        let Some(&nhc) = buf.first() else {
            return Err(RecordError::Truncated {
                what: "NHC header",
                needed: 1,
                available: 0,
            });
        };

        if nhc & 0xF8 == 0xF0 {
            // UDP
            return Ok(None);
        }
        if nhc & 0xF0 != 0xE0 {
            return Err(RecordError::Unsupported {
                what: "NHC dispatch",
                value: u32::from(nhc),
            });
        }

        let eid = (nhc >> 1) & 0x7;
        let next_compressed = nhc & 0x01 != 0;

        // encapsulated IPv6
        if eid == 7 {
            return match parse_iphc(&buf[1..])? {
                LowpanPayload::Ipv6 { control } => Ok(control),
                _ => Ok(None),
            };
        }

        let mut offset = 1;
        let inline_next = if next_compressed {
            None
        } else {
            RecordError::ensure_len("NHC extension header", buf, offset + 1)?;
            offset += 1;
            Some(buf[offset - 1])
        };
        RecordError::ensure_len("NHC extension header", buf, offset + 1)?;
        let len = usize::from(buf[offset]);
        offset += 1 + len;
        RecordError::ensure_len("NHC extension header", buf, offset)?;
        buf = &buf[offset..];

        if let Some(next_header) = inline_next {
            return walk_inline(next_header, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Data frame, PAN compression, short dst 0xffff, short src `node`
    fn mac_header(node: u16) -> Vec<u8> {
        let fcf: u16 = FRAME_TYPE_DATA | (1 << 6) | (2 << 10) | (2 << 14);
        let mut frame = fcf.to_le_bytes().to_vec();
        frame.push(0x2a);
        frame.extend_from_slice(&0xabcdu16.to_le_bytes());
        frame.extend_from_slice(&0xffffu16.to_le_bytes());
        frame.extend_from_slice(&node.to_le_bytes());
        frame
    }

    /// IPHC: TF=11, inline next header, HLIM=255, src/dst fully elided
    fn iphc_header(next_header: u8) -> Vec<u8> {
        vec![0x7B, 0x33, next_header]
    }

    #[test]
    fn test_parse_mac_short_addresses() {
        let mut frame = mac_header(7);
        frame.push(0x00);
        let mac = parse_mac(&frame).unwrap();
        assert_eq!(mac.frame_type, 1);
        assert_eq!(mac.src_node, Some(7));
        assert_eq!(mac.payload, &[0x00]);
    }

    #[test]
    fn test_parse_mac_truncated() {
        let frame = mac_header(7);
        assert!(matches!(
            parse_mac(&frame[..6]),
            Err(RecordError::Truncated { .. })
        ));
    }

    #[test]
    fn test_parse_mac_security_unsupported() {
        let mut frame = mac_header(1);
        frame[0] |= 1 << 3;
        assert!(matches!(
            parse_mac(&frame),
            Err(RecordError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_iphc_rpl_dio() {
        let mut frame = mac_header(3);
        frame.extend(iphc_header(NEXT_HEADER_ICMPV6));
        frame.extend_from_slice(&[155, 1, 0x12, 0x34]);

        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.src_node, Some(3));
        assert_eq!(
            decoded.payload,
            LowpanPayload::Ipv6 {
                control: Some(ControlHeader { msg_type: 155, code: 1 })
            }
        );
    }

    #[test]
    fn test_iphc_hop_by_hop_then_icmpv6() {
        let mut frame = mac_header(4);
        frame.extend(iphc_header(0));
        // hop-by-hop: next=58, len=0 (8 bytes total)
        frame.extend_from_slice(&[58, 0, 0x63, 0x04, 0, 0, 0, 0]);
        frame.extend_from_slice(&[129, 0, 0, 0]);

        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(
            decoded.payload,
            LowpanPayload::Ipv6 {
                control: Some(ControlHeader { msg_type: 129, code: 0 })
            }
        );
    }

    #[test]
    fn test_iphc_nhc_udp_has_no_control() {
        let mut frame = mac_header(5);
        // TF=11, NH compressed, HLIM=255, addresses elided
        frame.extend_from_slice(&[0x7F, 0x33, 0xF0, 0x16, 0x33, 0x16, 0x34, 0, 0]);
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.payload, LowpanPayload::Ipv6 { control: None });
    }

    #[test]
    fn test_frag1_then_iphc() {
        let mut payload = vec![0xC0, 0x50, 0x12, 0x34];
        payload.extend(iphc_header(NEXT_HEADER_ICMPV6));
        payload.extend_from_slice(&[155, 2]);
        assert_eq!(
            parse_lowpan(&payload).unwrap(),
            LowpanPayload::Ipv6 {
                control: Some(ControlHeader { msg_type: 155, code: 2 })
            }
        );
    }

    #[test]
    fn test_fragn_and_non_lowpan() {
        assert_eq!(parse_lowpan(&[0xE0, 0x50, 0x12, 0x34, 0x05]).unwrap(), LowpanPayload::Fragment);
        assert_eq!(parse_lowpan(&[0x00, 0x01]).unwrap(), LowpanPayload::Other);
        assert_eq!(parse_lowpan(&[]).unwrap(), LowpanPayload::Other);
    }

    #[test]
    fn test_ack_frame_has_no_payload() {
        // ack: frame type 2, no addresses
        let frame = [0x02, 0x00, 0x2a];
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.src_node, None);
        assert_eq!(decoded.payload, LowpanPayload::Other);
    }

    #[test]
    fn test_truncated_icmpv6() {
        let mut frame = mac_header(3);
        frame.extend(iphc_header(NEXT_HEADER_ICMPV6));
        frame.push(155);
        assert!(matches!(
            decode_frame(&frame),
            Err(RecordError::Truncated { .. })
        ));
    }
}
