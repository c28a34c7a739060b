//! Whole-frame view used by the translation engine
//!
//! [`parse_frame`] decodes L2 through L4 once into plain values, and
//! [`apply_rewrite`] / [`recompute_checksums`] edit the original buffer in
//! place.

use super::arp::ArpPacket;
use super::checksum::{self, ChecksumMode};
use super::ethernet::{Frame, FrameMut};
use super::icmp::{self, IcmpPacket};
use super::ipv4::{Ipv4Header, Ipv4HeaderMut, Protocol};
use super::tcp::{self, TcpFlags, TcpHeader};
use super::udp::{self, UdpHeader};
use super::{EtherType, MacAddr, VlanTag};
use crate::{Error, Result};
use std::net::{Ipv4Addr, SocketAddrV4};

/// Transport header of an IPv4 packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L4Header {
    Tcp {
        src_port: u16,
        dst_port: u16,
        flags: TcpFlags,
    },
    Udp {
        src_port: u16,
        dst_port: u16,
        checksum: u16,
    },
    Icmp {
        icmp_type: u8,
        code: u8,
        identifier: u16,
    },
    /// Unsupported protocol, or a non-first fragment
    None,
}

impl L4Header {
    /// Source port, or the identifier for ICMP
    pub fn src_port(&self) -> Option<u16> {
        match *self {
            L4Header::Tcp { src_port, .. } | L4Header::Udp { src_port, .. } => Some(src_port),
            L4Header::Icmp { identifier, .. } => Some(identifier),
            L4Header::None => None,
        }
    }

    /// Destination port, or the identifier for ICMP
    pub fn dst_port(&self) -> Option<u16> {
        match *self {
            L4Header::Tcp { dst_port, .. } | L4Header::Udp { dst_port, .. } => Some(dst_port),
            L4Header::Icmp { identifier, .. } => Some(identifier),
            L4Header::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Meta {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub more_fragments: bool,
    /// Offset of the L4 header from the start of the frame
    pub l4_offset: usize,
    pub l4: L4Header,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L3 {
    Ipv4(Ipv4Meta),
    Arp(ArpPacket),
    Other(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub vlan: Option<VlanTag>,
    pub l3_offset: usize,
    pub l3: L3,
}

/// Decode a raw Ethernet frame.
///
/// Truncated headers are errors; unknown EtherTypes and IP protocols are not.
pub fn parse_frame(buffer: &[u8]) -> Result<ParsedFrame> {
    let frame = Frame::parse(buffer)?;
    let l3_offset = frame.payload_offset();

    let l3 = match EtherType::from_u16(frame.ethertype()) {
        Some(EtherType::Arp) => L3::Arp(ArpPacket::parse(frame.payload())?),
        Some(EtherType::Ipv4) => L3::Ipv4(parse_ipv4(frame.payload(), l3_offset)?),
        _ => L3::Other(frame.ethertype()),
    };

    Ok(ParsedFrame {
        dst_mac: frame.dst_mac(),
        src_mac: frame.src_mac(),
        vlan: frame.vlan_tag(),
        l3_offset,
        l3,
    })
}

fn parse_ipv4(buffer: &[u8], l3_offset: usize) -> Result<Ipv4Meta> {
    let header = Ipv4Header::parse(buffer)?;
    let segment = header.payload();

    let l4 = if header.is_later_fragment() {
        L4Header::None
    } else {
        match Protocol::from_u8(header.protocol()) {
            Some(Protocol::Tcp) => {
                let tcp = TcpHeader::parse(segment)?;
                L4Header::Tcp {
                    src_port: tcp.src_port(),
                    dst_port: tcp.dst_port(),
                    flags: tcp.flags(),
                }
            }
            Some(Protocol::Udp) => {
                let udp = UdpHeader::parse(segment)?;
                L4Header::Udp {
                    src_port: udp.src_port(),
                    dst_port: udp.dst_port(),
                    checksum: udp.checksum(),
                }
            }
            Some(Protocol::Icmp) => {
                let icmp = IcmpPacket::parse(segment)?;
                L4Header::Icmp {
                    icmp_type: icmp.icmp_type(),
                    code: icmp.code(),
                    identifier: icmp.identifier(),
                }
            }
            None => L4Header::None,
        }
    };

    Ok(Ipv4Meta {
        src: header.src_addr(),
        dst: header.dst_addr(),
        protocol: header.protocol(),
        more_fragments: header.more_fragments(),
        l4_offset: l3_offset + header.header_len(),
        l4,
    })
}

/// Header edits for one translated frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rewrite {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    /// Applied only when the frame carries an 802.1Q tag
    pub vlan_id: u16,
    /// New source address and port (identifier for ICMP)
    pub source: Option<SocketAddrV4>,
    /// New destination address and port (identifier for ICMP)
    pub destination: Option<SocketAddrV4>,
}

/// Apply `rewrite` to `frame` in place and fix up checksums.
///
/// First fragments get an incremental checksum update since the L4
/// checksum covers bytes this frame does not carry.
pub fn apply_rewrite(
    frame: &mut [u8],
    parsed: &ParsedFrame,
    rewrite: &Rewrite,
    mode: ChecksumMode,
) -> Result<()> {
    let L3::Ipv4(meta) = &parsed.l3 else {
        return Err(Error::InvalidPacket("rewrite of a non-IPv4 frame".into()));
    };

    {
        let mut l2 = FrameMut::new(frame)?;
        l2.set_dst_mac(rewrite.dst_mac);
        l2.set_src_mac(rewrite.src_mac);
        l2.set_vlan_id(rewrite.vlan_id);
    }

    let mut ip = Ipv4HeaderMut::new(&mut frame[parsed.l3_offset..])?;
    let old_addrs = [ip.src_addr().octets(), ip.dst_addr().octets()].concat();
    if let Some(source) = rewrite.source {
        ip.set_src_addr(*source.ip());
    }
    if let Some(destination) = rewrite.destination {
        ip.set_dst_addr(*destination.ip());
    }
    let new_addrs = [ip.src_addr().octets(), ip.dst_addr().octets()].concat();

    let (ports, checksum_offset, covers_addresses) = match meta.l4 {
        L4Header::Tcp { .. } => (0..4, tcp::CHECKSUM_OFFSET, true),
        L4Header::Udp { .. } => (0..4, udp::CHECKSUM_OFFSET, true),
        L4Header::Icmp { .. } => (4..6, icmp::CHECKSUM_OFFSET, false),
        L4Header::None => (0..0, 0, false),
    };

    let segment = ip.payload_mut();
    let old_ports = segment[ports.clone()].to_vec();
    match meta.l4 {
        L4Header::Tcp { .. } | L4Header::Udp { .. } => {
            if let Some(source) = rewrite.source {
                segment[0..2].copy_from_slice(&source.port().to_be_bytes());
            }
            if let Some(destination) = rewrite.destination {
                segment[2..4].copy_from_slice(&destination.port().to_be_bytes());
            }
        }
        L4Header::Icmp { .. } => {
            if let Some(endpoint) = rewrite.source.or(rewrite.destination) {
                segment[4..6].copy_from_slice(&endpoint.port().to_be_bytes());
            }
        }
        L4Header::None => {}
    }

    if meta.more_fragments && mode != ChecksumMode::None {
        // First fragment: patch the L4 checksum, recompute the IP header
        let unchecked_udp = matches!(meta.l4, L4Header::Udp { checksum: 0, .. });
        if !matches!(meta.l4, L4Header::None) && !unchecked_udp {
            let new_ports = segment[ports].to_vec();
            let (old, new) = if covers_addresses {
                ([old_addrs, old_ports].concat(), [new_addrs, new_ports].concat())
            } else {
                (old_ports, new_ports)
            };
            let field = checksum_offset..checksum_offset + 2;
            let current = u16::from_be_bytes([segment[field.start], segment[field.start + 1]]);
            let adjusted = match checksum::adjust(current, &old, &new) {
                0 if matches!(meta.l4, L4Header::Udp { .. }) => 0xFFFF,
                sum => sum,
            };
            segment[field].copy_from_slice(&adjusted.to_be_bytes());
        }
        ip.update_checksum();
        return Ok(());
    }

    recompute_checksums(&mut frame[parsed.l3_offset..], mode)
}

/// Recompute the IPv4 header checksum and the TCP/UDP/ICMP checksum of an
/// unfragmented packet according to `mode`.
pub fn recompute_checksums(packet: &mut [u8], mode: ChecksumMode) -> Result<()> {
    if mode == ChecksumMode::None {
        return Ok(());
    }

    let mut ip = Ipv4HeaderMut::new(packet)?;
    match mode {
        ChecksumMode::Offload => ip.clear_checksum(),
        _ => ip.update_checksum(),
    }
    if ip.is_later_fragment() {
        return Ok(());
    }

    let (src, dst) = (ip.src_addr(), ip.dst_addr());
    let protocol = Protocol::from_u8(ip.protocol());
    let segment = ip.payload_mut();

    let protocol = match protocol {
        Some(Protocol::Icmp) => {
            if segment.len() < icmp::ICMP_HEADER_SIZE {
                return Err(Error::InvalidPacket("ICMP message too short".into()));
            }
            icmp::update_checksum(segment);
            return Ok(());
        }
        Some(protocol) => protocol,
        None => return Ok(()),
    };
    let offset = match protocol {
        Protocol::Tcp => tcp::CHECKSUM_OFFSET,
        _ => udp::CHECKSUM_OFFSET,
    };

    if segment.len() < offset + 2 {
        return Err(Error::InvalidPacket(format!(
            "{protocol:?} segment too short for checksum"
        )));
    }
    let field = offset..offset + 2;
    // UDP without a checksum stays that way
    if protocol == Protocol::Udp && segment[field.clone()] == [0, 0] {
        return Ok(());
    }

    segment[field.clone()].copy_from_slice(&[0, 0]);
    let value = match mode {
        ChecksumMode::Offload => checksum::offload_seed(src, dst, protocol as u8, segment.len()),
        _ => match checksum::l4_checksum(src, dst, protocol as u8, segment) {
            0 if protocol == Protocol::Udp => 0xFFFF,
            sum => sum,
        },
    };
    segment[field].copy_from_slice(&value.to_be_bytes());
    Ok(())
}
