//! ARP (Address Resolution Protocol) - RFC 826, Ethernet/IPv4 only

use super::ethernet::FrameBuilder;
use super::{EtherType, MacAddr, VlanTag};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ARP packet size (for Ethernet/IPv4)
pub const ARP_PACKET_SIZE: usize = 28;

const HTYPE_ETHERNET: u16 = 1;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    /// Convert from the wire value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// ARP packet (Ethernet/IPv4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parse the ARP payload of an Ethernet frame
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(Error::Parse("ARP packet too short".into()));
        }

        let htype = u16::from_be_bytes([buffer[0], buffer[1]]);
        let ptype = u16::from_be_bytes([buffer[2], buffer[3]]);
        if htype != HTYPE_ETHERNET || ptype != EtherType::Ipv4 as u16 {
            return Err(Error::Parse(format!(
                "unsupported ARP hardware/protocol type {htype}/{ptype:#06x}"
            )));
        }
        if buffer[4] != 6 || buffer[5] != 4 {
            return Err(Error::Parse("invalid ARP address lengths".into()));
        }

        let operation = ArpOp::from_u16(u16::from_be_bytes([buffer[6], buffer[7]]))
            .ok_or_else(|| Error::Parse("invalid ARP operation".into()))?;

        let mut sender_mac = [0u8; 6];
        sender_mac.copy_from_slice(&buffer[8..14]);
        let mut target_mac = [0u8; 6];
        target_mac.copy_from_slice(&buffer[18..24]);

        Ok(Self {
            operation,
            sender_mac: MacAddr(sender_mac),
            sender_ip: Ipv4Addr::new(buffer[14], buffer[15], buffer[16], buffer[17]),
            target_mac: MacAddr(target_mac),
            target_ip: Ipv4Addr::new(buffer[24], buffer[25], buffer[26], buffer[27]),
        })
    }

    /// Serialize to the 28-byte wire format
    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];
        buf[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&(EtherType::Ipv4 as u16).to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        buf[6..8].copy_from_slice(&(self.operation as u16).to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
        buf
    }

    /// Who-has request for `target_ip`
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// Reply from `sender` to `target`
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOp::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Wrap the packet in an Ethernet frame sent from `src` to `dst`,
    /// tagged when `vlan` is given.
    pub fn to_frame(&self, dst: MacAddr, src: MacAddr, vlan: Option<VlanTag>) -> Vec<u8> {
        let mut builder = FrameBuilder::new().dst_mac(dst).src_mac(src);
        if let Some(tag) = vlan {
            builder = builder.vlan_tag(tag);
        }
        builder
            .ethertype(EtherType::Arp as u16)
            .payload(&self.to_bytes())
            .build()
    }
}
