//! IPv4 protocol - RFC 791

use super::checksum::internet_checksum;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// IPv4 protocol numbers the translator understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Protocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}

impl Protocol {
    /// Convert from the protocol number
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Protocol::Icmp),
            6 => Some(Protocol::Tcp),
            17 => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// Fragment flags
pub mod flags {
    /// Don't Fragment
    pub const DF: u8 = 0b010;
    /// More Fragments
    pub const MF: u8 = 0b001;
}

fn addr_at(buffer: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    )
}

/// Validate version, IHL and total length; returns (header_len, total_len).
fn check_lengths(buffer: &[u8]) -> Result<(usize, usize)> {
    if buffer.len() < MIN_HEADER_SIZE {
        return Err(Error::Parse("IPv4 header too short".into()));
    }
    if buffer[0] >> 4 != 4 {
        return Err(Error::Parse("not an IPv4 packet".into()));
    }

    let header_len = (buffer[0] & 0x0F) as usize * 4;
    if header_len < MIN_HEADER_SIZE || buffer.len() < header_len {
        return Err(Error::Parse("IPv4 header truncated".into()));
    }

    let total_len = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
    if total_len < header_len || total_len > buffer.len() {
        return Err(Error::Parse(format!(
            "IPv4 total length {total_len} does not fit {} byte buffer",
            buffer.len()
        )));
    }

    Ok((header_len, total_len))
}

/// Parsed IPv4 header (zero-copy reference)
///
/// Trailing bytes past the total length field (Ethernet padding) are not
/// part of [`payload`](Self::payload).
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
    total_len: usize,
}

impl<'a> Ipv4Header<'a> {
    /// Parse an IPv4 header, options included
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        let (header_len, total_len) = check_lengths(buffer)?;
        Ok(Self {
            buffer,
            header_len,
            total_len,
        })
    }

    /// Total length field
    pub fn total_length(&self) -> u16 {
        self.total_len as u16
    }

    /// Flags (3 bits)
    pub fn flags(&self) -> u8 {
        self.buffer[6] >> 5
    }

    /// Fragment offset in 8-byte units
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6] & 0x1F, self.buffer[7]])
    }

    /// Time to live
    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    /// Protocol number
    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    /// Header checksum field
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[10], self.buffer[11]])
    }

    /// Source address
    pub fn src_addr(&self) -> Ipv4Addr {
        addr_at(self.buffer, 12)
    }

    /// Destination address
    pub fn dst_addr(&self) -> Ipv4Addr {
        addr_at(self.buffer, 16)
    }

    /// Header length in bytes
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Payload, bounded by the total length
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..self.total_len]
    }

    /// More-fragments flag
    pub fn more_fragments(&self) -> bool {
        (self.flags() & flags::MF) != 0
    }

    /// A fragment other than the first carries no L4 header.
    pub fn is_later_fragment(&self) -> bool {
        self.fragment_offset() > 0
    }

    /// Verify the header checksum
    pub fn validate_checksum(&self) -> bool {
        internet_checksum(&self.buffer[..self.header_len]) == 0
    }
}

/// In-place IPv4 header editor over a borrowed packet buffer
#[derive(Debug)]
pub struct Ipv4HeaderMut<'a> {
    buffer: &'a mut [u8],
    header_len: usize,
    total_len: usize,
}

impl<'a> Ipv4HeaderMut<'a> {
    /// Wrap a packet for in-place edits
    pub fn new(buffer: &'a mut [u8]) -> Result<Self> {
        let (header_len, total_len) = check_lengths(buffer)?;
        Ok(Self {
            buffer,
            header_len,
            total_len,
        })
    }

    /// Source address
    pub fn src_addr(&self) -> Ipv4Addr {
        addr_at(self.buffer, 12)
    }

    /// Destination address
    pub fn dst_addr(&self) -> Ipv4Addr {
        addr_at(self.buffer, 16)
    }

    /// Protocol number
    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    /// Check if this is a non-first fragment
    pub fn is_later_fragment(&self) -> bool {
        u16::from_be_bytes([self.buffer[6] & 0x1F, self.buffer[7]]) > 0
    }

    /// Set the source address
    pub fn set_src_addr(&mut self, addr: Ipv4Addr) {
        self.buffer[12..16].copy_from_slice(&addr.octets());
    }

    /// Set the destination address
    pub fn set_dst_addr(&mut self, addr: Ipv4Addr) {
        self.buffer[16..20].copy_from_slice(&addr.octets());
    }

    /// Header length in bytes
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Mutable payload, bounded by the total length
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.header_len..self.total_len]
    }

    /// Recalculate and store the header checksum
    pub fn update_checksum(&mut self) {
        self.buffer[10..12].copy_from_slice(&[0, 0]);
        let sum = internet_checksum(&self.buffer[..self.header_len]);
        self.buffer[10..12].copy_from_slice(&sum.to_be_bytes());
    }

    /// Zero the header checksum for hardware to fill in
    pub fn clear_checksum(&mut self) {
        self.buffer[10..12].copy_from_slice(&[0, 0]);
    }
}

/// Builder for constructing IPv4 packets
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    identification: u16,
    dont_fragment: bool,
    more_fragments: bool,
    fragment_offset: u16,
    ttl: u8,
    protocol: u8,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    payload: Vec<u8>,
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self {
            identification: 0,
            dont_fragment: true,
            more_fragments: false,
            fragment_offset: 0,
            ttl: 64,
            protocol: 0,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            payload: Vec::new(),
        }
    }

    /// Set the identification field
    pub fn identification(mut self, id: u16) -> Self {
        self.identification = id;
        self
    }

    /// Set the more-fragments flag
    pub fn more_fragments(mut self, mf: bool) -> Self {
        self.more_fragments = mf;
        self
    }

    /// Offset in 8-byte units
    pub fn fragment_offset(mut self, offset: u16) -> Self {
        self.fragment_offset = offset & 0x1FFF;
        self
    }

    /// Set the TTL
    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the protocol number
    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the source address
    pub fn src_addr(mut self, addr: Ipv4Addr) -> Self {
        self.src_addr = addr;
        self
    }

    /// Set the destination address
    pub fn dst_addr(mut self, addr: Ipv4Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    /// Set the payload
    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Serialize with a valid header checksum
    pub fn build(self) -> Vec<u8> {
        let total_length = MIN_HEADER_SIZE + self.payload.len();
        let mut buffer = vec![0u8; total_length];

        // Version 4, IHL 5
        buffer[0] = 0x45;
        buffer[2..4].copy_from_slice(&(total_length as u16).to_be_bytes());
        buffer[4..6].copy_from_slice(&self.identification.to_be_bytes());

        let mut fl = 0u8;
        if self.dont_fragment {
            fl |= flags::DF;
        }
        if self.more_fragments {
            fl |= flags::MF;
        }
        let frag = ((fl as u16) << 13) | self.fragment_offset;
        buffer[6..8].copy_from_slice(&frag.to_be_bytes());

        buffer[8] = self.ttl;
        buffer[9] = self.protocol;
        buffer[12..16].copy_from_slice(&self.src_addr.octets());
        buffer[16..20].copy_from_slice(&self.dst_addr.octets());
        buffer[MIN_HEADER_SIZE..].copy_from_slice(&self.payload);

        let sum = internet_checksum(&buffer[..MIN_HEADER_SIZE]);
        buffer[10..12].copy_from_slice(&sum.to_be_bytes());
        buffer
    }
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self::new()
    }
}
