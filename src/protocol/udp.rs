//! UDP protocol - RFC 768

use super::checksum::l4_checksum;
use super::ipv4::Protocol;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// UDP header size
pub const HEADER_SIZE: usize = 8;

/// Offset of the checksum field within the header
pub const CHECKSUM_OFFSET: usize = 6;

/// Parsed UDP header (zero-copy reference)
#[derive(Debug)]
pub struct UdpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> UdpHeader<'a> {
    /// Parse a UDP header
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("UDP header too short".into()));
        }
        Ok(Self { buffer })
    }

    /// Source port
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    /// Destination port
    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Length field, header included
    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    /// Zero means the sender did not compute one
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    /// Datagram data
    pub fn payload(&self) -> &[u8] {
        &self.buffer[HEADER_SIZE..]
    }

    /// Verify the checksum; zero means none was sent
    pub fn validate_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> bool {
        self.checksum() == 0 || udp_checksum(src_ip, dst_ip, self.buffer) == 0
    }
}

/// Checksum of a UDP datagram with pseudo-header (RFC 768)
pub fn udp_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, datagram: &[u8]) -> u16 {
    l4_checksum(src_ip, dst_ip, Protocol::Udp as u8, datagram)
}

/// UDP datagram builder
#[derive(Debug, Clone, Default)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl UdpBuilder {
    /// Datagram from `src_port` to `dst_port`
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            payload: Vec::new(),
        }
    }

    /// Set the datagram data
    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    /// Build the datagram with checksum
    pub fn build(self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Vec<u8> {
        let length = HEADER_SIZE + self.payload.len();
        let mut buffer = vec![0u8; length];
        buffer[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buffer[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buffer[4..6].copy_from_slice(&(length as u16).to_be_bytes());
        buffer[HEADER_SIZE..].copy_from_slice(&self.payload);

        // A computed zero is sent as all ones
        let sum = match udp_checksum(src_ip, dst_ip, &buffer) {
            0 => 0xFFFF,
            sum => sum,
        };
        buffer[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
        buffer
    }
}
