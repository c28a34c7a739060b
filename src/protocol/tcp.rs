//! TCP protocol - RFC 793
//!
//! Only what the translator needs: ports, flags and the checksum field.

use super::checksum::l4_checksum;
use super::ipv4::Protocol;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Offset of the checksum field within the header
pub const CHECKSUM_OFFSET: usize = 16;

/// TCP flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
}

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;

    /// Parse flags from the 13th byte of TCP header
    pub fn from_byte(byte: u8) -> Self {
        Self {
            fin: byte & Self::FIN != 0,
            syn: byte & Self::SYN != 0,
            rst: byte & Self::RST != 0,
            psh: byte & Self::PSH != 0,
            ack: byte & Self::ACK != 0,
            urg: byte & Self::URG != 0,
        }
    }

    /// Encode flags into the flags byte
    pub fn to_byte(&self) -> u8 {
        [
            (self.fin, Self::FIN),
            (self.syn, Self::SYN),
            (self.rst, Self::RST),
            (self.psh, Self::PSH),
            (self.ack, Self::ACK),
            (self.urg, Self::URG),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .fold(0, |byte, (_, bit)| byte | bit)
    }
}

/// Parsed TCP header (zero-copy reference)
#[derive(Debug)]
pub struct TcpHeader<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    /// Parse a TCP header
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP header too short".into()));
        }

        let header_len = (buffer[12] >> 4) as usize * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP data offset too small".into()));
        }
        if buffer.len() < header_len {
            return Err(Error::Parse("TCP header truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    /// Source port
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    /// Destination port
    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Sequence number
    pub fn seq_num(&self) -> u32 {
        u32::from_be_bytes([
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        ])
    }

    /// Control flags
    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_byte(self.buffer[13])
    }

    /// Checksum field
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[16], self.buffer[17]])
    }

    /// Header length in bytes, options included
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Segment data
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..]
    }

    /// Validate checksum with pseudo-header
    pub fn validate_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> bool {
        l4_checksum(src_ip, dst_ip, Protocol::Tcp as u8, self.buffer) == 0
    }
}

/// Builder for TCP segments with a valid checksum
#[derive(Debug, Clone, Default)]
pub struct TcpBuilder {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
    payload: Vec<u8>,
}

impl TcpBuilder {
    /// Segment from `src_port` to `dst_port`
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            window: 65535,
            ..Default::default()
        }
    }

    /// Set the sequence number
    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    /// Set the acknowledgment number
    pub fn ack_num(mut self, ack: u32) -> Self {
        self.ack = ack;
        self
    }

    /// Raw flag byte, e.g. `TcpFlags::FIN | TcpFlags::ACK`
    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Set the segment data
    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    /// Build the segment with a checksum over the pseudo-header
    pub fn build(self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Vec<u8> {
        let mut buf = vec![0u8; MIN_HEADER_SIZE + self.payload.len()];
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ack.to_be_bytes());
        // Data offset 5 words
        buf[12] = 0x50;
        buf[13] = self.flags;
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[MIN_HEADER_SIZE..].copy_from_slice(&self.payload);

        let sum = l4_checksum(src_ip, dst_ip, Protocol::Tcp as u8, &buf);
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
    const DST: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

    #[test]
    fn test_flags_byte_conversion() {
        let flags = TcpFlags::from_byte(TcpFlags::FIN | TcpFlags::ACK);
        assert!(flags.fin);
        assert!(flags.ack);
        assert!(!flags.syn);
        assert!(!flags.rst);
        assert_eq!(flags.to_byte(), 0x11);

        assert_eq!(TcpFlags::from_byte(0x3f).to_byte(), 0x3f);
        assert_eq!(TcpFlags::default().to_byte(), 0);
    }

    #[test]
    fn test_builder_output_parses() {
        let seg = TcpBuilder::new(4000, 80)
            .seq(1000)
            .flags(TcpFlags::SYN)
            .payload(b"hi")
            .build(SRC, DST);
        let header = TcpHeader::parse(&seg).unwrap();

        assert_eq!(header.src_port(), 4000);
        assert_eq!(header.dst_port(), 80);
        assert_eq!(header.seq_num(), 1000);
        assert!(header.flags().syn);
        assert_eq!(header.header_len(), 20);
        assert_eq!(header.payload(), b"hi");
        assert!(header.validate_checksum(SRC, DST));
        assert!(!header.validate_checksum(SRC, Ipv4Addr::new(8, 8, 4, 4)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(TcpHeader::parse(&[0u8; 19]).is_err());

        let mut seg = TcpBuilder::new(1, 2).build(SRC, DST);
        seg[12] = 0x40;
        assert!(TcpHeader::parse(&seg).is_err());

        seg[12] = 0x60;
        assert!(TcpHeader::parse(&seg).is_err());
    }
}
