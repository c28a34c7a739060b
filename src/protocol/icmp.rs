//! ICMP (Internet Control Message Protocol) - RFC 792

use super::checksum::internet_checksum;
use crate::{Error, Result};

/// ICMP header size (minimum)
pub const ICMP_HEADER_SIZE: usize = 8;

/// Offset of the checksum field
pub const CHECKSUM_OFFSET: usize = 2;

/// ICMP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    Redirect = 5,
    EchoRequest = 8,
    TimeExceeded = 11,
    ParameterProblem = 12,
}

impl IcmpType {
    /// Convert from the wire value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            5 => Some(IcmpType::Redirect),
            8 => Some(IcmpType::EchoRequest),
            11 => Some(IcmpType::TimeExceeded),
            12 => Some(IcmpType::ParameterProblem),
            _ => None,
        }
    }
}

/// Parsed ICMP message (zero-copy reference)
#[derive(Debug)]
pub struct IcmpPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    /// Parse an ICMP message
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < ICMP_HEADER_SIZE {
            return Err(Error::Parse("ICMP packet too short".into()));
        }
        Ok(Self { buffer })
    }

    /// Message type
    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    /// Message code
    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    /// Checksum field
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Bytes 4-5; the echo identifier, and the translation key for every
    /// ICMP message the engine handles.
    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    /// Echo sequence number
    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    /// Data after the 8-byte header
    pub fn payload(&self) -> &[u8] {
        &self.buffer[ICMP_HEADER_SIZE..]
    }

    /// Verify the checksum over the whole message
    pub fn validate_checksum(&self) -> bool {
        internet_checksum(self.buffer) == 0
    }

    /// Check if this is an echo request
    pub fn is_echo_request(&self) -> bool {
        self.icmp_type() == IcmpType::EchoRequest as u8
    }
}

/// Turn an echo request into an echo reply in place
pub fn make_echo_reply(message: &mut [u8]) -> Result<()> {
    if message.len() < ICMP_HEADER_SIZE {
        return Err(Error::Parse("ICMP request too short".into()));
    }
    message[0] = IcmpType::EchoReply as u8;
    update_checksum(message);
    Ok(())
}

/// Recompute the checksum of a whole ICMP message in place
pub fn update_checksum(message: &mut [u8]) {
    message[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&[0, 0]);
    let sum = internet_checksum(message);
    message[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
}

/// Builder for ICMP Echo Request packets
#[derive(Debug, Clone)]
pub struct EchoRequestBuilder {
    identifier: u16,
    sequence: u16,
    payload: Vec<u8>,
}

impl EchoRequestBuilder {
    /// Echo request with the given identifier and sequence
    pub fn new(identifier: u16, sequence: u16) -> Self {
        Self {
            identifier,
            sequence,
            payload: Vec::new(),
        }
    }

    /// Set the echo data
    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    /// Build the message with a valid checksum
    pub fn build(self) -> Vec<u8> {
        let mut packet = vec![0u8; ICMP_HEADER_SIZE + self.payload.len()];
        packet[0] = IcmpType::EchoRequest as u8;
        packet[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        packet[6..8].copy_from_slice(&self.sequence.to_be_bytes());
        packet[ICMP_HEADER_SIZE..].copy_from_slice(&self.payload);
        update_checksum(&mut packet);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icmp_type_from_u8() {
        assert_eq!(IcmpType::from_u8(0), Some(IcmpType::EchoReply));
        assert_eq!(IcmpType::from_u8(8), Some(IcmpType::EchoRequest));
        assert_eq!(IcmpType::from_u8(11), Some(IcmpType::TimeExceeded));
        assert_eq!(IcmpType::from_u8(42), None);
    }

    #[test]
    fn test_echo_request_builder() {
        let data = EchoRequestBuilder::new(0x1234, 7).payload(b"ping").build();
        let pkt = IcmpPacket::parse(&data).unwrap();

        assert!(pkt.is_echo_request());
        assert_eq!(pkt.code(), 0);
        assert_eq!(pkt.identifier(), 0x1234);
        assert_eq!(pkt.sequence(), 7);
        assert_eq!(pkt.payload(), b"ping");
        assert!(pkt.validate_checksum());
    }

    #[test]
    fn test_make_echo_reply_keeps_id_and_payload() {
        let mut data = EchoRequestBuilder::new(0xbeef, 3).payload(b"abc").build();
        make_echo_reply(&mut data).unwrap();

        let pkt = IcmpPacket::parse(&data).unwrap();
        assert_eq!(pkt.icmp_type(), IcmpType::EchoReply as u8);
        assert_eq!(pkt.identifier(), 0xbeef);
        assert_eq!(pkt.sequence(), 3);
        assert_eq!(pkt.payload(), b"abc");
        assert!(pkt.validate_checksum());
    }

    #[test]
    fn test_make_echo_reply_too_short() {
        let mut data = [8u8, 0, 0, 0];
        assert!(make_echo_reply(&mut data).is_err());
        assert!(IcmpPacket::parse(&data).is_err());
    }
}
