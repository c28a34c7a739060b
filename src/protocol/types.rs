//! Common protocol types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    pub const ZERO: MacAddr = MacAddr([0, 0, 0, 0, 0, 0]);

    /// Check if this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Check if the group bit is set
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Check if all octets are zero
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error type for MAC address parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacAddrError {
    kind: ParseMacAddrErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseMacAddrErrorKind {
    Length,
    Format,
    Hex,
}

impl ParseMacAddrError {
    fn new(kind: ParseMacAddrErrorKind) -> Self {
        Self { kind }
    }
}

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParseMacAddrErrorKind::Length => write!(f, "invalid MAC address length"),
            ParseMacAddrErrorKind::Format => write!(f, "invalid MAC address format"),
            ParseMacAddrErrorKind::Hex => write!(f, "invalid hex digit in MAC address"),
        }
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Parse "00:11:22:33:44:55" or "00-11-22-33-44-55"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sep = if s.contains(':') {
            ':'
        } else if s.contains('-') {
            '-'
        } else {
            return Err(ParseMacAddrError::new(ParseMacAddrErrorKind::Format));
        };

        let parts: Vec<&str> = s.split(sep).collect();
        if parts.len() != 6 {
            return Err(ParseMacAddrError::new(ParseMacAddrErrorKind::Length));
        }

        let mut result = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacAddrError::new(ParseMacAddrErrorKind::Format));
            }
            result[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacAddrError::new(ParseMacAddrErrorKind::Hex))?;
        }

        Ok(MacAddr(result))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = ParseMacAddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// EtherType values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    Vlan = 0x8100,
    Ipv6 = 0x86DD,
}

impl EtherType {
    /// Convert from the wire value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0800 => Some(EtherType::Ipv4),
            0x0806 => Some(EtherType::Arp),
            0x8100 => Some(EtherType::Vlan),
            0x86DD => Some(EtherType::Ipv6),
            _ => None,
        }
    }
}

/// VLAN tag (802.1Q)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    /// Priority Code Point (3 bits)
    pub pcp: u8,
    /// Drop Eligible Indicator (1 bit)
    pub dei: bool,
    /// VLAN ID (12 bits, 0-4095)
    pub vid: u16,
}

impl VlanTag {
    /// Tag with priority 0
    pub fn new(vid: u16) -> Self {
        Self {
            pcp: 0,
            dei: false,
            vid: vid & 0x0FFF,
        }
    }

    /// Encode the 16-bit TCI
    pub fn to_bytes(&self) -> [u8; 2] {
        let value =
            ((self.pcp as u16 & 0x07) << 13) | ((self.dei as u16) << 12) | (self.vid & 0x0FFF);
        value.to_be_bytes()
    }

    /// Decode the 16-bit TCI
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let value = u16::from_be_bytes(bytes);
        Self {
            pcp: ((value >> 13) & 0x07) as u8,
            dei: (value >> 12) & 0x01 != 0,
            vid: value & 0x0FFF,
        }
    }

    /// Same priority bits, different VLAN ID
    pub fn with_vid(self, vid: u16) -> Self {
        Self {
            vid: vid & 0x0FFF,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_addr_flags() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(MacAddr::BROADCAST.is_multicast());
        assert!(MacAddr::ZERO.is_zero());
        assert!(!MacAddr([0x02, 0, 0, 0, 0, 1]).is_multicast());
    }

    #[test]
    fn test_mac_addr_display() {
        let mac = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(format!("{}", mac), "00:11:22:33:44:55");
    }

    #[test]
    fn test_mac_addr_parse() {
        let colon: MacAddr = "00:11:22:33:44:55".parse().unwrap();
        let hyphen: MacAddr = "00-11-22-33-44-55".parse().unwrap();
        assert_eq!(colon, MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(colon, hyphen);

        let upper: MacAddr = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(upper, MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
    }

    #[test]
    fn test_mac_addr_parse_invalid() {
        assert!("00:11:22:33:44".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44:gg".parse::<MacAddr>().is_err());
        assert!("00.11.22.33.44.55".parse::<MacAddr>().is_err());
        assert!("001122334455".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_addr_serde_as_string() {
        #[derive(Deserialize)]
        struct Holder {
            mac: MacAddr,
        }
        let holder: Holder = toml::from_str(r#"mac = "02:00:00:00:00:01""#).unwrap();
        assert_eq!(holder.mac, MacAddr([0x02, 0, 0, 0, 0, 0x01]));

        let bad: Result<Holder, _> = toml::from_str(r#"mac = "nope""#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_vlan_tag_bits() {
        let tag = VlanTag {
            pcp: 5,
            dei: true,
            vid: 100,
        };
        // PCP=5 (101), DEI=1, VID=100 (0x64)
        assert_eq!(tag.to_bytes(), [0xB0, 0x64]);
        assert_eq!(VlanTag::from_bytes([0xB0, 0x64]), tag);
        assert_eq!(VlanTag::new(0xFFFF).vid, 0x0FFF);
    }

    #[test]
    fn test_vlan_tag_with_vid_keeps_priority() {
        let tag = VlanTag::from_bytes([0xB0, 0x64]).with_vid(200);
        assert_eq!(tag.pcp, 5);
        assert!(tag.dei);
        assert_eq!(tag.vid, 200);
    }
}
