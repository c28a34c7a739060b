//! Ethernet II framing with optional 802.1Q tag

use super::{EtherType, MacAddr, VlanTag};
use crate::{Error, Result};

/// Untagged Ethernet header length
pub const HEADER_LEN: usize = 14;
/// Tagged Ethernet header length
pub const VLAN_HEADER_LEN: usize = 18;
/// Maximum Ethernet frame size (without FCS, with VLAN tag)
pub const MAX_FRAME_SIZE: usize = 1522;

fn mac_at(buffer: &[u8], offset: usize) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buffer[offset..offset + 6]);
    MacAddr(mac)
}

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    vlan_tag: Option<VlanTag>,
    payload_offset: usize,
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame, with or without an 802.1Q tag
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_LEN {
            return Err(Error::Parse("frame too short".into()));
        }

        let outer = u16::from_be_bytes([buffer[12], buffer[13]]);
        let (vlan_tag, payload_offset) = if outer == EtherType::Vlan as u16 {
            if buffer.len() < VLAN_HEADER_LEN {
                return Err(Error::Parse("VLAN frame too short".into()));
            }
            (
                Some(VlanTag::from_bytes([buffer[14], buffer[15]])),
                VLAN_HEADER_LEN,
            )
        } else {
            (None, HEADER_LEN)
        };

        Ok(Self {
            buffer,
            vlan_tag,
            payload_offset,
        })
    }

    /// Destination MAC
    pub fn dst_mac(&self) -> MacAddr {
        mac_at(self.buffer, 0)
    }

    /// Source MAC
    pub fn src_mac(&self) -> MacAddr {
        mac_at(self.buffer, 6)
    }

    /// EtherType of the payload (inner type for tagged frames)
    pub fn ethertype(&self) -> u16 {
        let offset = self.payload_offset - 2;
        u16::from_be_bytes([self.buffer[offset], self.buffer[offset + 1]])
    }

    /// 802.1Q tag, if present
    pub fn vlan_tag(&self) -> Option<VlanTag> {
        self.vlan_tag
    }

    /// Offset of the L3 header
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Bytes after the Ethernet header
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.payload_offset..]
    }
}

/// In-place editor for the L2 header of a frame already known to parse.
pub struct FrameMut<'a> {
    buffer: &'a mut [u8],
    tagged: bool,
}

impl<'a> FrameMut<'a> {
    /// Wrap a frame for in-place edits
    pub fn new(buffer: &'a mut [u8]) -> Result<Self> {
        let tagged = Frame::parse(buffer)?.vlan_tag().is_some();
        Ok(Self { buffer, tagged })
    }

    /// Set the destination MAC
    pub fn set_dst_mac(&mut self, mac: MacAddr) {
        self.buffer[0..6].copy_from_slice(&mac.0);
    }

    /// Set the source MAC
    pub fn set_src_mac(&mut self, mac: MacAddr) {
        self.buffer[6..12].copy_from_slice(&mac.0);
    }

    /// Rewrite the VLAN ID of a tagged frame; untagged frames are left alone.
    pub fn set_vlan_id(&mut self, vid: u16) {
        if !self.tagged {
            return;
        }
        let tag = VlanTag::from_bytes([self.buffer[14], self.buffer[15]]).with_vid(vid);
        self.buffer[14..16].copy_from_slice(&tag.to_bytes());
    }

    /// Swap source and destination MACs
    pub fn swap_macs(&mut self) {
        let dst = mac_at(self.buffer, 0);
        let src = mac_at(self.buffer, 6);
        self.set_dst_mac(src);
        self.set_src_mac(dst);
    }
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Set the destination MAC
    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    /// Set the source MAC
    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    /// Insert an 802.1Q tag
    pub fn vlan_tag(mut self, tag: VlanTag) -> Self {
        self.buffer
            .extend_from_slice(&(EtherType::Vlan as u16).to_be_bytes());
        self.buffer.extend_from_slice(&tag.to_bytes());
        self
    }

    /// Set the EtherType
    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.buffer.extend_from_slice(&ethertype.to_be_bytes());
        self
    }

    /// Set the payload
    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    /// Build the frame
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
