//! One side of a port pair

use super::arp_cache::ArpCache;
use crate::config::AttachmentConfig;
use crate::protocol::arp::ArpPacket;
use crate::protocol::{MacAddr, VlanTag};
use std::fmt;
use std::net::Ipv4Addr;

/// Which side of a pair a frame arrived on or leaves from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Public,
    Private,
}

impl Side {
    /// The other side of the pair
    pub fn opposite(self) -> Self {
        match self {
            Side::Public => Side::Private,
            Side::Private => Side::Public,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Public => f.write_str("public"),
            Side::Private => f.write_str("private"),
        }
    }
}

/// Interface, address and link-layer identity of one side, with its ARP cache
#[derive(Debug)]
pub struct AttachmentPoint {
    pub name: String,
    pub address: Ipv4Addr,
    pub mac: MacAddr,
    /// 0 for untagged
    pub vlan: u16,
    pub kernel_fallback: Option<String>,
    pub side: Side,
    pub arp: ArpCache,
}

impl AttachmentPoint {
    /// Build an attachment point with an empty ARP cache
    pub fn new(config: &AttachmentConfig, side: Side) -> Self {
        Self {
            name: config.interface.clone(),
            address: config.address,
            mac: config.mac,
            vlan: config.vlan,
            kernel_fallback: config.kernel_fallback.clone(),
            side,
            arp: ArpCache::new(),
        }
    }

    /// Check if a kernel fallback interface is configured
    pub fn has_kernel_fallback(&self) -> bool {
        self.kernel_fallback.is_some()
    }

    /// 802.1Q tag for frames we originate, if the attachment is tagged
    pub fn vlan_tag(&self) -> Option<VlanTag> {
        (self.vlan != 0).then(|| VlanTag::new(self.vlan))
    }

    /// Broadcast who-has frame for `target`, sent from this point
    pub fn arp_request(&self, target: Ipv4Addr) -> Vec<u8> {
        ArpPacket::request(self.mac, self.address, target).to_frame(
            MacAddr::BROADCAST,
            self.mac,
            self.vlan_tag(),
        )
    }
}
