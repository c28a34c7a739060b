//! ARP cache (IP to MAC mapping) of one attachment point
//!
//! Entries are learned from observed traffic and ARP replies and are only
//! ever overwritten, never expired. A host that changes its MAC is picked
//! up on its next ARP reply or outbound packet.

use crate::protocol::MacAddr;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::Ipv4Addr;

#[derive(Debug, Default)]
pub struct ArpCache {
    entries: RwLock<HashMap<Ipv4Addr, MacAddr>>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an IPv4 address to its MAC
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries.read().get(&ip).copied()
    }

    /// Insert or overwrite; returns true if the binding changed
    pub fn learn(&self, ip: Ipv4Addr, mac: MacAddr) -> bool {
        if self.lookup(ip) == Some(mac) {
            return false;
        }
        self.entries.write().insert(ip, mac) != Some(mac)
    }

    /// Number of learned entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
