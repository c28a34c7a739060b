//! Bidirectional translation table and per-port state
//!
//! Reads go straight to the sharded maps. Anything that changes which
//! mappings exist requires a [`WriteGuard`] from [`ConnectionTable::lock`],
//! so the two directions and the port state always change together.

use crate::protocol::L4Header;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

/// NAPT-supported protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NaptProtocol {
    Tcp,
    Udp,
    Icmp,
}

impl NaptProtocol {
    pub const ALL: [NaptProtocol; 3] = [NaptProtocol::Tcp, NaptProtocol::Udp, NaptProtocol::Icmp];

    /// Map an IP protocol number
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NaptProtocol::Icmp),
            6 => Some(NaptProtocol::Tcp),
            17 => Some(NaptProtocol::Udp),
            _ => None,
        }
    }

    /// Protocol of a parsed transport header
    pub fn from_l4(l4: &L4Header) -> Option<Self> {
        match l4 {
            L4Header::Tcp { .. } => Some(NaptProtocol::Tcp),
            L4Header::Udp { .. } => Some(NaptProtocol::Udp),
            L4Header::Icmp { .. } => Some(NaptProtocol::Icmp),
            L4Header::None => None,
        }
    }

    /// Lowercase name used in config and logs
    pub fn as_str(self) -> &'static str {
        match self {
            NaptProtocol::Tcp => "tcp",
            NaptProtocol::Udp => "udp",
            NaptProtocol::Icmp => "icmp",
        }
    }

    fn index(self) -> usize {
        match self {
            NaptProtocol::Tcp => 0,
            NaptProtocol::Udp => 1,
            NaptProtocol::Icmp => 2,
        }
    }
}

impl fmt::Display for NaptProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IPv4 address plus L4 port (ICMP identifier for ICMP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressPair {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl AddressPair {
    /// Create an address pair
    pub const fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    /// Zero address marks a binding to the kernel fallback path
    pub fn is_kernel(&self) -> bool {
        self.address.is_unspecified()
    }
}

impl fmt::Display for AddressPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl From<AddressPair> for SocketAddrV4 {
    fn from(pair: AddressPair) -> Self {
        SocketAddrV4::new(pair.address, pair.port)
    }
}

impl From<SocketAddrV4> for AddressPair {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

/// Which way a packet crosses the translator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    PrivateToPublic,
    PublicToPrivate,
}

impl Direction {
    /// The reverse direction
    pub fn opposite(self) -> Self {
        match self {
            Direction::PrivateToPublic => Direction::PublicToPrivate,
            Direction::PublicToPrivate => Direction::PrivateToPublic,
        }
    }
}

/// Metadata for one public port of one protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortState {
    /// May lie in the future while the port is held back after a close
    pub last_used: Instant,
    pub owner_address: Ipv4Addr,
    pub fin_count: u8,
    pub termination_direction: Option<Direction>,
    pub is_static: bool,
}

impl PortState {
    /// Fresh state for a newly allocated port
    pub fn new(owner_address: Ipv4Addr, now: Instant) -> Self {
        Self {
            last_used: now,
            owner_address,
            fin_count: 0,
            termination_direction: None,
            is_static: false,
        }
    }

    /// State for a permanent mapping
    pub fn new_static(owner_address: Ipv4Addr, now: Instant) -> Self {
        Self {
            is_static: true,
            ..Self::new(owner_address, now)
        }
    }

    /// Static, or used within the last `timeout`
    pub fn is_fresh(&self, now: Instant, timeout: Duration) -> bool {
        self.is_static || now.saturating_duration_since(self.last_used) <= timeout
    }

    /// Reclaimable by the allocator: not static and idle for longer than
    /// `timeout`. A `last_used` in the future is never reclaimable.
    pub fn is_reclaimable(&self, now: Instant, timeout: Duration) -> bool {
        !self.is_static
            && now
                .checked_duration_since(self.last_used)
                .is_some_and(|idle| idle > timeout)
    }
}

/// Proof that the owning pair's write lock is held
pub struct WriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

#[derive(Debug, Default)]
struct ProtocolTable {
    public_to_private: DashMap<AddressPair, AddressPair>,
    private_to_public: DashMap<AddressPair, AddressPair>,
    ports: DashMap<u16, PortState>,
}

/// Connection table of one port pair, split by protocol
#[derive(Debug, Default)]
pub struct ConnectionTable {
    tables: [ProtocolTable; 3],
    write_lock: Mutex<()>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, protocol: NaptProtocol) -> &ProtocolTable {
        &self.tables[protocol.index()]
    }

    /// Take the write lock serializing structural changes
    pub fn lock(&self) -> WriteGuard<'_> {
        WriteGuard {
            _guard: self.write_lock.lock(),
        }
    }

    /// Private pair mapped to a public pair
    pub fn lookup_public(&self, protocol: NaptProtocol, key: &AddressPair) -> Option<AddressPair> {
        self.table(protocol)
            .public_to_private
            .get(key)
            .map(|entry| *entry.value())
    }

    /// Public pair mapped to a private pair
    pub fn lookup_private(&self, protocol: NaptProtocol, key: &AddressPair) -> Option<AddressPair> {
        self.table(protocol)
            .private_to_public
            .get(key)
            .map(|entry| *entry.value())
    }

    /// Snapshot of a port's state
    pub fn port_state(&self, protocol: NaptProtocol, port: u16) -> Option<PortState> {
        self.table(protocol).ports.get(&port).map(|entry| *entry.value())
    }

    /// Aging check on a lookup hit. Refreshes `last_used` and returns true
    /// when the port is still fresh; returns false when it is stale or gone.
    pub fn touch(
        &self,
        protocol: NaptProtocol,
        port: u16,
        now: Instant,
        timeout: Duration,
    ) -> bool {
        match self.table(protocol).ports.get_mut(&port) {
            Some(mut state) if state.is_fresh(now, timeout) => {
                if !state.is_static {
                    state.last_used = state.last_used.max(now);
                }
                true
            }
            _ => false,
        }
    }

    /// Insert both directions of a mapping
    pub fn insert_pair(
        &self,
        _guard: &WriteGuard<'_>,
        protocol: NaptProtocol,
        public: AddressPair,
        private: AddressPair,
    ) {
        let table = self.table(protocol);
        table.public_to_private.insert(public, private);
        table.private_to_public.insert(private, public);
    }

    /// Replace the state of `port`
    pub fn set_port_state(
        &self,
        _guard: &WriteGuard<'_>,
        protocol: NaptProtocol,
        port: u16,
        state: PortState,
    ) {
        self.table(protocol).ports.insert(port, state);
    }

    /// Mutate the state of a port in place; returns `None` if it has none.
    pub fn update_port_state<R>(
        &self,
        _guard: &WriteGuard<'_>,
        protocol: NaptProtocol,
        port: u16,
        f: impl FnOnce(&mut PortState) -> R,
    ) -> Option<R> {
        self.table(protocol)
            .ports
            .get_mut(&port)
            .map(|mut state| f(state.value_mut()))
    }

    /// Delete both directions of the mapping on `public_port` and free the
    /// port. Returns the removed (public, private) pairs, if any.
    pub fn remove(
        &self,
        _guard: &WriteGuard<'_>,
        protocol: NaptProtocol,
        public_port: u16,
    ) -> Option<(AddressPair, AddressPair)> {
        let table = self.table(protocol);
        let (_, state) = table.ports.remove(&public_port)?;
        let public = AddressPair::new(state.owner_address, public_port);
        let (_, private) = table.public_to_private.remove(&public)?;
        table.private_to_public.remove(&private);
        Some((public, private))
    }

    /// Number of live mappings for `protocol`
    pub fn len(&self, protocol: NaptProtocol) -> usize {
        self.table(protocol).public_to_private.len()
    }

    pub fn is_empty(&self) -> bool {
        NaptProtocol::ALL.iter().all(|p| self.len(*p) == 0)
    }
}
