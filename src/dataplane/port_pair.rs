//! Public/private attachment points and the translation state they share

use super::attachment::{AttachmentPoint, Side};
use super::connection_table::{
    AddressPair, ConnectionTable, Direction, NaptProtocol, PortState, WriteGuard,
};
use super::port_allocator::PortAllocator;
use super::tcp_tracker::{self, TerminationAction};
use crate::config::{NaptConfig, PortPairConfig};
use crate::protocol::tcp::TcpFlags;
use crate::Result;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Aging parameters shared by every pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaptTimeouts {
    pub connection: Duration,
    pub port_reuse: Duration,
}

impl NaptTimeouts {
    /// Timeouts from the `[napt]` section
    pub fn from_config(config: &NaptConfig) -> Self {
        Self {
            connection: config.connection_timeout(),
            port_reuse: config.port_reuse_timeout(),
        }
    }
}

/// Outcome of a table lookup with aging applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Mapping found and refreshed; holds the translated pair
    Hit(AddressPair),
    Miss,
    /// Mapping found but idle for too long; it has been evicted
    Stale,
}

/// Outcome of [`PortPair::allocate_egress_connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    Created(AddressPair),
    /// Another worker created the mapping while we waited for the lock
    Existing(AddressPair),
}

impl Allocation {
    /// The public pair, whoever created it
    pub fn public(self) -> AddressPair {
        match self {
            Allocation::Created(pair) | Allocation::Existing(pair) => pair,
        }
    }
}

#[derive(Debug)]
pub struct PortPair {
    pub index: usize,
    public: AttachmentPoint,
    private: AttachmentPoint,
    table: ConnectionTable,
    allocator: PortAllocator,
    timeouts: NaptTimeouts,
}

impl PortPair {
    /// Build the pair at `index` with empty tables
    pub fn new(index: usize, config: &PortPairConfig, napt: &NaptConfig) -> Self {
        let timeouts = NaptTimeouts::from_config(napt);
        Self {
            index,
            public: AttachmentPoint::new(&config.public, Side::Public),
            private: AttachmentPoint::new(&config.private, Side::Private),
            table: ConnectionTable::new(),
            allocator: PortAllocator::new(napt.port_range(), timeouts.connection),
            timeouts,
        }
    }

    /// Attachment point on `side`
    pub fn attachment(&self, side: Side) -> &AttachmentPoint {
        match side {
            Side::Public => &self.public,
            Side::Private => &self.private,
        }
    }

    /// Translation table shared by both sides
    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    /// Aging parameters
    pub fn timeouts(&self) -> NaptTimeouts {
        self.timeouts
    }

    /// Public address every dynamic mapping is owned by
    pub fn public_address(&self) -> Ipv4Addr {
        self.public.address
    }

    /// Look up a public destination. Stale mappings are evicted.
    pub fn lookup_ingress(&self, protocol: NaptProtocol, key: AddressPair, now: Instant) -> Lookup {
        match self.table.lookup_public(protocol, &key) {
            None => Lookup::Miss,
            Some(private) => {
                if self.table.touch(protocol, key.port, now, self.timeouts.connection) {
                    Lookup::Hit(private)
                } else {
                    self.evict_stale(protocol, key.port, now);
                    Lookup::Stale
                }
            }
        }
    }

    /// Look up a private source. Stale mappings are evicted.
    pub fn lookup_egress(&self, protocol: NaptProtocol, key: AddressPair, now: Instant) -> Lookup {
        match self.table.lookup_private(protocol, &key) {
            None => Lookup::Miss,
            Some(public) => {
                if self.table.touch(protocol, public.port, now, self.timeouts.connection) {
                    Lookup::Hit(public)
                } else {
                    self.evict_stale(protocol, public.port, now);
                    Lookup::Stale
                }
            }
        }
    }

    /// True if `key` has a mapping whose port is still fresh. Read only.
    pub fn has_live_mapping(&self, protocol: NaptProtocol, key: AddressPair, now: Instant) -> bool {
        self.table.lookup_public(protocol, &key).is_some()
            && self
                .table
                .port_state(protocol, key.port)
                .is_some_and(|state| state.is_fresh(now, self.timeouts.connection))
    }

    fn evict_stale(&self, protocol: NaptProtocol, port: u16, now: Instant) {
        let guard = self.table.lock();
        // Another worker may have refreshed or replaced it meanwhile
        let still_stale = self
            .table
            .port_state(protocol, port)
            .is_some_and(|state| !state.is_fresh(now, self.timeouts.connection));
        if still_stale {
            if let Some((public, private)) = self.delete_connection(&guard, protocol, port) {
                debug!(pair = self.index, %protocol, %public, %private, "expired mapping");
            }
        }
    }

    /// Create a mapping for `private`, or return the one another worker
    /// created first.
    pub fn allocate_egress_connection(
        &self,
        protocol: NaptProtocol,
        private: AddressPair,
        now: Instant,
    ) -> Result<Allocation> {
        let guard = self.table.lock();
        if let Some(public) = self.table.lookup_private(protocol, &private) {
            if self.table.touch(protocol, public.port, now, self.timeouts.connection) {
                return Ok(Allocation::Existing(public));
            }
            self.delete_connection(&guard, protocol, public.port);
        }

        let owner = self.public.address;
        let port = self
            .allocator
            .allocate(&guard, &self.table, protocol, owner, now)?;
        let public = AddressPair::new(owner, port);
        self.table.insert_pair(&guard, protocol, public, private);
        debug!(pair = self.index, %protocol, %public, %private, "created mapping");
        Ok(Allocation::Created(public))
    }

    /// Remove both directions of the mapping on `public_port` and free it
    pub fn delete_connection(
        &self,
        guard: &WriteGuard<'_>,
        protocol: NaptProtocol,
        public_port: u16,
    ) -> Option<(AddressPair, AddressPair)> {
        self.table.remove(guard, protocol, public_port)
    }

    /// Feed a TCP segment on `public_port` to the termination tracker.
    ///
    /// Reset frees the port at once. Closed frees the mapping and holds the
    /// port back for the reuse timeout. Static ports are never torn down.
    pub fn check_tcp_termination(
        &self,
        public_port: u16,
        flags: TcpFlags,
        direction: Direction,
        now: Instant,
    ) -> TerminationAction {
        let guard = self.table.lock();
        let action = self
            .table
            .update_port_state(&guard, NaptProtocol::Tcp, public_port, |state| {
                if state.is_static {
                    TerminationAction::None
                } else {
                    tcp_tracker::observe(state, flags, direction)
                }
            })
            .unwrap_or(TerminationAction::None);

        match action {
            TerminationAction::None => {}
            TerminationAction::Reset => {
                if let Some((public, private)) =
                    self.delete_connection(&guard, NaptProtocol::Tcp, public_port)
                {
                    debug!(pair = self.index, %public, %private, "connection reset");
                }
            }
            TerminationAction::Closed => {
                if let Some((public, private)) =
                    self.delete_connection(&guard, NaptProtocol::Tcp, public_port)
                {
                    debug!(pair = self.index, %public, %private, "connection closed");
                }
                let reserved = PortState {
                    last_used: tcp_tracker::reuse_instant(
                        now,
                        self.timeouts.connection,
                        self.timeouts.port_reuse,
                    ),
                    ..PortState::new(self.public.address, now)
                };
                self.table
                    .set_port_state(&guard, NaptProtocol::Tcp, public_port, reserved);
            }
        }
        action
    }

    /// Install a permanent mapping of `public_port` to `private`
    pub fn add_static_mapping(
        &self,
        protocol: NaptProtocol,
        public_port: u16,
        private: AddressPair,
        now: Instant,
    ) {
        let guard = self.table.lock();
        let owner = self.public.address;
        self.table.set_port_state(
            &guard,
            protocol,
            public_port,
            PortState::new_static(owner, now),
        );
        self.table
            .insert_pair(&guard, protocol, AddressPair::new(owner, public_port), private);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttachmentConfig;
    use crate::protocol::MacAddr;

    const PUBLIC: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 1);
    const HOST: AddressPair = AddressPair::new(Ipv4Addr::new(10, 0, 0, 5), 4000);

    fn pair(range: (u16, u16)) -> PortPair {
        pair_with(NaptConfig {
            port_range: range,
            ..NaptConfig::default()
        })
    }

    fn pair_with(napt: NaptConfig) -> PortPair {
        let config = PortPairConfig {
            public: AttachmentConfig {
                interface: "eth0".into(),
                address: PUBLIC,
                mac: MacAddr([0x02, 0, 0, 0, 0, 0x01]),
                vlan: 0,
                kernel_fallback: None,
            },
            private: AttachmentConfig {
                interface: "eth1".into(),
                address: Ipv4Addr::new(10, 0, 0, 1),
                mac: MacAddr([0x02, 0, 0, 0, 0, 0x02]),
                vlan: 0,
                kernel_fallback: None,
            },
            static_mappings: Vec::new(),
        };
        PortPair::new(0, &config, &napt)
    }

    #[test]
    fn test_allocate_then_lookup_both_ways() {
        let pp = pair((1024, 1030));
        let now = Instant::now();

        let public = pp
            .allocate_egress_connection(NaptProtocol::Udp, HOST, now)
            .unwrap();
        assert_eq!(public, Allocation::Created(AddressPair::new(PUBLIC, 1024)));

        assert_eq!(
            pp.lookup_egress(NaptProtocol::Udp, HOST, now),
            Lookup::Hit(public.public())
        );
        assert_eq!(
            pp.lookup_ingress(NaptProtocol::Udp, public.public(), now),
            Lookup::Hit(HOST)
        );
        assert_eq!(
            pp.lookup_ingress(NaptProtocol::Tcp, public.public(), now),
            Lookup::Miss
        );
    }

    #[test]
    fn test_second_allocation_returns_existing_mapping() {
        let pp = pair((1024, 1030));
        let now = Instant::now();
        let first = pp
            .allocate_egress_connection(NaptProtocol::Tcp, HOST, now)
            .unwrap();
        let second = pp
            .allocate_egress_connection(NaptProtocol::Tcp, HOST, now)
            .unwrap();

        assert_eq!(second, Allocation::Existing(first.public()));
        assert_eq!(pp.table().len(NaptProtocol::Tcp), 1);
    }

    #[test]
    fn test_stale_lookup_evicts() {
        let pp = pair((1024, 1030));
        let start = Instant::now();
        let public = pp
            .allocate_egress_connection(NaptProtocol::Udp, HOST, start)
            .unwrap()
            .public();

        let later = start + pp.timeouts().connection + Duration::from_secs(1);
        assert_eq!(pp.lookup_ingress(NaptProtocol::Udp, public, later), Lookup::Stale);
        assert_eq!(pp.lookup_ingress(NaptProtocol::Udp, public, later), Lookup::Miss);
        assert_eq!(pp.lookup_egress(NaptProtocol::Udp, HOST, later), Lookup::Miss);
        assert!(pp.table().port_state(NaptProtocol::Udp, public.port).is_none());
    }

    #[test]
    fn test_stale_egress_lookup_evicts_both_directions() {
        let pp = pair((1024, 1030));
        let start = Instant::now();
        let public = pp
            .allocate_egress_connection(NaptProtocol::Tcp, HOST, start)
            .unwrap()
            .public();

        let later = start + pp.timeouts().connection + Duration::from_secs(1);
        assert_eq!(pp.lookup_egress(NaptProtocol::Tcp, HOST, later), Lookup::Stale);
        assert_eq!(pp.table().lookup_public(NaptProtocol::Tcp, &public), None);
        assert_eq!(pp.lookup_egress(NaptProtocol::Tcp, HOST, later), Lookup::Miss);
        assert!(pp.table().is_empty());
    }

    #[test]
    fn test_close_with_huge_reuse_timeout_holds_port() {
        let pp = pair_with(NaptConfig {
            port_range: (1024, 1024),
            port_reuse_timeout_secs: i64::MAX as u64,
            ..NaptConfig::default()
        });
        let now = Instant::now();
        let public = pp
            .allocate_egress_connection(NaptProtocol::Tcp, HOST, now)
            .unwrap()
            .public();

        let fin = TcpFlags::from_byte(TcpFlags::FIN | TcpFlags::ACK);
        let ack = TcpFlags::from_byte(TcpFlags::ACK);
        pp.check_tcp_termination(public.port, fin, Direction::PrivateToPublic, now);
        pp.check_tcp_termination(public.port, fin, Direction::PublicToPrivate, now);
        let action = pp.check_tcp_termination(public.port, ack, Direction::PrivateToPublic, now);
        assert_eq!(action, TerminationAction::Closed);

        let other = AddressPair::new(Ipv4Addr::new(10, 0, 0, 6), 5000);
        let next_year = now + Duration::from_secs(60 * 60 * 24 * 365);
        assert!(
            pp.allocate_egress_connection(NaptProtocol::Tcp, other, next_year)
                .is_err()
        );
    }

    #[test]
    fn test_rst_frees_port_immediately() {
        let pp = pair((1024, 1024));
        let now = Instant::now();
        let public = pp
            .allocate_egress_connection(NaptProtocol::Tcp, HOST, now)
            .unwrap()
            .public();

        let action = pp.check_tcp_termination(
            public.port,
            TcpFlags::from_byte(TcpFlags::RST),
            Direction::PublicToPrivate,
            now,
        );
        assert_eq!(action, TerminationAction::Reset);
        assert!(pp.table().is_empty());

        let other = AddressPair::new(Ipv4Addr::new(10, 0, 0, 6), 5000);
        assert_eq!(
            pp.allocate_egress_connection(NaptProtocol::Tcp, other, now)
                .unwrap()
                .public()
                .port,
            1024
        );
    }

    #[test]
    fn test_close_holds_port_for_reuse_timeout() {
        let pp = pair((1024, 1024));
        let now = Instant::now();
        let public = pp
            .allocate_egress_connection(NaptProtocol::Tcp, HOST, now)
            .unwrap()
            .public();

        let fin = TcpFlags::from_byte(TcpFlags::FIN | TcpFlags::ACK);
        let ack = TcpFlags::from_byte(TcpFlags::ACK);
        pp.check_tcp_termination(public.port, fin, Direction::PrivateToPublic, now);
        pp.check_tcp_termination(public.port, fin, Direction::PublicToPrivate, now);
        let action = pp.check_tcp_termination(public.port, ack, Direction::PrivateToPublic, now);
        assert_eq!(action, TerminationAction::Closed);
        assert_eq!(pp.table().len(NaptProtocol::Tcp), 0);
        assert!(pp.table().port_state(NaptProtocol::Tcp, 1024).is_some());

        let other = AddressPair::new(Ipv4Addr::new(10, 0, 0, 6), 5000);
        let reuse = pp.timeouts().port_reuse;
        assert!(
            pp.allocate_egress_connection(NaptProtocol::Tcp, other, now + reuse)
                .is_err()
        );
        let allocated = pp
            .allocate_egress_connection(
                NaptProtocol::Tcp,
                other,
                now + reuse + Duration::from_millis(1),
            )
            .unwrap();
        assert_eq!(allocated.public().port, 1024);
    }

    #[test]
    fn test_static_mapping_survives_reset_and_age() {
        let pp = pair((1024, 1030));
        let now = Instant::now();
        let private = AddressPair::new(Ipv4Addr::new(10, 0, 0, 5), 22);
        pp.add_static_mapping(NaptProtocol::Tcp, 2222, private, now);

        let public = AddressPair::new(PUBLIC, 2222);
        let action = pp.check_tcp_termination(
            2222,
            TcpFlags::from_byte(TcpFlags::RST),
            Direction::PublicToPrivate,
            now,
        );
        assert_eq!(action, TerminationAction::None);

        let much_later = now + Duration::from_secs(86_400);
        assert_eq!(
            pp.lookup_ingress(NaptProtocol::Tcp, public, much_later),
            Lookup::Hit(private)
        );
        assert!(pp.has_live_mapping(NaptProtocol::Tcp, public, much_later));
    }
}
