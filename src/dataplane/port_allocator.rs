//! Public port pool

use super::connection_table::{ConnectionTable, NaptProtocol, PortState, WriteGuard};
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};
use tracing::debug;

/// Hands out the lowest free public port of the configured range
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    connection_timeout: Duration,
}

impl PortAllocator {
    /// Pool over `range`; owned ports idle past `connection_timeout` are reclaimable
    pub fn new(range: RangeInclusive<u16>, connection_timeout: Duration) -> Self {
        Self {
            range,
            connection_timeout,
        }
    }

    /// Configured port range
    pub fn range(&self) -> &RangeInclusive<u16> {
        &self.range
    }

    /// Claim a port for `owner`. The returned port already carries a fresh
    /// [`PortState`]; any stale mapping that held it has been evicted.
    pub fn allocate(
        &self,
        guard: &WriteGuard<'_>,
        table: &ConnectionTable,
        protocol: NaptProtocol,
        owner: Ipv4Addr,
        now: Instant,
    ) -> Result<u16> {
        let port = self
            .range
            .clone()
            .find(|port| match table.port_state(protocol, *port) {
                None => true,
                Some(state) => state.is_reclaimable(now, self.connection_timeout),
            })
            .ok_or(Error::PortPoolExhausted { protocol })?;

        if let Some((public, private)) = table.remove(guard, protocol, port) {
            debug!(?protocol, %public, %private, "evicted idle mapping for reuse");
        }
        table.set_port_state(guard, protocol, port, PortState::new(owner, now));
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::AddressPair;

    const PUBLIC: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 1);
    const TIMEOUT: Duration = Duration::from_secs(60);

    fn allocate(
        allocator: &PortAllocator,
        table: &ConnectionTable,
        protocol: NaptProtocol,
        now: Instant,
    ) -> Result<u16> {
        let guard = table.lock();
        allocator.allocate(&guard, table, protocol, PUBLIC, now)
    }

    #[test]
    fn test_allocates_lowest_free_port() {
        let allocator = PortAllocator::new(1024..=1030, TIMEOUT);
        let table = ConnectionTable::new();
        let now = Instant::now();

        assert_eq!(allocate(&allocator, &table, NaptProtocol::Tcp, now).unwrap(), 1024);
        assert_eq!(allocate(&allocator, &table, NaptProtocol::Tcp, now).unwrap(), 1025);
        // Separate pool per protocol
        assert_eq!(allocate(&allocator, &table, NaptProtocol::Udp, now).unwrap(), 1024);

        let state = table.port_state(NaptProtocol::Tcp, 1025).unwrap();
        assert_eq!(state.owner_address, PUBLIC);
        assert_eq!(state.last_used, now);
        assert_eq!(state.fin_count, 0);
        assert!(!state.is_static);
    }

    #[test]
    fn test_freed_port_is_reused_first() {
        let allocator = PortAllocator::new(1024..=1030, TIMEOUT);
        let table = ConnectionTable::new();
        let now = Instant::now();
        for _ in 0..3 {
            allocate(&allocator, &table, NaptProtocol::Udp, now).unwrap();
        }

        let guard = table.lock();
        table.remove(&guard, NaptProtocol::Udp, 1025);
        drop(guard);

        assert_eq!(allocate(&allocator, &table, NaptProtocol::Udp, now).unwrap(), 1025);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let allocator = PortAllocator::new(1024..=1025, TIMEOUT);
        let table = ConnectionTable::new();
        let now = Instant::now();
        allocate(&allocator, &table, NaptProtocol::Icmp, now).unwrap();
        allocate(&allocator, &table, NaptProtocol::Icmp, now).unwrap();

        let err = allocate(&allocator, &table, NaptProtocol::Icmp, now).unwrap_err();
        assert!(matches!(
            err,
            Error::PortPoolExhausted {
                protocol: NaptProtocol::Icmp
            }
        ));
    }

    #[test]
    fn test_idle_port_is_reclaimed_with_its_mapping() {
        let allocator = PortAllocator::new(1024..=1024, TIMEOUT);
        let table = ConnectionTable::new();
        let start = Instant::now();

        let port = allocate(&allocator, &table, NaptProtocol::Tcp, start).unwrap();
        let old_private = AddressPair::new(Ipv4Addr::new(10, 0, 0, 5), 4000);
        let guard = table.lock();
        table.insert_pair(
            &guard,
            NaptProtocol::Tcp,
            AddressPair::new(PUBLIC, port),
            old_private,
        );
        drop(guard);

        // Still within the timeout: nothing to give out
        let within = start + TIMEOUT;
        assert!(allocate(&allocator, &table, NaptProtocol::Tcp, within).is_err());

        let after = start + TIMEOUT + Duration::from_secs(1);
        assert_eq!(allocate(&allocator, &table, NaptProtocol::Tcp, after).unwrap(), 1024);
        assert!(table.lookup_private(NaptProtocol::Tcp, &old_private).is_none());
        assert_eq!(
            table.port_state(NaptProtocol::Tcp, 1024).unwrap().last_used,
            after
        );
    }

    #[test]
    fn test_static_port_is_never_reclaimed() {
        let allocator = PortAllocator::new(1024..=1024, TIMEOUT);
        let table = ConnectionTable::new();
        let start = Instant::now();
        let guard = table.lock();
        table.set_port_state(
            &guard,
            NaptProtocol::Udp,
            1024,
            PortState::new_static(PUBLIC, start),
        );
        drop(guard);

        let much_later = start + Duration::from_secs(3600);
        assert!(allocate(&allocator, &table, NaptProtocol::Udp, much_later).is_err());
    }

    #[test]
    fn test_reserved_port_waits_until_reserve_expires() {
        let allocator = PortAllocator::new(1024..=1024, TIMEOUT);
        let table = ConnectionTable::new();
        let now = Instant::now();
        let guard = table.lock();
        table.set_port_state(
            &guard,
            NaptProtocol::Tcp,
            1024,
            PortState {
                last_used: now + Duration::from_secs(10),
                ..PortState::new(PUBLIC, now)
            },
        );
        drop(guard);

        assert!(allocate(&allocator, &table, NaptProtocol::Tcp, now + TIMEOUT).is_err());
        let free_at = now + Duration::from_secs(10) + TIMEOUT + Duration::from_millis(1);
        assert_eq!(allocate(&allocator, &table, NaptProtocol::Tcp, free_at).unwrap(), 1024);
    }
}
