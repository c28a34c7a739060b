//! Metrics collection for translation statistics.
//!
//! Provides thread-safe counters for tracking packet dispositions and
//! connection lifecycle, globally and per interface.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface statistics.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    pub rx_packets: Counter,
    pub rx_bytes: Counter,
    pub tx_packets: Counter,
    pub tx_bytes: Counter,
    pub rx_errors: Counter,
    pub tx_errors: Counter,
}

impl InterfaceStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one received frame
    pub fn record_rx(&self, bytes: usize) {
        self.rx_packets.inc();
        self.rx_bytes.add(bytes as u64);
    }

    /// Count one sent frame
    pub fn record_tx(&self, bytes: usize) {
        self.tx_packets.inc();
        self.tx_bytes.add(bytes as u64);
    }
}

/// Global metrics registry for the translator.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    interfaces: RwLock<HashMap<String, InterfaceStats>>,

    // Dispositions
    pub packets_translated: Counter,
    pub packets_dropped: Counter,
    pub packets_to_kernel: Counter,

    // ARP
    pub arp_requests_sent: Counter,
    pub arp_replies_sent: Counter,

    pub icmp_echo_replies: Counter,

    // Connection lifecycle
    pub connections_created: Counter,
    pub connections_expired: Counter,
    pub connections_closed: Counter,
    pub connections_reset: Counter,
    pub port_pool_exhausted: Counter,

    /// Live mappings across all pairs, refreshed by the runner
    pub active_connections: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interface for statistics tracking.
    pub fn register_interface(&self, name: &str) {
        self.interfaces.write().entry(name.to_string()).or_default();
    }

    /// Count a received frame on `interface`
    pub fn record_rx(&self, interface: &str, bytes: usize) {
        if let Some(stats) = self.interfaces.read().get(interface) {
            stats.record_rx(bytes);
        }
    }

    /// Count a sent frame on `interface`
    pub fn record_tx(&self, interface: &str, bytes: usize) {
        if let Some(stats) = self.interfaces.read().get(interface) {
            stats.record_tx(bytes);
        }
    }

    /// Count a receive error on `interface`
    pub fn record_rx_error(&self, interface: &str) {
        if let Some(stats) = self.interfaces.read().get(interface) {
            stats.rx_errors.inc();
        }
    }

    /// Count a send error on `interface`
    pub fn record_tx_error(&self, interface: &str) {
        if let Some(stats) = self.interfaces.read().get(interface) {
            stats.tx_errors.inc();
        }
    }

    /// Update the live mapping gauge
    pub fn set_active_connections(&self, count: usize) {
        self.active_connections.store(count as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("packets_translated".into(), self.packets_translated.get()),
            ("packets_dropped".into(), self.packets_dropped.get()),
            ("packets_to_kernel".into(), self.packets_to_kernel.get()),
            ("arp_requests_sent".into(), self.arp_requests_sent.get()),
            ("arp_replies_sent".into(), self.arp_replies_sent.get()),
            ("icmp_echo_replies".into(), self.icmp_echo_replies.get()),
            ("connections_created".into(), self.connections_created.get()),
            ("connections_expired".into(), self.connections_expired.get()),
            ("connections_closed".into(), self.connections_closed.get()),
            ("connections_reset".into(), self.connections_reset.get()),
            ("port_pool_exhausted".into(), self.port_pool_exhausted.get()),
            (
                "active_connections".into(),
                self.active_connections.load(Ordering::Relaxed),
            ),
        ];

        let interfaces = self.interfaces.read();
        let mut names: Vec<&String> = interfaces.keys().collect();
        names.sort();
        for name in names {
            let stats = &interfaces[name];
            result.extend([
                (format!("{}_rx_packets", name), stats.rx_packets.get()),
                (format!("{}_rx_bytes", name), stats.rx_bytes.get()),
                (format!("{}_tx_packets", name), stats.tx_packets.get()),
                (format!("{}_tx_bytes", name), stats.tx_bytes.get()),
                (format!("{}_rx_errors", name), stats.rx_errors.get()),
                (format!("{}_tx_errors", name), stats.tx_errors.get()),
            ]);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.add(10);
        assert_eq!(counter.get(), 11);
    }

    #[test]
    fn test_interface_stats() {
        let stats = InterfaceStats::new();

        stats.record_rx(100);
        stats.record_rx(200);
        stats.record_tx(150);

        assert_eq!(stats.rx_packets.get(), 2);
        assert_eq!(stats.rx_bytes.get(), 300);
        assert_eq!(stats.tx_packets.get(), 1);
        assert_eq!(stats.tx_bytes.get(), 150);
    }

    #[test]
    fn test_metrics_registry() {
        let registry = MetricsRegistry::new();

        registry.register_interface("eth0");
        registry.register_interface("eth1");

        registry.record_rx("eth0", 100);
        registry.record_tx("eth0", 200);
        registry.record_rx("eth1", 50);
        registry.record_tx_error("eth1");
        // Unknown interfaces are ignored
        registry.record_rx("eth9", 10);

        registry.packets_translated.inc();
        registry.arp_requests_sent.add(5);
        registry.set_active_connections(3);

        let metrics = registry.export();

        assert!(metrics.contains(&("packets_translated".into(), 1)));
        assert!(metrics.contains(&("arp_requests_sent".into(), 5)));
        assert!(metrics.contains(&("active_connections".into(), 3)));

        assert!(metrics.contains(&("eth0_rx_packets".into(), 1)));
        assert!(metrics.contains(&("eth0_rx_bytes".into(), 100)));
        assert!(metrics.contains(&("eth1_rx_packets".into(), 1)));
        assert!(metrics.contains(&("eth1_tx_errors".into(), 1)));
        assert!(!metrics.iter().any(|(key, _)| key.starts_with("eth9")));
    }
}
