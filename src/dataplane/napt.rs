//! NAPT (Network Address Port Translation) engine - RFC 3022
//!
//! Many private hosts share the public address of each port pair. Egress
//! traffic gets a public port from the pair's pool, ingress traffic is only
//! let through when a mapping already exists. Each call decides what to do
//! with one frame and edits it in place; the caller does the I/O.

use super::arp_processor::{ArpAction, process_arp};
use super::attachment::Side;
use super::connection_table::{AddressPair, Direction, NaptProtocol};
use super::icmp_responder;
use super::port_pair::{Allocation, Lookup, PortPair};
use super::tcp_tracker::TerminationAction;
use crate::config::{self, Config};
use crate::protocol::arp::ArpPacket;
use crate::protocol::packet::{self, Ipv4Meta, L3, L4Header, ParsedFrame, Rewrite};
use crate::protocol::{ChecksumMode, VlanTag};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::fmt;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Why a frame was not sent anywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Ingress without a mapping
    NoMapping,
    /// Ingress mapping idle past the connection timeout
    Expired,
    PortPoolExhausted,
    /// Not ARP, or IPv4 without TCP/UDP/ICMP
    Unsupported,
    Malformed,
    ArpIgnored,
    /// ARP reply consumed by the cache
    ArpLearned,
}

impl DropReason {
    /// Short label for logs
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::NoMapping => "no-mapping",
            DropReason::Expired => "expired",
            DropReason::PortPoolExhausted => "port-pool-exhausted",
            DropReason::Unsupported => "unsupported",
            DropReason::Malformed => "malformed",
            DropReason::ArpIgnored => "arp-ignored",
            DropReason::ArpLearned => "arp-learned",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller must do with a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The frame was translated in place; send it out of `side`
    Forward { side: Side },
    Drop(DropReason),
    /// Send the untouched frame to the kernel fallback of `side`
    ToKernel { side: Side },
    /// Next hop unknown: send `request` out of `side` and drop the frame
    ArpPending { side: Side, request: Vec<u8> },
    /// Send `frame` out of `side`; the original is consumed
    Reply { side: Side, frame: Vec<u8> },
}

impl Disposition {
    fn kind(&self) -> &'static str {
        match self {
            Disposition::Forward { .. } => "forward",
            Disposition::Drop(reason) => reason.as_str(),
            Disposition::ToKernel { .. } => "kernel",
            Disposition::ArpPending { .. } => "arp-pending",
            Disposition::Reply { .. } => "reply",
        }
    }
}

/// Translation engine for every configured port pair
#[derive(Debug)]
pub struct NaptEngine {
    pairs: Vec<PortPair>,
    checksum: ChecksumMode,
    metrics: Arc<MetricsRegistry>,
}

impl NaptEngine {
    /// Build the engine from a validated configuration and seed static
    /// mappings.
    pub fn new(config: &Config, metrics: Arc<MetricsRegistry>) -> Result<Self> {
        let diagnostics = config::validate(config);
        if diagnostics.has_errors() {
            return Err(Error::Config(diagnostics.errors.join("; ")));
        }

        let now = Instant::now();
        let pairs: Vec<PortPair> = config
            .port_pairs
            .iter()
            .enumerate()
            .map(|(index, pair_config)| {
                let pair = PortPair::new(index, pair_config, &config.napt);
                for mapping in &pair_config.static_mappings {
                    pair.add_static_mapping(
                        mapping.protocol,
                        mapping.public_port,
                        mapping.private.into(),
                        now,
                    );
                    debug!(
                        pair = index,
                        protocol = %mapping.protocol,
                        public_port = mapping.public_port,
                        private = %mapping.private,
                        "installed static mapping"
                    );
                }
                pair
            })
            .collect();

        for pair in &pairs {
            for side in [Side::Public, Side::Private] {
                metrics.register_interface(&pair.attachment(side).name);
            }
        }

        Ok(Self {
            pairs,
            checksum: config.napt.checksum,
            metrics,
        })
    }

    /// All configured port pairs
    pub fn pairs(&self) -> &[PortPair] {
        &self.pairs
    }

    /// Port pair by index
    pub fn pair(&self, index: usize) -> Option<&PortPair> {
        self.pairs.get(index)
    }

    /// Shared metrics registry
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// How checksums are finalized after a rewrite
    pub fn checksum_mode(&self) -> ChecksumMode {
        self.checksum
    }

    /// Live mappings over all pairs and protocols
    pub fn active_connections(&self) -> usize {
        self.pairs
            .iter()
            .flat_map(|pair| NaptProtocol::ALL.map(|protocol| pair.table().len(protocol)))
            .sum()
    }

    /// Process a frame received on `side` of pair `pair`
    pub fn process(&self, pair: usize, side: Side, frame: &mut [u8]) -> Disposition {
        self.process_at(pair, side, frame, Instant::now())
    }

    /// [`process`](Self::process) with an explicit clock
    pub fn process_at(
        &self,
        pair: usize,
        side: Side,
        frame: &mut [u8],
        now: Instant,
    ) -> Disposition {
        let Some(pp) = self.pairs.get(pair) else {
            warn!(pair, "frame for unknown port pair");
            return self.finish(pair, side, Disposition::Drop(DropReason::Unsupported));
        };

        let parsed = match packet::parse_frame(frame) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(pair, %side, error = %err, "unparsable frame");
                return self.finish(pair, side, Disposition::Drop(DropReason::Malformed));
            }
        };

        let disposition = match &parsed.l3 {
            L3::Arp(arp) => self.handle_arp(pp, side, arp, parsed.vlan),
            L3::Other(ethertype) => {
                trace!(pair, %side, ethertype = *ethertype, "not IPv4");
                Disposition::Drop(DropReason::Unsupported)
            }
            L3::Ipv4(meta) => match side {
                Side::Public => self.ingress(pp, frame, &parsed, meta, now),
                Side::Private => self.egress(pp, frame, &parsed, meta, now),
            },
        };
        self.finish(pair, side, disposition)
    }

    fn finish(&self, pair: usize, side: Side, disposition: Disposition) -> Disposition {
        match &disposition {
            Disposition::Forward { .. } => self.metrics.packets_translated.inc(),
            Disposition::Drop(_) => self.metrics.packets_dropped.inc(),
            Disposition::ToKernel { .. } => self.metrics.packets_to_kernel.inc(),
            Disposition::ArpPending { .. } => {
                self.metrics.arp_requests_sent.inc();
                self.metrics.packets_dropped.inc();
            }
            Disposition::Reply { .. } => {}
        }
        trace!(pair, %side, disposition = disposition.kind(), "processed frame");
        disposition
    }

    fn handle_arp(
        &self,
        pp: &PortPair,
        side: Side,
        arp: &ArpPacket,
        vlan: Option<VlanTag>,
    ) -> Disposition {
        match process_arp(arp, vlan, pp.attachment(side)) {
            ArpAction::Learned => Disposition::Drop(DropReason::ArpLearned),
            ArpAction::ToKernel => Disposition::ToKernel { side },
            ArpAction::Reply(frame) => {
                self.metrics.arp_replies_sent.inc();
                Disposition::Reply { side, frame }
            }
            ArpAction::Ignored => Disposition::Drop(DropReason::ArpIgnored),
        }
    }

    /// Public to private. Never creates mappings.
    fn ingress(
        &self,
        pp: &PortPair,
        frame: &mut [u8],
        parsed: &ParsedFrame,
        meta: &Ipv4Meta,
        now: Instant,
    ) -> Disposition {
        let point = pp.attachment(Side::Public);
        let (Some(protocol), Some(port)) = (NaptProtocol::from_l4(&meta.l4), meta.l4.dst_port())
        else {
            return Disposition::Drop(DropReason::Unsupported);
        };
        let key = AddressPair::new(meta.dst, port);

        if protocol == NaptProtocol::Icmp && meta.dst == point.address {
            let handled = self.self_echo(pp, Side::Public, frame, parsed, Some(key), now);
            if let Some(disposition) = handled {
                return disposition;
            }
        }

        let private = match pp.lookup_ingress(protocol, key, now) {
            Lookup::Hit(private) => private,
            Lookup::Miss => return Disposition::Drop(DropReason::NoMapping),
            Lookup::Stale => {
                self.metrics.connections_expired.inc();
                return Disposition::Drop(DropReason::Expired);
            }
        };
        if private.is_kernel() {
            return Disposition::ToKernel { side: Side::Public };
        }

        if let L4Header::Tcp { flags, .. } = meta.l4 {
            let action = pp.check_tcp_termination(key.port, flags, Direction::PublicToPrivate, now);
            self.record_termination(action);
        }

        let out = pp.attachment(Side::Private);
        let Some(dst_mac) = out.arp.lookup(private.address) else {
            return Disposition::ArpPending {
                side: Side::Private,
                request: out.arp_request(private.address),
            };
        };
        let rewrite = Rewrite {
            dst_mac,
            // The receiving attachment point stamps its own MAC
            src_mac: point.mac,
            vlan_id: out.vlan,
            source: None,
            destination: Some(private.into()),
        };
        self.rewrite(frame, parsed, &rewrite, Side::Private)
    }

    /// Private to public. Allocates a public port on a miss.
    fn egress(
        &self,
        pp: &PortPair,
        frame: &mut [u8],
        parsed: &ParsedFrame,
        meta: &Ipv4Meta,
        now: Instant,
    ) -> Disposition {
        let point = pp.attachment(Side::Private);
        if meta.dst == point.address && point.has_kernel_fallback() {
            return Disposition::ToKernel { side: Side::Private };
        }

        let (Some(protocol), Some(port)) = (NaptProtocol::from_l4(&meta.l4), meta.l4.src_port())
        else {
            return Disposition::Drop(DropReason::Unsupported);
        };

        if protocol == NaptProtocol::Icmp && meta.dst == point.address {
            if let Some(disposition) = self.self_echo(pp, Side::Private, frame, parsed, None, now) {
                return disposition;
            }
        }

        let key = AddressPair::new(meta.src, port);
        let public = match pp.lookup_egress(protocol, key, now) {
            Lookup::Hit(public) => public,
            lookup => {
                if lookup == Lookup::Stale {
                    self.metrics.connections_expired.inc();
                }
                point.arp.learn(meta.src, parsed.src_mac);
                match pp.allocate_egress_connection(protocol, key, now) {
                    Ok(Allocation::Created(public)) => {
                        self.metrics.connections_created.inc();
                        public
                    }
                    Ok(Allocation::Existing(public)) => public,
                    Err(err) => {
                        warn!(
                            pair = pp.index,
                            private = %key,
                            error = %err,
                            "dropping egress packet"
                        );
                        self.metrics.port_pool_exhausted.inc();
                        return Disposition::Drop(DropReason::PortPoolExhausted);
                    }
                }
            }
        };
        if public.is_kernel() {
            return Disposition::ToKernel { side: Side::Private };
        }

        if let L4Header::Tcp { flags, .. } = meta.l4 {
            let action =
                pp.check_tcp_termination(public.port, flags, Direction::PrivateToPublic, now);
            self.record_termination(action);
        }

        let out = pp.attachment(Side::Public);
        let Some(dst_mac) = out.arp.lookup(meta.dst) else {
            return Disposition::ArpPending {
                side: Side::Public,
                request: out.arp_request(meta.dst),
            };
        };
        let rewrite = Rewrite {
            dst_mac,
            src_mac: point.mac,
            vlan_id: out.vlan,
            source: Some(SocketAddrV4::from(public)),
            destination: None,
        };
        self.rewrite(frame, parsed, &rewrite, Side::Public)
    }

    /// Echo traffic addressed to the attachment point on `side`.
    ///
    /// `None` means the packet is not ours to answer and translation
    /// continues.
    fn self_echo(
        &self,
        pp: &PortPair,
        side: Side,
        frame: &[u8],
        parsed: &ParsedFrame,
        key: Option<AddressPair>,
        now: Instant,
    ) -> Option<Disposition> {
        if pp.attachment(side).has_kernel_fallback() {
            if let Some(key) = key {
                if !pp.has_live_mapping(NaptProtocol::Icmp, key, now) {
                    return Some(Disposition::ToKernel { side });
                }
            }
        }
        if !icmp_responder::is_echo_request(parsed) {
            return None;
        }

        match icmp_responder::echo_reply(frame, parsed) {
            Ok(reply) => {
                self.metrics.icmp_echo_replies.inc();
                Some(Disposition::Reply { side, frame: reply })
            }
            Err(err) => {
                debug!(%side, error = %err, "cannot answer echo request");
                Some(Disposition::Drop(DropReason::Malformed))
            }
        }
    }

    fn rewrite(
        &self,
        frame: &mut [u8],
        parsed: &ParsedFrame,
        rewrite: &Rewrite,
        out: Side,
    ) -> Disposition {
        match packet::apply_rewrite(frame, parsed, rewrite, self.checksum) {
            Ok(()) => Disposition::Forward { side: out },
            Err(err) => {
                debug!(error = %err, "rewrite failed");
                Disposition::Drop(DropReason::Malformed)
            }
        }
    }

    fn record_termination(&self, action: TerminationAction) {
        match action {
            TerminationAction::None => {}
            TerminationAction::Reset => self.metrics.connections_reset.inc(),
            TerminationAction::Closed => self.metrics.connections_closed.inc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttachmentConfig, NaptConfig, PortPairConfig, StaticMappingConfig};
    use crate::protocol::ethernet::FrameBuilder;
    use crate::protocol::icmp::{EchoRequestBuilder, IcmpType};
    use crate::protocol::ipv4::{Ipv4Builder, Protocol};
    use crate::protocol::udp::UdpBuilder;
    use crate::protocol::{EtherType, MacAddr};
    use std::net::Ipv4Addr;

    const PUBLIC_IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 1);
    const PRIVATE_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const PUBLIC_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
    const PRIVATE_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x02]);
    const HOST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
    const HOST_MAC: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const REMOTE: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);
    const REMOTE_MAC: MacAddr = MacAddr([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]);

    fn config(public_fallback: Option<&str>, private_fallback: Option<&str>) -> Config {
        Config {
            napt: NaptConfig {
                port_range: (1024, 1100),
                ..NaptConfig::default()
            },
            port_pairs: vec![PortPairConfig {
                public: AttachmentConfig {
                    interface: "eth0".into(),
                    address: PUBLIC_IP,
                    mac: PUBLIC_MAC,
                    vlan: 0,
                    kernel_fallback: public_fallback.map(String::from),
                },
                private: AttachmentConfig {
                    interface: "eth1".into(),
                    address: PRIVATE_IP,
                    mac: PRIVATE_MAC,
                    vlan: 0,
                    kernel_fallback: private_fallback.map(String::from),
                },
                static_mappings: Vec::new(),
            }],
            ..Config::default()
        }
    }

    fn engine(config: &Config) -> NaptEngine {
        NaptEngine::new(config, Arc::new(MetricsRegistry::new())).unwrap()
    }

    fn ipv4_frame(
        dst_mac: MacAddr,
        src_mac: MacAddr,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: Protocol,
        l4: &[u8],
    ) -> Vec<u8> {
        let ip = Ipv4Builder::new()
            .protocol(protocol as u8)
            .src_addr(src)
            .dst_addr(dst)
            .payload(l4)
            .build();
        FrameBuilder::new()
            .dst_mac(dst_mac)
            .src_mac(src_mac)
            .ethertype(EtherType::Ipv4 as u16)
            .payload(&ip)
            .build()
    }

    fn ping_to(dst: Ipv4Addr, src: Ipv4Addr, dst_mac: MacAddr, identifier: u16) -> Vec<u8> {
        let icmp = EchoRequestBuilder::new(identifier, 1).payload(b"ping").build();
        ipv4_frame(dst_mac, HOST_MAC, src, dst, Protocol::Icmp, &icmp)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut bad = config(None, None);
        bad.napt.port_range = (2000, 1000);
        let err = NaptEngine::new(&bad, Arc::new(MetricsRegistry::new())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_static_mappings_are_seeded() {
        let mut cfg = config(None, None);
        cfg.port_pairs[0].static_mappings.push(StaticMappingConfig {
            protocol: NaptProtocol::Udp,
            public_port: 5353,
            private: SocketAddrV4::new(HOST, 53),
        });
        let engine = engine(&cfg);

        let table = engine.pair(0).unwrap().table();
        assert_eq!(
            table.lookup_public(NaptProtocol::Udp, &AddressPair::new(PUBLIC_IP, 5353)),
            Some(AddressPair::new(HOST, 53))
        );
        assert!(table.port_state(NaptProtocol::Udp, 5353).unwrap().is_static);
        assert_eq!(engine.active_connections(), 1);
    }

    #[test]
    fn test_unknown_pair_and_garbage_are_dropped() {
        let engine = engine(&config(None, None));
        let mut frame = vec![0u8; 10];
        assert_eq!(
            engine.process(0, Side::Private, &mut frame),
            Disposition::Drop(DropReason::Malformed)
        );
        assert_eq!(
            engine.process(7, Side::Private, &mut frame),
            Disposition::Drop(DropReason::Unsupported)
        );
        assert_eq!(engine.metrics().packets_dropped.get(), 2);
    }

    #[test]
    fn test_non_ip_ethertype_is_unsupported() {
        let engine = engine(&config(None, None));
        let mut frame = FrameBuilder::new()
            .dst_mac(PRIVATE_MAC)
            .src_mac(HOST_MAC)
            .ethertype(EtherType::Ipv6 as u16)
            .payload(&[0u8; 40])
            .build();
        assert_eq!(
            engine.process(0, Side::Private, &mut frame),
            Disposition::Drop(DropReason::Unsupported)
        );
    }

    #[test]
    fn test_unsupported_ip_protocol_is_dropped() {
        let engine = engine(&config(None, None));
        let mut frame = FrameBuilder::new()
            .dst_mac(PRIVATE_MAC)
            .src_mac(HOST_MAC)
            .ethertype(EtherType::Ipv4 as u16)
            .payload(
                &Ipv4Builder::new()
                    .protocol(47)
                    .src_addr(HOST)
                    .dst_addr(REMOTE)
                    .payload(&[0u8; 8])
                    .build(),
            )
            .build();
        assert_eq!(
            engine.process(0, Side::Private, &mut frame),
            Disposition::Drop(DropReason::Unsupported)
        );
        assert!(engine.pair(0).unwrap().table().is_empty());
    }

    #[test]
    fn test_arp_request_is_answered_on_same_side() {
        let engine = engine(&config(None, None));
        let mut frame = ArpPacket::request(REMOTE_MAC, REMOTE, PUBLIC_IP).to_frame(
            MacAddr::BROADCAST,
            REMOTE_MAC,
            None,
        );

        let Disposition::Reply { side, frame: reply } =
            engine.process(0, Side::Public, &mut frame)
        else {
            panic!("expected an ARP reply");
        };
        assert_eq!(side, Side::Public);
        let parsed = packet::parse_frame(&reply).unwrap();
        assert_eq!(
            parsed.l3,
            L3::Arp(ArpPacket::reply(PUBLIC_MAC, PUBLIC_IP, REMOTE_MAC, REMOTE))
        );
        assert_eq!(engine.metrics().arp_replies_sent.get(), 1);
    }

    #[test]
    fn test_arp_reply_is_learned_and_consumed() {
        let engine = engine(&config(None, None));
        let mut frame = ArpPacket::reply(REMOTE_MAC, REMOTE, PUBLIC_MAC, PUBLIC_IP).to_frame(
            PUBLIC_MAC,
            REMOTE_MAC,
            None,
        );
        assert_eq!(
            engine.process(0, Side::Public, &mut frame),
            Disposition::Drop(DropReason::ArpLearned)
        );
        let point = engine.pair(0).unwrap().attachment(Side::Public);
        assert_eq!(point.arp.lookup(REMOTE), Some(REMOTE_MAC));
    }

    #[test]
    fn test_egress_to_own_address_goes_to_kernel() {
        let engine = engine(&config(None, Some("kni1")));
        let udp = UdpBuilder::new(5000, 53).payload(b"q").build(HOST, PRIVATE_IP);
        let mut frame = ipv4_frame(PRIVATE_MAC, HOST_MAC, HOST, PRIVATE_IP, Protocol::Udp, &udp);

        assert_eq!(
            engine.process(0, Side::Private, &mut frame),
            Disposition::ToKernel {
                side: Side::Private
            }
        );
        assert!(engine.pair(0).unwrap().table().is_empty());
    }

    #[test]
    fn test_private_ping_to_router_is_answered_without_fallback() {
        let engine = engine(&config(None, None));
        let mut frame = ping_to(PRIVATE_IP, HOST, PRIVATE_MAC, 77);

        let Disposition::Reply { side, frame: reply } =
            engine.process(0, Side::Private, &mut frame)
        else {
            panic!("expected an echo reply");
        };
        assert_eq!(side, Side::Private);
        let parsed = packet::parse_frame(&reply).unwrap();
        assert_eq!(parsed.dst_mac, HOST_MAC);
        let L3::Ipv4(meta) = parsed.l3 else {
            panic!("expected IPv4");
        };
        assert_eq!((meta.src, meta.dst), (PRIVATE_IP, HOST));
        assert!(matches!(
            meta.l4,
            L4Header::Icmp { icmp_type, .. } if icmp_type == IcmpType::EchoReply as u8
        ));
        assert!(engine.pair(0).unwrap().table().is_empty());
        assert_eq!(engine.metrics().icmp_echo_replies.get(), 1);
    }

    #[test]
    fn test_public_ping_without_mapping_goes_to_kernel_fallback() {
        let engine = engine(&config(Some("kni0"), None));
        let mut frame = ping_to(PUBLIC_IP, REMOTE, PUBLIC_MAC, 9);
        assert_eq!(
            engine.process(0, Side::Public, &mut frame),
            Disposition::ToKernel { side: Side::Public }
        );
        assert_eq!(engine.metrics().packets_to_kernel.get(), 1);
    }

    #[test]
    fn test_public_ping_answered_even_when_identifier_is_mapped() {
        let engine = engine(&config(Some("kni0"), None));
        let now = Instant::now();
        // A private host pings out with identifier 9, which becomes public 1024
        engine
            .pair(0)
            .unwrap()
            .attachment(Side::Public)
            .arp
            .learn(REMOTE, REMOTE_MAC);
        let mut out = ping_to(REMOTE, HOST, PRIVATE_MAC, 9);
        assert_eq!(
            engine.process_at(0, Side::Private, &mut out, now),
            Disposition::Forward { side: Side::Public }
        );

        // An echo request to our public address on the mapped identifier
        let mut frame = ping_to(PUBLIC_IP, REMOTE, PUBLIC_MAC, 1024);
        assert!(matches!(
            engine.process_at(0, Side::Public, &mut frame, now),
            Disposition::Reply {
                side: Side::Public,
                ..
            }
        ));
    }

    #[test]
    fn test_ingress_without_mapping_is_dropped() {
        let engine = engine(&config(None, None));
        let udp = UdpBuilder::new(53, 1024).payload(b"a").build(REMOTE, PUBLIC_IP);
        let mut frame = ipv4_frame(PUBLIC_MAC, REMOTE_MAC, REMOTE, PUBLIC_IP, Protocol::Udp, &udp);
        assert_eq!(
            engine.process(0, Side::Public, &mut frame),
            Disposition::Drop(DropReason::NoMapping)
        );
        assert!(engine.pair(0).unwrap().table().is_empty());
    }

    #[test]
    fn test_egress_arp_miss_emits_request_on_public_side() {
        let engine = engine(&config(None, None));
        let udp = UdpBuilder::new(5000, 53).payload(b"q").build(HOST, REMOTE);
        let mut frame = ipv4_frame(PRIVATE_MAC, HOST_MAC, HOST, REMOTE, Protocol::Udp, &udp);

        let Disposition::ArpPending { side, request } =
            engine.process(0, Side::Private, &mut frame)
        else {
            panic!("expected an ARP request");
        };
        assert_eq!(side, Side::Public);
        let parsed = packet::parse_frame(&request).unwrap();
        assert_eq!(parsed.dst_mac, MacAddr::BROADCAST);
        assert_eq!(
            parsed.l3,
            L3::Arp(ArpPacket::request(PUBLIC_MAC, PUBLIC_IP, REMOTE))
        );

        // The mapping exists and the sender was learned
        let pair = engine.pair(0).unwrap();
        assert_eq!(pair.table().len(NaptProtocol::Udp), 1);
        assert_eq!(pair.attachment(Side::Private).arp.lookup(HOST), Some(HOST_MAC));
        assert_eq!(engine.metrics().arp_requests_sent.get(), 1);
        assert_eq!(engine.metrics().connections_created.get(), 1);
    }

    #[test]
    fn test_pool_exhaustion_drops() {
        let mut cfg = config(None, None);
        cfg.napt.port_range = (1024, 1024);
        let engine = engine(&cfg);
        let now = Instant::now();

        for (src_port, expected) in [
            (5000, None),
            (5001, Some(Disposition::Drop(DropReason::PortPoolExhausted))),
        ] {
            let udp = UdpBuilder::new(src_port, 53).build(HOST, REMOTE);
            let mut frame = ipv4_frame(PRIVATE_MAC, HOST_MAC, HOST, REMOTE, Protocol::Udp, &udp);
            let disposition = engine.process_at(0, Side::Private, &mut frame, now);
            if let Some(expected) = expected {
                assert_eq!(disposition, expected);
            }
        }
        assert_eq!(engine.metrics().port_pool_exhausted.get(), 1);
    }
}
