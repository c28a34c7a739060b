//! Network protocol implementations
//!
//! Header codecs for everything the translator touches, implemented from
//! scratch over borrowed byte buffers.

pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod packet;
pub mod tcp;
pub mod types;
pub mod udp;

pub use checksum::ChecksumMode;
pub use packet::{L3, L4Header, ParsedFrame, Rewrite};
pub use types::*;
