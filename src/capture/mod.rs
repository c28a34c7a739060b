//! Packet capture backends
//!
//! Raw frame I/O for attachment points and kernel fallback interfaces.
//! Only AF_PACKET is implemented. VLAN receive offload must be disabled on
//! tagged interfaces so 802.1Q headers reach the engine intact.

mod af_packet;
mod runner;

pub use af_packet::AfPacketSocket;
pub use runner::{Endpoint, PairSockets, Port, Runner};

use crate::Result;
use std::future::Future;

/// Information about a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfo {
    /// Number of bytes received
    pub len: usize,
}

/// Packet capture backend trait
///
/// Both directions take `&self` so a backend can be shared behind an `Arc`.
pub trait Capture: Send + Sync {
    /// Receive a frame into the provided buffer
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<RxInfo>> + Send;

    /// Send a frame
    fn send(&self, buf: &[u8]) -> impl Future<Output = Result<usize>> + Send;
}
