//! Data plane components
//!
//! Translation state and the per-frame decision logic. Nothing here does
//! I/O; see [`crate::capture`] for the socket side.

mod arp_cache;
mod arp_processor;
mod attachment;
mod connection_table;
mod icmp_responder;
mod napt;
mod port_allocator;
mod port_pair;
mod tcp_tracker;

pub use arp_cache::ArpCache;
pub use arp_processor::{ArpAction, process_arp};
pub use attachment::{AttachmentPoint, Side};
pub use connection_table::{
    AddressPair, ConnectionTable, Direction, NaptProtocol, PortState, WriteGuard,
};
pub use icmp_responder::{echo_reply, is_echo_request};
pub use napt::{Disposition, DropReason, NaptEngine};
pub use port_allocator::PortAllocator;
pub use port_pair::{Allocation, Lookup, NaptTimeouts, PortPair};
pub use tcp_tracker::{TerminationAction, observe as observe_tcp, reuse_instant};
