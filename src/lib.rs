//! napt - stateful IPv4 NAPT engine
//!
//! Translates traffic between a public and a private attachment point,
//! keeping per-connection state, resolving link-layer addresses and
//! answering ARP and ICMP echo addressed to the translator itself.
//! Header parsing is implemented from scratch in userspace.

pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
