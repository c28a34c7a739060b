//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Counters for dispositions, connections and per-interface traffic

mod logging;
mod metrics;

pub(crate) use logging::is_known_level;
pub use logging::{LogConfig, init_logging};
pub use metrics::{Counter, InterfaceStats, MetricsRegistry};
