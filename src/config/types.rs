//! Configuration types

use crate::dataplane::NaptProtocol;
use crate::protocol::{ChecksumMode, MacAddr};
use crate::telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::ops::RangeInclusive;
use std::time::Duration;

/// User-defined configuration (napt.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub napt: NaptConfig,
    #[serde(default, rename = "port_pair")]
    pub port_pairs: Vec<PortPairConfig>,
}

/// Engine-wide translation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NaptConfig {
    /// Idle time after which a dynamic mapping may be reclaimed
    pub connection_timeout_secs: u64,
    /// Hold-off after a graceful TCP close before the port is reused
    pub port_reuse_timeout_secs: u64,
    /// Dynamic public port range, inclusive
    pub port_range: (u16, u16),
    pub checksum: ChecksumMode,
}

impl Default for NaptConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 60,
            port_reuse_timeout_secs: 1,
            port_range: (1024, 65500),
            checksum: ChecksumMode::Software,
        }
    }
}

impl NaptConfig {
    /// Idle time after which a dynamic mapping is stale
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// How long a closed TCP port is held back
    pub fn port_reuse_timeout(&self) -> Duration {
        Duration::from_secs(self.port_reuse_timeout_secs)
    }

    /// Dynamic port range as an inclusive range
    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_range.0..=self.port_range.1
    }
}

/// One public/private interface pair
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortPairConfig {
    pub public: AttachmentConfig,
    pub private: AttachmentConfig,
    #[serde(default, rename = "static_mapping")]
    pub static_mappings: Vec<StaticMappingConfig>,
}

/// One side of a pair
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttachmentConfig {
    pub interface: String,
    pub address: Ipv4Addr,
    pub mac: MacAddr,
    /// 802.1Q VLAN ID, 0 for untagged
    #[serde(default)]
    pub vlan: u16,
    /// Interface receiving traffic the engine does not translate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_fallback: Option<String>,
}

/// Permanent public port mapping
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticMappingConfig {
    pub protocol: NaptProtocol,
    pub public_port: u16,
    /// `0.0.0.0:<port>` binds the public port to the kernel fallback path
    pub private: SocketAddrV4,
}
