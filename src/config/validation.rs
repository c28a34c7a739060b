//! Configuration validation

use super::{AttachmentConfig, Config, PortPairConfig};
use crate::telemetry::is_known_level;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Record a warning
    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Record an error
    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Check if validation found errors
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Print warnings and errors to stdout
    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_logging(config, &mut result);
    validate_napt(config, &mut result);
    validate_interfaces(config, &mut result);
    for (i, pair) in config.port_pairs.iter().enumerate() {
        validate_static_mappings(config, i, pair, &mut result);
    }

    result
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    if !is_known_level(&config.logging.level) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            config.logging.level
        ));
    }
    if !matches!(config.logging.format.as_str(), "pretty" | "compact" | "json") {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            config.logging.format
        ));
    }
}

/// Upper bound for either timeout (one week)
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

fn validate_napt(config: &Config, result: &mut ValidationResult) {
    let napt = &config.napt;
    for (name, secs) in [
        ("connection_timeout_secs", napt.connection_timeout_secs),
        ("port_reuse_timeout_secs", napt.port_reuse_timeout_secs),
    ] {
        if secs == 0 {
            result.error(format!("napt.{}: must be greater than 0", name));
        } else if secs > MAX_TIMEOUT_SECS {
            result.error(format!(
                "napt.{}: {} exceeds the maximum of {} seconds",
                name, secs, MAX_TIMEOUT_SECS
            ));
        }
    }

    let (start, end) = napt.port_range;
    if start == 0 {
        result.error("napt.port_range: port 0 cannot be allocated");
    }
    if start > end {
        result.error(format!(
            "napt.port_range: invalid range - start ({}) > end ({})",
            start, end
        ));
    }
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    if config.port_pairs.is_empty() {
        result.warn("port_pair: none defined, nothing will be translated");
    }

    let mut seen = HashSet::new();
    for (i, pair) in config.port_pairs.iter().enumerate() {
        for (side, point) in [("public", &pair.public), ("private", &pair.private)] {
            let path = format!("port_pair[{}].{}", i, side);
            if !seen.insert(point.interface.as_str()) {
                result.error(format!(
                    "{}: interface '{}' is used more than once",
                    path, point.interface
                ));
            }
            validate_attachment(&path, point, result);
        }

        if pair.public.address == pair.private.address {
            result.error(format!(
                "port_pair[{}]: public and private share address {}",
                i, pair.public.address
            ));
        }
    }

    // A fallback interface must not double as a translated one
    for (i, pair) in config.port_pairs.iter().enumerate() {
        for point in [&pair.public, &pair.private] {
            if let Some(fallback) = &point.kernel_fallback {
                if seen.contains(fallback.as_str()) {
                    result.error(format!(
                        "port_pair[{}]: kernel_fallback '{}' is also an attachment interface",
                        i, fallback
                    ));
                }
            }
        }
    }
}

fn validate_attachment(path: &str, point: &AttachmentConfig, result: &mut ValidationResult) {
    if point.interface.is_empty() {
        result.error(format!("{}: interface name is empty", path));
    }
    if point.vlan > 4095 {
        result.error(format!("{}: vlan {} out of range 0-4095", path, point.vlan));
    }
    if point.mac.is_zero() || point.mac.is_multicast() {
        result.error(format!("{}: mac {} is not a unicast address", path, point.mac));
    }
    if point.address.is_unspecified() || point.address.is_broadcast() {
        result.error(format!("{}: address {} is not usable", path, point.address));
    }
}

fn validate_static_mappings(
    config: &Config,
    index: usize,
    pair: &PortPairConfig,
    result: &mut ValidationResult,
) {
    let dynamic = config.napt.port_range();
    let mut public_ports = HashSet::new();
    let mut private_keys = HashSet::new();

    for (i, mapping) in pair.static_mappings.iter().enumerate() {
        let path = format!("port_pair[{}].static_mapping[{}]", index, i);

        if mapping.public_port == 0 {
            result.error(format!("{}: public_port must not be 0", path));
        }
        if !public_ports.insert((mapping.protocol, mapping.public_port)) {
            result.error(format!(
                "{}: duplicate {} public port {}",
                path, mapping.protocol, mapping.public_port
            ));
        }
        if !private_keys.insert((mapping.protocol, mapping.private)) {
            result.error(format!(
                "{}: {} {} is already mapped",
                path, mapping.protocol, mapping.private
            ));
        }
        if dynamic.contains(&mapping.public_port) {
            result.warn(format!(
                "{}: public port {} lies inside the dynamic range and is reserved",
                path, mapping.public_port
            ));
        }
        if mapping.private.ip().is_unspecified() && pair.public.kernel_fallback.is_none() {
            result.error(format!(
                "{}: kernel binding {} requires public.kernel_fallback",
                path, mapping.private
            ));
        }
    }
}
