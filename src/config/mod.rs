//! Configuration management
//!
//! Handles napt.toml: loading, defaults and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::{MAX_TIMEOUT_SECS, ValidationResult, validate};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Render the effective configuration, defaults included
pub fn render(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("napt-load-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[napt]\nconnection_timeout_secs = 5").unwrap();
        drop(file);

        let config = load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.napt.connection_timeout_secs, 5);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load("/nonexistent/napt.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = parse("[napt\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_render_fills_defaults() {
        let config = parse("").unwrap();
        let text = render(&config).unwrap();
        assert!(text.contains("connection_timeout_secs = 60"));
        assert!(text.contains("checksum = \"software\""));
    }
}
