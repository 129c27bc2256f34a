//! Exporter configuration.
//!
//! # Example
//!
//! ```
//! use nfv9_export::ExportConfig;
//!
//! let config = ExportConfig::from_json(r#"{"source_id": 7, "max_packet_size": 8960}"#).unwrap();
//! assert_eq!(config.source_id, 7);
//! assert_eq!(config.refresh_every_records, 4096);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{DEFAULT_MAX_PACKET_SIZE, DEFAULT_SOURCE_ID};
use crate::template::TEMPLATE_ID_SPACE;

/// Default template staleness bound in seconds.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

/// Default number of records between template re-announcements.
pub const DEFAULT_REFRESH_EVERY_RECORDS: u64 = 4096;

/// Default backward skew of the packet time anchor (one day).
pub const DEFAULT_BOOT_TIME_SKEW_SECS: u64 = 86_400;

/// Configuration for one export session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Packet (buffer) size in bytes.
    pub max_packet_size: usize,
    /// Source id written into every packet header.
    pub source_id: u32,
    /// Re-announce a template once it is older than this.
    pub refresh_interval_secs: u64,
    /// Re-announce a template every this many records.
    pub refresh_every_records: u64,
    /// Packet time anchor is the first record's start minus this skew.
    pub boot_time_skew_secs: u64,
    /// Upper bound on distinct templates per session.
    pub max_templates: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            source_id: DEFAULT_SOURCE_ID,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            refresh_every_records: DEFAULT_REFRESH_EVERY_RECORDS,
            boot_time_skew_secs: DEFAULT_BOOT_TIME_SKEW_SECS,
            max_templates: TEMPLATE_ID_SPACE,
        }
    }
}

impl ExportConfig {
    /// Parse a configuration from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    #[test]
    fn test_config_default() {
        let config = ExportConfig::default();
        assert_eq!(config.max_packet_size, 1472);
        assert_eq!(config.source_id, 1);
        assert_eq!(config.refresh_interval_secs, 60);
        assert_eq!(config.refresh_every_records, 4096);
        assert_eq!(config.boot_time_skew_secs, 86_400);
        assert_eq!(config.max_templates, 65280);
    }

    #[test]
    fn test_from_json_empty_object() {
        assert_eq!(
            ExportConfig::from_json("{}").unwrap(),
            ExportConfig::default()
        );
    }

    #[test]
    fn test_from_json_overrides() {
        let config =
            ExportConfig::from_json(r#"{"refresh_interval_secs": 30, "max_templates": 16}"#)
                .unwrap();
        assert_eq!(config.refresh_interval_secs, 30);
        assert_eq!(config.max_templates, 16);
        assert_eq!(config.max_packet_size, 1472);
    }

    #[test]
    fn test_from_json_rejects_unknown_keys() {
        let result = ExportConfig::from_json(r#"{"mtu": 1500}"#);
        assert!(matches!(result, Err(ExportError::Json(_))));
    }
}
