//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Representation (Accept) negotiation settings.
    pub representation: RepresentationConfig,

    /// Compression (Accept-Encoding) negotiation settings.
    pub compression: CompressionConfig,

    /// Media files served as stream sources.
    pub media: MediaConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to produce a response head, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// How a selector resolves several matching preference tokens.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// First entry of the fixed table matched by any token wins.
    #[default]
    Priority,
    /// Scan tokens in order; each later match replaces the earlier one.
    LastMatch,
}

/// Representation negotiation settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RepresentationConfig {
    pub policy: SelectionPolicy,

    /// Root element name for XML bodies.
    pub xml_root: String,

    /// Filename advertised in the inline Content-Disposition of streams.
    pub disposition_filename: String,
}

impl Default for RepresentationConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::Priority,
            xml_root: "response".to_string(),
            disposition_filename: "motion.mpeg4".to_string(),
        }
    }
}

/// Compression negotiation settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompressionConfig {
    pub policy: SelectionPolicy,

    /// Codec level, 0 (store) to 9 (best).
    pub level: u32,

    /// Bodies shorter than this many bytes are sent uncompressed.
    pub min_size: usize,

    /// Serve the uncompressed body when compression fails.
    pub fail_open: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::Priority,
            level: 6,
            min_size: 0,
            fail_open: true,
        }
    }
}

/// Media directory configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory that `/media/...` paths resolve against.
    pub root: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: "./media".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
