//! Configuration for the Hearth runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::quota::ActionKind;

/// Configuration for a Hearth runtime instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HearthConfig {
    /// Live channel configuration
    pub channel: ChannelConfig,
    /// Quota gateway configuration
    pub quota: QuotaConfig,
    /// Enrollment orchestrator configuration
    pub enrollment: EnrollmentConfig,
    /// Event log configuration
    pub event_log: EventLogConfig,
}

impl HearthConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Live channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel endpoint URL
    pub url: String,
    /// Fixed reconnect interval (ms)
    pub retry_interval_ms: u64,
    /// Reconnect attempts before the client stays disconnected
    pub max_reconnect_attempts: u32,
    /// Heartbeat ping interval (seconds)
    pub heartbeat_interval_secs: u64,
    /// Connection establishment timeout (ms)
    pub connect_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/live".to_string(),
            retry_interval_ms: 3000,
            max_reconnect_attempts: 4,
            heartbeat_interval_secs: 30,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Quota gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Authoritative refresh interval (seconds)
    pub refresh_interval_secs: u64,
    /// Budget seeds per action kind, used until the first authoritative
    /// refresh replaces them
    pub default_limits: HashMap<ActionKind, u32>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        let mut default_limits = HashMap::new();
        default_limits.insert(ActionKind::Chat, 50);
        default_limits.insert(ActionKind::Hint, 20);
        default_limits.insert(ActionKind::Quiz, 10);
        default_limits.insert(ActionKind::Reflection, 10);
        default_limits.insert(ActionKind::Path, 5);

        Self {
            refresh_interval_secs: 60,
            default_limits,
        }
    }
}

/// Enrollment orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentConfig {
    /// Timeout for initiation and confirmation calls (ms)
    pub request_timeout_ms: u64,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
        }
    }
}

/// Event log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogConfig {
    /// Ring buffer capacity, oldest entries evicted first
    pub capacity: usize,
    /// Recently-seen event ids kept for duplicate suppression
    pub dedup_capacity: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            dedup_capacity: 512,
        }
    }
}
