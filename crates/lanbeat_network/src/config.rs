//! Node configuration: discovery channel, unicast port and timings.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Default discovery port shared by all peers.
pub const DEFAULT_DISCOVERY_PORT: u16 = 5000;

/// Default discovery group.
pub const DEFAULT_GROUP: IpAddr = IpAddr::V4(Ipv4Addr::new(230, 0, 0, 1));

/// Configuration for one LanBeat node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Discovery group: multicast group, broadcast address, or a plain
    /// unicast address for single-host testing.
    pub group: IpAddr,

    /// UDP port of the discovery channel.
    pub discovery_port: u16,

    /// UDP port for direct messages. `0` picks an ephemeral port.
    pub unicast_port: u16,

    /// Interval between heartbeats.
    #[serde(with = "duration_ms")]
    pub heartbeat_interval: Duration,

    /// Silence after which a peer is reported dead.
    #[serde(with = "duration_ms")]
    pub failure_timeout: Duration,

    /// Interval between failure-detector scans.
    #[serde(with = "duration_ms")]
    pub failure_check_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            unicast_port: 0,
            heartbeat_interval: Duration::from_millis(1000),
            failure_timeout: Duration::from_millis(3000),
            failure_check_interval: Duration::from_millis(1000),
        }
    }
}

impl NodeConfig {
    /// Reject timings the loops cannot run with.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.heartbeat_interval.is_zero() {
            return Err(NetworkError::InvalidConfig(
                "heartbeat_interval must be greater than zero".to_string(),
            ));
        }
        if self.failure_check_interval.is_zero() {
            return Err(NetworkError::InvalidConfig(
                "failure_check_interval must be greater than zero".to_string(),
            ));
        }
        if self.failure_timeout < self.heartbeat_interval {
            return Err(NetworkError::InvalidConfig(format!(
                "failure_timeout ({:?}) is shorter than heartbeat_interval ({:?})",
                self.failure_timeout, self.heartbeat_interval
            )));
        }
        Ok(())
    }

    /// Save the config to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory: {e}"))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Load config from a JSON file, or return defaults if the file is missing.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<NodeConfig>(&data) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Corrupt config file, using defaults: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!("Cannot read config file, using defaults: {e}");
                }
            }
        }
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(dur.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
