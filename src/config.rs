//! Capture and replay settings

use std::time::Duration;

use kinlog_core::Modalities;
use serde::{Deserialize, Serialize};

/// Flush the sink at most once per minute by default
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

/// Roughly the 30 Hz cadence of the sensor
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 33;

/// Capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureOptions {
    /// Streams the session accepts
    pub modalities: Modalities,
    /// Minimum time between durability flushes, in seconds
    pub flush_interval_secs: u64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            modalities: Modalities::ALL,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
        }
    }
}

impl CaptureOptions {
    pub fn with_modalities(modalities: Modalities) -> Self {
        Self {
            modalities,
            ..Default::default()
        }
    }

    pub fn flush_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.flush_interval_secs.min(i64::MAX as u64) as i64)
    }
}

/// Replay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplayOptions {
    /// Period of the interval tick source used for clocked playback
    pub tick_interval_ms: u64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl ReplayOptions {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
