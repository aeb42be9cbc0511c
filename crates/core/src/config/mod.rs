use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the overlay engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub animation: AnimationConfig,
    pub video: VideoConfig,
    pub retry: RetryConfig,
    pub tracking: TrackingConfig,
}

impl OverlayConfig {
    /// Parses a (possibly partial) JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Entrance animation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub duration_ms: f64,
    pub start_scale: f32,
    pub end_scale: f32,
    /// Gap between the marker plane and the standee's bottom edge once risen.
    pub hover_height: f32,
    /// Width of the printed marker in anchor units; the standee is sized from it.
    pub marker_width: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            duration_ms: 1500.0,
            start_scale: 0.01,
            end_scale: 1.0,
            hover_height: 0.05,
            marker_width: 1.0,
        }
    }
}

/// Media element behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub load_timeout_ms: u64,
    pub metadata_poll_ms: u64,
    pub start_muted: bool,
    pub loop_playback: bool,
    pub prime_decoder: bool,
}

impl VideoConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn metadata_poll(&self) -> Duration {
        Duration::from_millis(self.metadata_poll_ms.max(1))
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 10_000,
            metadata_poll_ms: 50,
            start_muted: true,
            loop_playback: true,
            prime_decoder: true,
        }
    }
}

/// Bounded retry policy for transient startup failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// How often to look for the attached camera feed after the engine starts.
    pub attach_poll_attempts: u32,
    pub attach_poll_interval_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_poll_interval_ms * u64::from(self.attach_poll_attempts))
    }

    pub fn attach_poll_interval(&self) -> Duration {
        Duration::from_millis(self.attach_poll_interval_ms.max(1))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            attach_poll_attempts: 20,
            attach_poll_interval_ms: 100,
        }
    }
}

/// Camera and tracker preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub width: u32,
    pub height: u32,
    pub handheld: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            handheld: true,
        }
    }
}
