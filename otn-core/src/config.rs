//! Daemon configuration
//!
//! Stored as JSON in /etc/otn-pmon/pmond.json. Every field has a default, so a
//! missing file or a partial file is valid. Loaded once at startup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{fan, paths, thresholds, timing};
use crate::data::{validate_interval_ms, validate_level_table, validate_threshold_pair};
use crate::engine::{ControlLevel, LevelTable};
use crate::error::{PmonError, Result};

/// Telemetry backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryBackend {
    /// In-process simulated chassis populated from the device spec
    #[default]
    Simulated,
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Reconciliation pass interval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Fan speed control loop interval
    #[serde(default = "default_fan_control_interval")]
    pub fan_control_interval_ms: u64,

    /// Boot timeout of fans and power supplies
    #[serde(default = "default_boot_timeout")]
    pub boot_timeout_secs: u64,

    /// Boot timeout of line cards
    #[serde(default = "default_linecard_boot_timeout")]
    pub linecard_boot_timeout_secs: u64,

    #[serde(default = "default_memory_usage_high")]
    pub memory_usage_high: f32,

    #[serde(default = "default_memory_usage_clear")]
    pub memory_usage_clear: f32,

    #[serde(default = "default_linecard_temp_high")]
    pub linecard_temp_high: f32,

    #[serde(default = "default_linecard_temp_clear")]
    pub linecard_temp_clear: f32,

    /// S1..S6 control level table
    #[serde(default = "default_fan_levels")]
    pub fan_levels: Vec<ControlLevel>,

    /// Directory holding dev_spec.json
    #[serde(default = "default_platform_dir")]
    pub platform_dir: PathBuf,

    /// Where the state store is persisted between runs
    #[serde(default)]
    pub store_snapshot: Option<PathBuf>,

    #[serde(default)]
    pub telemetry: TelemetryBackend,
}

fn default_poll_interval() -> u64 {
    timing::DEFAULT_POLL_INTERVAL_MS
}

fn default_fan_control_interval() -> u64 {
    timing::DEFAULT_FAN_CONTROL_INTERVAL_MS
}

fn default_boot_timeout() -> u64 {
    timing::DEFAULT_BOOT_TIMEOUT_SECS
}

fn default_linecard_boot_timeout() -> u64 {
    timing::DEFAULT_LINECARD_BOOT_TIMEOUT_SECS
}

fn default_memory_usage_high() -> f32 {
    thresholds::MEMORY_USAGE_HIGH
}

fn default_memory_usage_clear() -> f32 {
    thresholds::MEMORY_USAGE_CLEAR
}

fn default_linecard_temp_high() -> f32 {
    thresholds::LINECARD_TEMP_HIGH
}

fn default_linecard_temp_clear() -> f32 {
    thresholds::LINECARD_TEMP_CLEAR
}

fn default_fan_levels() -> Vec<ControlLevel> {
    fan::default_levels()
}

fn default_platform_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_PLATFORM_DIR)
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            fan_control_interval_ms: default_fan_control_interval(),
            boot_timeout_secs: default_boot_timeout(),
            linecard_boot_timeout_secs: default_linecard_boot_timeout(),
            memory_usage_high: default_memory_usage_high(),
            memory_usage_clear: default_memory_usage_clear(),
            linecard_temp_high: default_linecard_temp_high(),
            linecard_temp_clear: default_linecard_temp_clear(),
            fan_levels: fan::default_levels(),
            platform_dir: default_platform_dir(),
            store_snapshot: None,
            telemetry: TelemetryBackend::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| PmonError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: DaemonConfig = serde_json::from_str(&content)
            .map_err(|e| PmonError::config(format!("Failed to parse {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Reject values the control loops cannot run with
    pub fn validate(&self) -> Result<()> {
        validate_interval_ms("poll_interval_ms", self.poll_interval_ms)?;
        validate_interval_ms("fan_control_interval_ms", self.fan_control_interval_ms)?;
        if self.boot_timeout_secs == 0 {
            return Err(PmonError::invalid_config("boot_timeout_secs", "must be positive"));
        }
        if self.linecard_boot_timeout_secs == 0 {
            return Err(PmonError::invalid_config(
                "linecard_boot_timeout_secs",
                "must be positive",
            ));
        }
        validate_threshold_pair("memory_usage", self.memory_usage_high, self.memory_usage_clear)?;
        validate_threshold_pair("linecard_temp", self.linecard_temp_high, self.linecard_temp_clear)?;
        validate_level_table(&self.fan_levels)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fan_control_interval(&self) -> Duration {
        Duration::from_millis(self.fan_control_interval_ms)
    }

    pub fn level_table(&self) -> Result<LevelTable> {
        LevelTable::new(self.fan_levels.clone())
    }
}
