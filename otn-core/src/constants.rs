//! Constants and configuration defaults for the peripheral monitor
//!
//! Centralizes table names, field names, sentinels, and timing defaults.
//! Add values here instead of scattering literals through the state machine.

use std::time::Duration;

/// Filesystem paths
pub mod paths {
    use std::path::PathBuf;

    /// Configuration directory
    pub const CONFIG_DIR: &str = "/etc/otn-pmon";

    /// Daemon configuration file name
    pub const CONFIG_FILE: &str = "pmond.json";

    /// Platform directory holding the device spec
    pub const DEFAULT_PLATFORM_DIR: &str = "/usr/share/sonic/platform";

    /// Device spec file name inside the platform directory
    pub const DEV_SPEC_FILE: &str = "dev_spec.json";

    /// Full path of the default configuration file
    pub fn default_config_file() -> PathBuf {
        PathBuf::from(CONFIG_DIR).join(CONFIG_FILE)
    }
}

/// State store table names that are not peripheral type names
pub mod tables {
    /// Currently active alarms, one row per `<name>|<code>`
    pub const CURRENT_ALARM: &str = "CURALARM";

    /// Cleared alarms
    pub const HISTORY_ALARM: &str = "HISALARM";

    /// PM rollup windows
    pub const COUNTERS: &str = "COUNTERS";

    /// Per-core CPU samples of the control unit
    pub const CPU: &str = "CPU";
}

/// Field names used in peripheral rows
pub mod fields {
    pub const SLOT_STATUS: &str = "slot-status";
    pub const SLOT_ID: &str = "slot-id";
    pub const OPER_STATUS: &str = "oper-status";
    pub const EMPTY: &str = "empty";
    pub const REMOVABLE: &str = "removable";
    pub const PARENT: &str = "parent";
    pub const PART_NO: &str = "part-no";
    pub const SERIAL_NO: &str = "serial-no";
    pub const MFG_DATE: &str = "mfg-date";
    pub const MFG_NAME: &str = "mfg-name";
    pub const HARDWARE_VERSION: &str = "hardware-version";
    pub const SOFTWARE_VERSION: &str = "software-version";
    pub const MODEL_NAME: &str = "model-name";
    pub const BASE_MAC: &str = "base-mac-address";
    pub const CAPACITY: &str = "capacity";
    pub const SPEED_RATE: &str = "speed-rate";
}

/// Identity values written into every peripheral row
pub mod identity {
    /// Every field-replaceable unit hangs off the single chassis
    pub const PARENT: &str = "CHASSIS-1";

    /// Manufacturer recorded in inventory rows
    pub const MFG_NAME: &str = "alibaba";
}

/// Temperature encoding used by the telemetry service
pub mod temperature {
    /// Sentinel for an unreadable sensor. Never scaled.
    pub const INVALID_RAW: i32 = -99;

    /// Raw readings are hundredths of a degree Celsius
    pub const HUNDREDTHS_DIVISOR: f32 = 100.0;
}

/// Timing defaults
pub mod timing {
    use super::*;

    /// Reconciliation pass interval
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

    /// Fan speed control loop interval
    pub const DEFAULT_FAN_CONTROL_INTERVAL_MS: u64 = 5000;

    /// Boot timeout for fans and power supplies
    pub const DEFAULT_BOOT_TIMEOUT_SECS: u64 = 10;

    /// Boot timeout for line cards
    pub const DEFAULT_LINECARD_BOOT_TIMEOUT_SECS: u64 = 300;

    /// Lower bound for any loop interval
    pub const MIN_INTERVAL_MS: u64 = 50;

    /// 15-minute PM window
    pub const PM_WINDOW_15MIN: Duration = Duration::from_secs(15 * 60);

    /// 24-hour PM window
    pub const PM_WINDOW_24H: Duration = Duration::from_secs(24 * 60 * 60);
}

/// Alarm thresholds
pub mod thresholds {
    /// Control unit memory usage raising MEM_USAGE_HIGH (percent)
    pub const MEMORY_USAGE_HIGH: f32 = 80.0;

    /// Control unit memory usage clearing MEM_USAGE_HIGH (percent)
    pub const MEMORY_USAGE_CLEAR: f32 = 60.0;

    /// Line card temperature raising TEMP_HIGH (Celsius)
    pub const LINECARD_TEMP_HIGH: f32 = 85.0;

    /// Line card temperature clearing TEMP_HIGH (Celsius)
    pub const LINECARD_TEMP_CLEAR: f32 = 80.0;
}

/// Fan speed control parameters
pub mod fan {
    use crate::engine::ControlLevel;

    /// Maximum commandable speed rate (percent)
    pub const MAX_RATE: u8 = 100;

    /// Number of discrete control levels
    pub const LEVEL_COUNT: usize = 6;

    /// Threshold value meaning "no shift in this direction"
    pub const THRESHOLD_DISABLED: f32 = 0.0;

    /// Default S1..S6 table: (rate, upshift temp, downshift temp)
    pub fn default_levels() -> Vec<ControlLevel> {
        vec![
            ControlLevel { rate: 30, upshift: 35.0, downshift: THRESHOLD_DISABLED },
            ControlLevel { rate: 35, upshift: 38.0, downshift: 33.0 },
            ControlLevel { rate: 40, upshift: 41.0, downshift: 36.0 },
            ControlLevel { rate: 50, upshift: 44.0, downshift: 39.0 },
            ControlLevel { rate: 70, upshift: 47.0, downshift: 42.0 },
            ControlLevel { rate: MAX_RATE, upshift: THRESHOLD_DISABLED, downshift: 45.0 },
        ]
    }
}
