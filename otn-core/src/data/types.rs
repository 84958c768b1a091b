//! Core data types for the peripheral monitor
//!
//! Peripheral identity, lifecycle status, and the records returned by the
//! telemetry service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::temperature;
use crate::error::PmonError;

// ============================================================================
// Peripheral identity
// ============================================================================

/// Kind of field-replaceable unit in the chassis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriphKind {
    Chassis,
    Linecard,
    Psu,
    Fan,
    Cu,
}

impl PeriphKind {
    /// Type name, also used as the state store table name
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriphKind::Chassis => "CHASSIS",
            PeriphKind::Linecard => "LINECARD",
            PeriphKind::Psu => "PSU",
            PeriphKind::Fan => "FAN",
            PeriphKind::Cu => "CU",
        }
    }

    /// Only hot-pluggable units carry slot-status and a boot timer
    pub fn removable(&self) -> bool {
        matches!(self, PeriphKind::Linecard | PeriphKind::Fan | PeriphKind::Psu)
    }

    /// Entity name for unit `id` of this kind
    ///
    /// Slot-mounted units are numbered relative to chassis 1 (`FAN-1-3`),
    /// everything else is `<TYPE>-<id>`.
    pub fn entity_name(&self, id: u32) -> String {
        match self {
            PeriphKind::Fan | PeriphKind::Psu | PeriphKind::Linecard => {
                format!("{}-1-{}", self.as_str(), id)
            }
            PeriphKind::Chassis | PeriphKind::Cu => format!("{}-{}", self.as_str(), id),
        }
    }

    pub const ALL: [PeriphKind; 5] = [
        PeriphKind::Chassis,
        PeriphKind::Cu,
        PeriphKind::Linecard,
        PeriphKind::Psu,
        PeriphKind::Fan,
    ];
}

impl fmt::Display for PeriphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Lifecycle status
// ============================================================================

/// Persisted presence/health lifecycle of a peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotStatus {
    Empty,
    Init,
    Ready,
    Mismatch,
    Comfail,
    Bootfail,
    Unknown,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Empty => "EMPTY",
            SlotStatus::Init => "INIT",
            SlotStatus::Ready => "READY",
            SlotStatus::Mismatch => "MISMATCH",
            SlotStatus::Comfail => "COMFAIL",
            SlotStatus::Bootfail => "BOOTFAIL",
            SlotStatus::Unknown => "UNKNOWN",
        }
    }

    /// Externally visible oper-status derived from this slot status
    pub fn oper_status(&self) -> OperStatus {
        match self {
            SlotStatus::Ready => OperStatus::Active,
            SlotStatus::Init | SlotStatus::Comfail => OperStatus::Inactive,
            SlotStatus::Empty
            | SlotStatus::Mismatch
            | SlotStatus::Bootfail
            | SlotStatus::Unknown => OperStatus::Disabled,
        }
    }
}

impl FromStr for SlotStatus {
    type Err = PmonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMPTY" => Ok(SlotStatus::Empty),
            "INIT" => Ok(SlotStatus::Init),
            "READY" => Ok(SlotStatus::Ready),
            "MISMATCH" => Ok(SlotStatus::Mismatch),
            "COMFAIL" => Ok(SlotStatus::Comfail),
            "BOOTFAIL" => Ok(SlotStatus::Bootfail),
            "UNKNOWN" => Ok(SlotStatus::Unknown),
            other => Err(PmonError::InvalidSlotStatus(other.to_string())),
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse operational status shown to management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperStatus {
    Active,
    Inactive,
    Disabled,
}

impl OperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperStatus::Active => "ACTIVE",
            OperStatus::Inactive => "INACTIVE",
            OperStatus::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for OperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Telemetry records
// ============================================================================

/// Result code returned by every control command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    Ok,
    Error(i32),
}

impl ResultCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResultCode::Ok)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Ok => f.write_str("OK"),
            ResultCode::Error(code) => write!(f, "error code {}", code),
        }
    }
}

/// Inventory record read from a peripheral EEPROM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Eeprom {
    pub part_number: String,
    pub serial_number: String,
    pub mfg_date: String,
    pub hardware_version: String,
    pub software_version: String,
    pub model_name: String,
    pub mac_addr: Option<String>,
}

/// Raw temperature reading in hundredths of a degree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTemperature(pub i32);

impl RawTemperature {
    pub const INVALID: RawTemperature = RawTemperature(temperature::INVALID_RAW);

    pub fn is_valid(&self) -> bool {
        self.0 != temperature::INVALID_RAW
    }

    /// Degrees Celsius, or `None` for the unreadable sentinel
    pub fn celsius(&self) -> Option<f32> {
        if self.is_valid() {
            Some(self.0 as f32 / temperature::HUNDREDTHS_DIVISOR)
        } else {
            None
        }
    }
}

/// The two redundant rotor speed sensors of a fan module (RPM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanSpeed {
    pub front: u32,
    pub behind: u32,
    pub code: ResultCode,
}

impl FanSpeed {
    pub fn higher(&self) -> u32 {
        self.front.max(self.behind)
    }

    pub fn lower(&self) -> u32 {
        self.front.min(self.behind)
    }
}

/// Rated speed range of a fan module (RPM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanSpeedSpec {
    pub min: u32,
    pub max: u32,
}

/// Power supply telemetry snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PsuInfo {
    pub iin: f64,
    pub vin: f64,
    pub pin: f64,
    pub iout: f64,
    pub vout: f64,
    pub pout: f64,
    pub ambient_temp: f64,
    pub primary_temp: f64,
    pub secondary_temp: f64,
    pub fan: u32,
    /// Rated output capacity (W)
    pub capacity: u32,
}

/// Accepted input voltage range of a power supply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VinSpec {
    pub min: f64,
    pub max: f64,
}

/// Fan controller ownership: software loop or fixed rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlMode {
    #[default]
    Auto,
    Manual,
}

/// Front-panel LED colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedColor {
    Off,
    Green,
    Yellow,
    Red,
}

impl LedColor {
    /// LED indication for a slot status
    pub fn for_status(status: SlotStatus) -> Self {
        match status {
            SlotStatus::Ready => LedColor::Green,
            SlotStatus::Init => LedColor::Yellow,
            SlotStatus::Empty => LedColor::Off,
            _ => LedColor::Red,
        }
    }
}

/// Reboot flavors accepted by the telemetry service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebootType {
    Cold,
    Warm,
    Power,
}
