//! Peripheral telemetry interface
//!
//! Every call is keyed by peripheral kind and numeric id. Queries return
//! `Err` when the hardware cannot be reached. Commands return the service's
//! result code; a non-OK code is a rejection, not an error.

use crate::data::{
    ControlMode, Eeprom, FanSpeed, FanSpeedSpec, LedColor, PeriphKind, PsuInfo, RawTemperature,
    RebootType, ResultCode, VinSpec,
};
use crate::error::Result;

/// Request/response client of the peripheral control service
pub trait Telemetry: Send + Sync {
    // Queries

    fn presence(&self, kind: PeriphKind, id: u32) -> Result<bool>;

    fn eeprom(&self, kind: PeriphKind, id: u32) -> Result<Eeprom>;

    /// Temperature in hundredths of a degree. `-99` means unreadable.
    fn temperature(&self, kind: PeriphKind, id: u32) -> Result<RawTemperature>;

    fn fan_speed(&self, id: u32) -> Result<FanSpeed>;

    fn fan_speed_spec(&self, id: u32) -> Result<FanSpeedSpec>;

    fn psu_info(&self, id: u32) -> Result<PsuInfo>;

    fn psu_vin_spec(&self, id: u32) -> Result<VinSpec>;

    // Commands

    fn set_fan_control_mode(&self, id: u32, mode: ControlMode) -> Result<ResultCode>;

    /// Speed rate in percent, 0-100
    fn set_fan_speed_rate(&self, id: u32, rate: u8) -> Result<ResultCode>;

    fn set_led_color(&self, kind: PeriphKind, id: u32, color: LedColor) -> Result<ResultCode>;

    fn reboot(&self, kind: PeriphKind, id: u32, reboot: RebootType) -> Result<ResultCode>;

    fn initialize(&self, kind: PeriphKind, id: u32) -> Result<ResultCode>;
}
