//! Fan modules
//!
//! Besides the usual identity, alarm and PM hooks, a fan carries a
//! process-local control mode and a persisted `speed-rate` used by the fan
//! speed controller through [`FanControl`].

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Periph, PeriphHooks};
use crate::alarm::{codes, Alarm};
use crate::constants::fields;
use crate::data::{ControlMode, FanSpeed, SlotStatus};
use crate::engine::SpeedSetting;
use crate::error::{PmonError, Result};

#[derive(Default)]
pub(crate) struct Fan {
    mode: Mutex<ControlMode>,
}

impl Fan {
    /// Speed pair of the two rotor sensors. A non-OK code counts as unreachable.
    fn read_speed(p: &Periph) -> Result<FanSpeed> {
        let speed = p.ctx().telemetry().fan_speed(p.id())?;
        if !speed.code.is_ok() {
            return Err(PmonError::telemetry(
                p.name(),
                format!("fan speed read returned {}", speed.code),
            ));
        }
        Ok(speed)
    }

    fn fail_active(p: &Periph) -> Result<bool> {
        Alarm::new(p.name(), codes::FAN_FAIL).is_active(p.ctx().store())
    }
}

impl PeriphHooks for Fan {
    fn initialize_state(&self, p: &Periph) -> Result<()> {
        let eeprom = p.ctx().telemetry().eeprom(p.kind(), p.id())?;
        p.write_identity(&eeprom, Vec::new())?;
        Ok(())
    }

    fn unknown(&self, p: &Periph) -> Result<bool> {
        let pn = p.ctx().telemetry().eeprom(p.kind(), p.id())?.part_number;
        Ok(p.ctx().spec.is_unknown_pn(p.kind(), &pn))
    }

    /// A stalled fan keeps its UNKNOWN status until the rotor recovers
    fn holds_slot_status(&self, p: &Periph) -> Result<bool> {
        Fan::fail_active(p)
    }

    /// At most one of HIGH, FAIL, LOW per tick, in that priority order
    fn update_alarm(&self, p: &Periph) -> Result<()> {
        let store = p.ctx().store();
        let speed = Fan::read_speed(p)?;
        let spec = p.ctx().telemetry().fan_speed_spec(p.id())?;
        let (higher, lower) = (speed.higher(), speed.lower());

        let raised = if higher > spec.max {
            Some(codes::FAN_HIGH)
        } else if higher == 0 || lower == 0 {
            Some(codes::FAN_FAIL)
        } else if lower < spec.min {
            Some(codes::FAN_LOW)
        } else {
            None
        };

        match raised {
            Some(code) => {
                Alarm::new(p.name(), code).create_and_clear_others(store, None)?;
                if code == codes::FAN_FAIL {
                    p.update_slot_status(SlotStatus::Unknown)?;
                }
            }
            None => {
                if Fan::fail_active(p)? {
                    info!(name = %p.name(), "Fan rotor recovered");
                    p.update_slot_status(SlotStatus::Ready)?;
                }
                if p.slot_status()? == Some(SlotStatus::Ready) {
                    Alarm::clear_by(store, p.name(), codes::FAN_FAMILY)?;
                }
            }
        }
        Ok(())
    }

    fn update_pm(&self, p: &Periph) -> Result<()> {
        p.update_temperature_pm()?;
        let speed = Fan::read_speed(p)?;
        p.update_pm("Speed", speed.front as f64)?;
        p.update_pm("Speed_2", speed.behind as f64)?;
        Ok(())
    }
}

/// Speed control handle of one fan
pub struct FanControl<'a> {
    periph: &'a Periph,
    fan: &'a Fan,
}

impl<'a> FanControl<'a> {
    pub(crate) fn new(periph: &'a Periph, fan: &'a Fan) -> Self {
        Self { periph, fan }
    }

    pub fn periph(&self) -> &Periph {
        self.periph
    }

    pub fn control_mode(&self) -> ControlMode {
        *self.fan.mode.lock()
    }

    /// Last persisted fixed rate, `None` when missing or "auto"
    pub fn speed_rate(&self) -> Result<Option<u8>> {
        let p = self.periph;
        let raw = p
            .ctx()
            .store()
            .get_field(p.table_name(), p.name(), fields::SPEED_RATE)?;
        Ok(match raw.map(|r| r.parse::<SpeedSetting>()) {
            Some(Ok(SpeedSetting::Fixed(rate))) => Some(rate),
            Some(Err(e)) => {
                debug!(name = %p.name(), error = %e, "Ignoring unparsable speed-rate");
                None
            }
            _ => None,
        })
    }

    /// Command a speed rate and persist it once accepted
    ///
    /// A rejected command leaves the persisted rate unchanged and returns
    /// `Ok(false)`.
    pub fn apply_rate(&self, rate: u8) -> Result<bool> {
        let p = self.periph;
        let result = p.ctx().telemetry().set_fan_speed_rate(p.id(), rate);
        if !p.command_accepted("set_fan_speed_rate", result) {
            return Ok(false);
        }
        p.ctx()
            .store()
            .set_field(p.table_name(), p.name(), fields::SPEED_RATE, &rate.to_string())?;
        Ok(true)
    }

    /// Hand the fan to the controller or pin it to a fixed rate
    pub fn apply_setting(&self, setting: SpeedSetting) -> Result<bool> {
        let p = self.periph;
        let telemetry = p.ctx().telemetry();
        match setting {
            SpeedSetting::Auto => {
                *self.fan.mode.lock() = ControlMode::Auto;
                let result = telemetry.set_fan_control_mode(p.id(), ControlMode::Auto);
                Ok(p.command_accepted("set_fan_control_mode", result))
            }
            SpeedSetting::Fixed(rate) => {
                *self.fan.mode.lock() = ControlMode::Manual;
                let result = telemetry.set_fan_control_mode(p.id(), ControlMode::Manual);
                if !p.command_accepted("set_fan_control_mode", result) {
                    return Ok(false);
                }
                self.apply_rate(rate)
            }
        }
    }
}
