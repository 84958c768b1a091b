//! Simulated chassis
//!
//! In-memory [`Telemetry`] backend. Every unit fact can be changed at runtime,
//! issued commands are recorded, and units can be made unreachable or made to
//! reject commands.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::data::{
    ControlMode, Eeprom, FanSpeed, FanSpeedSpec, LedColor, PeriphKind, PsuInfo, RawTemperature,
    RebootType, ResultCode, VinSpec,
};
use crate::error::{PmonError, Result};
use crate::hw::telemetry::Telemetry;
use crate::platform::DeviceSpec;

/// Facts of one simulated unit
#[derive(Debug, Clone, PartialEq)]
pub struct SimUnit {
    pub present: bool,
    pub eeprom: Eeprom,
    pub temperature: RawTemperature,
    pub fan_speed: FanSpeed,
    pub fan_speed_spec: FanSpeedSpec,
    pub psu_info: PsuInfo,
    pub vin_spec: VinSpec,
}

impl Default for SimUnit {
    fn default() -> Self {
        Self {
            present: true,
            eeprom: Eeprom::default(),
            temperature: RawTemperature(3000),
            fan_speed: FanSpeed { front: 5000, behind: 5000, code: ResultCode::Ok },
            fan_speed_spec: FanSpeedSpec { min: 1000, max: 12000 },
            psu_info: PsuInfo { vin: 220.0, ..PsuInfo::default() },
            vin_spec: VinSpec { min: 180.0, max: 264.0 },
        }
    }
}

impl SimUnit {
    pub fn with_part_number(mut self, pn: &str) -> Self {
        self.eeprom.part_number = pn.to_string();
        self
    }

    pub fn with_temperature(mut self, raw: i32) -> Self {
        self.temperature = RawTemperature(raw);
        self
    }
}

/// Command issued to the simulated service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCommand {
    FanControlMode { id: u32, mode: ControlMode },
    FanSpeedRate { id: u32, rate: u8 },
    Led { kind: PeriphKind, id: u32, color: LedColor },
    Reboot { kind: PeriphKind, id: u32, reboot: RebootType },
    Initialize { kind: PeriphKind, id: u32 },
}

#[derive(Default)]
struct SimState {
    units: HashMap<(PeriphKind, u32), SimUnit>,
    unreachable: HashMap<(PeriphKind, u32), bool>,
    commands: Vec<SimCommand>,
    reject_code: Option<i32>,
    fan_rates: HashMap<u32, u8>,
    fan_modes: HashMap<u32, ControlMode>,
}

/// Thread-safe simulated chassis
#[derive(Default)]
pub struct SimTelemetry {
    state: Mutex<SimState>,
}

impl SimTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chassis populated with every unit the device spec expects
    ///
    /// Each unit reports the first expected part number of its kind and PSUs
    /// report the declared power capacity.
    pub fn from_device_spec(spec: &DeviceSpec) -> Self {
        let sim = Self::new();
        sim.insert(PeriphKind::Chassis, 1, SimUnit::default());
        sim.insert(PeriphKind::Cu, 1, SimUnit::default());
        for kind in [PeriphKind::Linecard, PeriphKind::Psu, PeriphKind::Fan] {
            let pn = spec.expected_pns(kind).first().cloned().unwrap_or_default();
            for id in 1..=spec.expected_count(kind) {
                let mut unit = SimUnit::default().with_part_number(&pn);
                if let Some(capacity) = spec.power_capacity {
                    unit.psu_info.capacity = capacity;
                }
                sim.insert(kind, id, unit);
            }
        }
        sim
    }

    pub fn insert(&self, kind: PeriphKind, id: u32, unit: SimUnit) {
        self.state.lock().units.insert((kind, id), unit);
    }

    /// Change facts of an existing unit. Unknown units are created first.
    pub fn modify(&self, kind: PeriphKind, id: u32, f: impl FnOnce(&mut SimUnit)) {
        let mut state = self.state.lock();
        f(state.units.entry((kind, id)).or_default());
    }

    pub fn set_present(&self, kind: PeriphKind, id: u32, present: bool) {
        self.modify(kind, id, |unit| unit.present = present);
    }

    pub fn set_temperature(&self, kind: PeriphKind, id: u32, raw: i32) {
        self.modify(kind, id, |unit| unit.temperature = RawTemperature(raw));
    }

    /// Make every call for a unit fail as unreachable
    pub fn set_unreachable(&self, kind: PeriphKind, id: u32, unreachable: bool) {
        self.state.lock().unreachable.insert((kind, id), unreachable);
    }

    /// Make every command return `code` (`None` restores OK)
    pub fn reject_commands(&self, code: Option<i32>) {
        self.state.lock().reject_code = code;
    }

    /// Commands issued so far, oldest first
    pub fn commands(&self) -> Vec<SimCommand> {
        self.state.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Last accepted speed rate of a fan
    pub fn fan_rate(&self, id: u32) -> Option<u8> {
        self.state.lock().fan_rates.get(&id).copied()
    }

    /// Last accepted control mode of a fan
    pub fn fan_mode(&self, id: u32) -> Option<ControlMode> {
        self.state.lock().fan_modes.get(&id).copied()
    }

    fn query<T>(&self, kind: PeriphKind, id: u32, read: impl FnOnce(&SimUnit) -> T) -> Result<T> {
        let state = self.state.lock();
        if state.unreachable.get(&(kind, id)).copied().unwrap_or(false) {
            return Err(PmonError::TelemetryUnavailable(kind.entity_name(id)));
        }
        state
            .units
            .get(&(kind, id))
            .map(read)
            .ok_or_else(|| PmonError::telemetry(kind.entity_name(id), "no such unit"))
    }

    fn command(&self, kind: PeriphKind, id: u32, cmd: SimCommand) -> Result<ResultCode> {
        let mut state = self.state.lock();
        if state.unreachable.get(&(kind, id)).copied().unwrap_or(false) {
            return Err(PmonError::TelemetryUnavailable(kind.entity_name(id)));
        }
        state.commands.push(cmd);
        if let Some(code) = state.reject_code {
            return Ok(ResultCode::Error(code));
        }
        match cmd {
            SimCommand::FanSpeedRate { id, rate } => {
                state.fan_rates.insert(id, rate);
            }
            SimCommand::FanControlMode { id, mode } => {
                state.fan_modes.insert(id, mode);
            }
            _ => {}
        }
        Ok(ResultCode::Ok)
    }
}

impl Telemetry for SimTelemetry {
    fn presence(&self, kind: PeriphKind, id: u32) -> Result<bool> {
        let state = self.state.lock();
        if state.unreachable.get(&(kind, id)).copied().unwrap_or(false) {
            return Err(PmonError::TelemetryUnavailable(kind.entity_name(id)));
        }
        Ok(state.units.get(&(kind, id)).map(|u| u.present).unwrap_or(false))
    }

    fn eeprom(&self, kind: PeriphKind, id: u32) -> Result<Eeprom> {
        self.query(kind, id, |u| u.eeprom.clone())
    }

    fn temperature(&self, kind: PeriphKind, id: u32) -> Result<RawTemperature> {
        self.query(kind, id, |u| u.temperature)
    }

    fn fan_speed(&self, id: u32) -> Result<FanSpeed> {
        self.query(PeriphKind::Fan, id, |u| u.fan_speed)
    }

    fn fan_speed_spec(&self, id: u32) -> Result<FanSpeedSpec> {
        self.query(PeriphKind::Fan, id, |u| u.fan_speed_spec)
    }

    fn psu_info(&self, id: u32) -> Result<PsuInfo> {
        self.query(PeriphKind::Psu, id, |u| u.psu_info.clone())
    }

    fn psu_vin_spec(&self, id: u32) -> Result<VinSpec> {
        self.query(PeriphKind::Psu, id, |u| u.vin_spec)
    }

    fn set_fan_control_mode(&self, id: u32, mode: ControlMode) -> Result<ResultCode> {
        self.command(PeriphKind::Fan, id, SimCommand::FanControlMode { id, mode })
    }

    fn set_fan_speed_rate(&self, id: u32, rate: u8) -> Result<ResultCode> {
        self.command(PeriphKind::Fan, id, SimCommand::FanSpeedRate { id, rate })
    }

    fn set_led_color(&self, kind: PeriphKind, id: u32, color: LedColor) -> Result<ResultCode> {
        self.command(kind, id, SimCommand::Led { kind, id, color })
    }

    fn reboot(&self, kind: PeriphKind, id: u32, reboot: RebootType) -> Result<ResultCode> {
        self.command(kind, id, SimCommand::Reboot { kind, id, reboot })
    }

    fn initialize(&self, kind: PeriphKind, id: u32) -> Result<ResultCode> {
        self.command(kind, id, SimCommand::Initialize { kind, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_unit_reports_not_present() {
        let sim = SimTelemetry::new();
        assert!(!sim.presence(PeriphKind::Fan, 1).unwrap());
        assert!(sim.eeprom(PeriphKind::Fan, 1).is_err());
    }

    #[test]
    fn test_unreachable_injection() {
        let sim = SimTelemetry::new();
        sim.insert(PeriphKind::Psu, 1, SimUnit::default());
        sim.set_unreachable(PeriphKind::Psu, 1, true);

        let err = sim.psu_info(1).unwrap_err();
        assert!(matches!(err, PmonError::TelemetryUnavailable(ref name) if name == "PSU-1-1"));
        assert!(err.is_unreachable());
        assert!(sim.presence(PeriphKind::Psu, 1).is_err());
    }

    #[test]
    fn test_rejected_command_keeps_rate() {
        let sim = SimTelemetry::new();
        sim.insert(PeriphKind::Fan, 1, SimUnit::default());
        assert_eq!(sim.set_fan_speed_rate(1, 40).unwrap(), ResultCode::Ok);

        sim.reject_commands(Some(-5));
        assert_eq!(sim.set_fan_speed_rate(1, 100).unwrap(), ResultCode::Error(-5));
        assert_eq!(sim.fan_rate(1), Some(40));
        assert_eq!(sim.commands().len(), 2);
    }
}
