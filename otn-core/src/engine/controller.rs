//! Fan speed controller
//!
//! Runs on its own interval, independent of reconciliation. Each iteration
//! either forces every present fan to full speed or steps each AUTO fan one
//! level up or down according to the chassis inlet temperature.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::levels::{LevelTable, SpeedSetting};
use crate::alarm::codes;
use crate::constants::tables;
use crate::data::{ControlMode, PeriphKind};
use crate::error::Result;
use crate::periph::{inlet_temperature, Periph, PeriphRegistry};

/// Why the controller forced full speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullSpeedReason {
    InletUnreadable,
    FansMissing { present: u32, expected: u32 },
    LinecardAlarm,
}

/// Outcome of one controller iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlReport {
    pub full_speed: Option<FullSpeedReason>,
    pub inlet: Option<f32>,
    /// Fans that accepted a new rate this iteration
    pub changed: Vec<u32>,
}

pub struct FanSpeedController {
    registry: Arc<PeriphRegistry>,
    levels: LevelTable,
}

impl FanSpeedController {
    pub fn new(registry: Arc<PeriphRegistry>, levels: LevelTable) -> Self {
        Self { registry, levels }
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    /// Fans currently reporting presence. A failed presence query counts as
    /// absent.
    pub fn present_fans(&self) -> Vec<Arc<Periph>> {
        let telemetry = self.registry.context().telemetry();
        self.registry
            .fans()
            .into_iter()
            .filter(|fan| match telemetry.presence(PeriphKind::Fan, fan.id()) {
                Ok(present) => present,
                Err(e) => {
                    warn!(name = %fan.name(), error = %e, "Fan presence unreadable, treating as absent");
                    false
                }
            })
            .collect()
    }

    /// Whether every fan must run at full speed this iteration
    pub fn need_full_speed(&self, present: u32, inlet: Option<f32>) -> Result<Option<FullSpeedReason>> {
        if inlet.is_none() {
            return Ok(Some(FullSpeedReason::InletUnreadable));
        }

        let expected = self.registry.context().spec.expected_count(PeriphKind::Fan);
        if present < expected {
            return Ok(Some(FullSpeedReason::FansMissing { present, expected }));
        }

        let store = self.registry.context().store();
        let hot_or_lost = store
            .scan_keys(tables::CURRENT_ALARM, PeriphKind::Linecard.as_str())?
            .iter()
            .any(|key| {
                key.ends_with(&format!("|{}", codes::TEMP_HIGH))
                    || key.ends_with(&format!("|{}", codes::COMM_FAIL))
            });
        if hot_or_lost {
            return Ok(Some(FullSpeedReason::LinecardAlarm));
        }

        Ok(None)
    }

    /// One controller iteration
    pub fn run_once(&self) -> Result<ControlReport> {
        let fans = self.present_fans();
        let inlet = inlet_temperature(self.registry.context());
        let mut report = ControlReport {
            inlet,
            ..ControlReport::default()
        };

        if let Some(reason) = self.need_full_speed(fans.len() as u32, inlet)? {
            info!(reason = ?reason, "Forcing all fans to full speed");
            report.full_speed = Some(reason);
            report.changed = self.force_full_speed(&fans);
            return Ok(report);
        }

        // need_full_speed guarantees a reading here
        let Some(inlet) = inlet else {
            return Ok(report);
        };

        for periph in &fans {
            match self.step_fan(periph, inlet) {
                Ok(true) => report.changed.push(periph.id()),
                Ok(false) => {}
                Err(e) => warn!(name = %periph.name(), error = %e, "Fan control step failed"),
            }
        }
        Ok(report)
    }

    /// Move one AUTO fan a level if the inlet temperature crossed a threshold
    fn step_fan(&self, periph: &Periph, inlet: f32) -> Result<bool> {
        let Some(fan) = periph.fan() else {
            return Ok(false);
        };
        if fan.control_mode() != ControlMode::Auto {
            return Ok(false);
        }

        // An unknown rate is treated as the top level
        let current = fan.speed_rate()?.unwrap_or_else(|| self.levels.max_rate());
        match self.levels.next_rate(current, inlet) {
            Some(rate) => {
                debug!(name = %periph.name(), from = current, to = rate, inlet, "Shifting fan level");
                fan.apply_rate(rate)
            }
            None => Ok(false),
        }
    }

    /// Command the top rate on every fan without touching control modes
    fn force_full_speed(&self, fans: &[Arc<Periph>]) -> Vec<u32> {
        // Rate only: fans keep their AUTO/MANUAL ownership so level control
        // and operator pins resume unchanged once the condition clears
        let rate = self.levels.max_rate();
        let mut changed = Vec::new();
        for periph in fans {
            let Some(fan) = periph.fan() else { continue };
            match fan.apply_rate(rate) {
                Ok(true) => changed.push(periph.id()),
                Ok(false) => {}
                Err(e) => warn!(name = %periph.name(), error = %e, "Failed to force full speed"),
            }
        }
        changed
    }

    /// Apply a speed setting to the given fans, or to every present fan when
    /// `ids` is `None`. Bypasses the level rules. Returns the fans that
    /// accepted it.
    pub fn run_manual(&self, setting: SpeedSetting, ids: Option<&[u32]>) -> Vec<u32> {
        let targets: Vec<Arc<Periph>> = match ids {
            Some(ids) => ids
                .iter()
                .map(|&id| self.registry.get(PeriphKind::Fan, id))
                .collect(),
            None => self.present_fans(),
        };

        let mut applied = Vec::new();
        for periph in &targets {
            let Some(fan) = periph.fan() else { continue };
            match fan.apply_setting(setting) {
                Ok(true) => applied.push(periph.id()),
                Ok(false) => {}
                Err(e) => warn!(name = %periph.name(), error = %e, "Failed to apply speed setting"),
            }
        }
        info!(setting = %setting, fans = applied.len(), "Manual speed setting applied");
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::Alarm;
    use crate::config::DaemonConfig;
    use crate::context::Context;
    use crate::data::{MemoryStore, StateStore};
    use crate::hw::{FixedHostStats, SimTelemetry};
    use crate::platform::DeviceSpec;
    use crate::pm::StorePmSink;

    struct Rig {
        store: Arc<MemoryStore>,
        sim: Arc<SimTelemetry>,
        registry: Arc<PeriphRegistry>,
        controller: FanSpeedController,
    }

    fn rig(inlet_hundredths: i32) -> Rig {
        let store = Arc::new(MemoryStore::new());
        let spec: DeviceSpec =
            serde_json::from_str(r#"{ "number": { "LINECARD": 1, "PSU": 2, "FAN": 6 } }"#).unwrap();
        let sim = Arc::new(SimTelemetry::from_device_spec(&spec));
        sim.set_temperature(PeriphKind::Linecard, 1, inlet_hundredths);
        let registry = Arc::new(PeriphRegistry::new(Context::new(
            store.clone(),
            sim.clone(),
            Arc::new(StorePmSink::new(store.clone())),
            Arc::new(FixedHostStats::default()),
            spec,
            DaemonConfig::default(),
        )));
        registry.synchronize_all();
        let controller = FanSpeedController::new(registry.clone(), LevelTable::default());
        controller.run_manual(SpeedSetting::Fixed(35), None);
        controller.run_manual(SpeedSetting::Auto, None);
        sim.clear_commands();
        Rig { store, sim, registry, controller }
    }

    fn rates(rig: &Rig) -> Vec<Option<u8>> {
        rig.registry
            .fans()
            .iter()
            .map(|p| p.fan().and_then(|f| f.speed_rate().ok().flatten()))
            .collect()
    }

    #[test]
    fn test_inside_band_holds_level() {
        let rig = rig(3600);
        let report = rig.controller.run_once().unwrap();

        assert_eq!(report.full_speed, None);
        assert!(report.changed.is_empty());
        assert_eq!(rates(&rig), vec![Some(35); 6]);
        assert!(rig.sim.commands().is_empty());
    }

    #[test]
    fn test_upshift_one_level() {
        let rig = rig(3900);
        let report = rig.controller.run_once().unwrap();

        assert_eq!(report.changed.len(), 6);
        assert_eq!(rates(&rig), vec![Some(40); 6]);
        assert_eq!(rig.sim.fan_rate(1), Some(40));
    }

    #[test]
    fn test_missing_fan_forces_full_speed() {
        let rig = rig(3600);
        rig.sim.set_present(PeriphKind::Fan, 4, false);
        rig.registry.get(PeriphKind::Fan, 2).fan().unwrap().apply_setting(SpeedSetting::Fixed(50)).unwrap();

        let report = rig.controller.run_once().unwrap();

        assert_eq!(report.full_speed, Some(FullSpeedReason::FansMissing { present: 5, expected: 6 }));
        for id in [1, 2, 3, 5, 6] {
            assert_eq!(rig.sim.fan_rate(id), Some(100), "fan {}", id);
        }
        // Override does not take fans out of their mode
        let fan2 = rig.registry.get(PeriphKind::Fan, 2);
        assert_eq!(fan2.fan().unwrap().control_mode(), ControlMode::Manual);
    }

    #[test]
    fn test_linecard_alarm_forces_full_speed() {
        let rig = rig(3600);
        Alarm::new("LINECARD-1-1", codes::COMM_FAIL).create(rig.store.as_ref()).unwrap();

        let report = rig.controller.run_once().unwrap();
        assert_eq!(report.full_speed, Some(FullSpeedReason::LinecardAlarm));
        assert_eq!(rates(&rig), vec![Some(100); 6]);
    }

    #[test]
    fn test_unreadable_inlet_forces_full_speed() {
        let rig = rig(-99);
        let report = rig.controller.run_once().unwrap();
        assert_eq!(report.full_speed, Some(FullSpeedReason::InletUnreadable));
    }

    #[test]
    fn test_manual_fans_are_left_alone() {
        let rig = rig(3900);
        rig.controller.run_manual(SpeedSetting::Fixed(70), Some(&[3]));

        let report = rig.controller.run_once().unwrap();
        assert!(!report.changed.contains(&3));
        assert_eq!(rig.sim.fan_rate(3), Some(70));
        assert_eq!(rig.sim.fan_rate(1), Some(40));
    }

    #[test]
    fn test_unknown_rate_starts_from_top_level() {
        let rig = rig(3600);
        rig.store.delete_entry("FAN", "FAN-1-1").unwrap();

        rig.controller.run_once().unwrap();
        // S6 downshift threshold is 45, so 36 steps down to S5
        assert_eq!(rig.sim.fan_rate(1), Some(70));
    }
}
