//! Line card rules
//!
//! A line card's slot status past INIT is written by its own southbound agent,
//! so these hooks only watch temperature and communication health.

use super::{Periph, PeriphHooks};
use crate::alarm::{codes, Alarm};
use crate::data::SlotStatus;
use crate::error::Result;

pub(crate) struct Linecard;

impl PeriphHooks for Linecard {
    fn initialize_state(&self, p: &Periph) -> Result<()> {
        let eeprom = p.ctx().telemetry().eeprom(p.kind(), p.id())?;
        p.write_identity(&eeprom, Vec::new())?;
        Ok(())
    }

    fn update_alarm(&self, p: &Periph) -> Result<()> {
        let store = p.ctx().store();
        let config = &p.ctx().config;

        let temp_high = Alarm::new(p.name(), codes::TEMP_HIGH);
        if let Some(celsius) = p.temperature()? {
            if celsius > config.linecard_temp_high {
                temp_high.create(store)?;
            } else if celsius < config.linecard_temp_clear {
                temp_high.clear(store)?;
            }
        }

        let comm_fail = Alarm::new(p.name(), codes::COMM_FAIL);
        if p.slot_status()? == Some(SlotStatus::Comfail) {
            comm_fail.create(store)?;
        } else {
            comm_fail.clear(store)?;
        }
        Ok(())
    }

    fn update_pm(&self, p: &Periph) -> Result<()> {
        p.update_temperature_pm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::context::Context;
    use crate::data::{MemoryStore, PeriphKind, StateStore};
    use crate::hw::{FixedHostStats, SimTelemetry, SimUnit};
    use crate::platform::DeviceSpec;
    use crate::pm::StorePmSink;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStore>, Arc<SimTelemetry>, Arc<Periph>) {
        let store = Arc::new(MemoryStore::new());
        let sim = Arc::new(SimTelemetry::new());
        sim.insert(PeriphKind::Linecard, 1, SimUnit::default().with_temperature(5000));
        let ctx = Context::new(
            store.clone(),
            sim.clone(),
            Arc::new(StorePmSink::new(store.clone())),
            Arc::new(FixedHostStats::default()),
            DeviceSpec::default(),
            DaemonConfig::default(),
        );
        (store, sim, Arc::new(Periph::new(ctx, PeriphKind::Linecard, 1)))
    }

    #[test]
    fn test_slot_status_left_in_init() {
        let (_store, _sim, lc) = setup();
        lc.synchronize();
        lc.synchronize();
        assert_eq!(lc.slot_status().unwrap(), Some(SlotStatus::Init));
    }

    #[test]
    fn test_temperature_alarm_hysteresis() {
        let (store, sim, lc) = setup();
        let alarm = Alarm::new("LINECARD-1-1", codes::TEMP_HIGH);
        lc.synchronize();

        sim.set_temperature(PeriphKind::Linecard, 1, 8600);
        lc.synchronize();
        assert!(alarm.is_active(store.as_ref()).unwrap());

        sim.set_temperature(PeriphKind::Linecard, 1, 8200);
        lc.synchronize();
        assert!(alarm.is_active(store.as_ref()).unwrap());

        sim.set_temperature(PeriphKind::Linecard, 1, 7900);
        lc.synchronize();
        assert!(!alarm.is_active(store.as_ref()).unwrap());
    }

    #[test]
    fn test_comm_fail_follows_slot_status() {
        let (store, _sim, lc) = setup();
        let alarm = Alarm::new("LINECARD-1-1", codes::COMM_FAIL);
        lc.synchronize();

        // The card's agent reports a communication failure
        store.set_field("LINECARD", "LINECARD-1-1", "slot-status", "COMFAIL").unwrap();
        lc.synchronize();
        assert!(alarm.is_active(store.as_ref()).unwrap());

        store.set_field("LINECARD", "LINECARD-1-1", "slot-status", "READY").unwrap();
        lc.synchronize();
        assert!(!alarm.is_active(store.as_ref()).unwrap());
    }
}
