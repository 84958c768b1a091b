//! Control unit: host memory and CPU monitoring

use super::{Periph, PeriphHooks};
use crate::alarm::{codes, Alarm};
use crate::constants::{fields, tables};
use crate::error::Result;
use crate::pm;

pub(crate) struct Cu;

impl PeriphHooks for Cu {
    fn initialize_state(&self, p: &Periph) -> Result<()> {
        let eeprom = p.ctx().telemetry().eeprom(p.kind(), p.id())?;
        let extra = vec![(fields::SOFTWARE_VERSION, eeprom.software_version.clone())];
        p.write_identity(&eeprom, extra)?;
        Ok(())
    }

    fn update_pm(&self, p: &Periph) -> Result<()> {
        p.update_temperature_pm()?;

        let host = p.ctx().host.as_ref();
        let memory = host.memory()?;
        p.update_pm("MemoryUtilized", memory.utilized_bytes as f64)?;
        p.update_pm("MemoryAvailable", memory.available_bytes as f64)?;

        let cpu = host.cpu()?;
        p.update_pm("CpuUtilization", cpu.total_percent.trunc())?;

        let sink = p.ctx().pm.as_ref();
        for (i, core) in cpu.cores.iter().enumerate() {
            let name = format!("CPU-{}", i);
            for (metric, value) in [
                ("Total", core.total),
                ("User", core.user),
                ("Kernel", core.kernel),
                ("Nice", core.nice),
                ("Idle", core.idle),
                ("Wait", core.wait),
            ] {
                pm::update_both(sink, tables::CPU, &name, metric, value.trunc())?;
            }
        }
        Ok(())
    }

    /// MEM_USAGE_HIGH with a hysteresis band between the clear and raise levels
    fn update_alarm(&self, p: &Periph) -> Result<()> {
        let config = &p.ctx().config;
        let usage = p.ctx().host.memory()?.percent;
        let alarm = Alarm::new(p.name(), codes::MEM_USAGE_HIGH);

        if usage > config.memory_usage_high {
            alarm.create(p.ctx().store())?;
        } else if usage < config.memory_usage_clear {
            alarm.clear(p.ctx().store())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::context::Context;
    use crate::data::{MemoryStore, PeriphKind, StateStore};
    use crate::hw::{CoreUsage, CpuUsage, FixedHostStats, MemoryUsage, SimTelemetry, SimUnit};
    use crate::platform::DeviceSpec;
    use crate::pm::StorePmSink;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStore>, Arc<FixedHostStats>, Arc<Periph>) {
        let store = Arc::new(MemoryStore::new());
        let sim = Arc::new(SimTelemetry::new());
        sim.insert(PeriphKind::Cu, 1, SimUnit::default());
        let host = Arc::new(FixedHostStats::new(
            MemoryUsage { utilized_bytes: 100, available_bytes: 900, percent: 10.0 },
            CpuUsage {
                total_percent: 12.7,
                cores: vec![CoreUsage { total: 20.0, user: 15.0, kernel: 5.0, idle: 80.0, ..CoreUsage::default() }; 2],
            },
        ));
        let ctx = Context::new(
            store.clone(),
            sim,
            Arc::new(StorePmSink::new(store.clone())),
            host.clone(),
            DeviceSpec::default(),
            DaemonConfig::default(),
        );
        (store, host, Arc::new(Periph::new(ctx, PeriphKind::Cu, 1)))
    }

    #[test]
    fn test_fixed_unit_starts_inactive_without_slot_status() {
        let (store, _host, cu) = setup();
        cu.synchronize();

        assert_eq!(store.get_field("CU", "CU-1", "oper-status").unwrap().as_deref(), Some("INACTIVE"));
        assert_eq!(store.get_field("CU", "CU-1", "removable").unwrap().as_deref(), Some("false"));
        assert_eq!(store.get_field("CU", "CU-1", "slot-status").unwrap(), None);
    }

    #[test]
    fn test_memory_alarm_hysteresis() {
        let (store, host, cu) = setup();
        let alarm = Alarm::new("CU-1", codes::MEM_USAGE_HIGH);
        cu.synchronize();

        host.set_memory_percent(85.0);
        cu.synchronize();
        assert!(alarm.is_active(store.as_ref()).unwrap());

        host.set_memory_percent(70.0);
        cu.synchronize();
        assert!(alarm.is_active(store.as_ref()).unwrap());

        host.set_memory_percent(55.0);
        cu.synchronize();
        assert!(!alarm.is_active(store.as_ref()).unwrap());
    }

    #[test]
    fn test_per_core_pm() {
        let (store, _host, cu) = setup();
        cu.synchronize();
        cu.synchronize();

        let row = store.get_entry("COUNTERS", "CPU:CPU-1_User:15min").unwrap().unwrap();
        assert_eq!(row["current"], "15");
        let row = store.get_entry("COUNTERS", "CU:CU-1_CpuUtilization:24h").unwrap().unwrap();
        assert_eq!(row["current"], "12");
    }
}
