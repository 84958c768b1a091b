//! Chassis identity and inlet temperature

use tracing::debug;

use super::{Periph, PeriphHooks};
use crate::constants::fields;
use crate::context::Context;
use crate::data::PeriphKind;
use crate::error::Result;

pub(crate) struct Chassis;

impl PeriphHooks for Chassis {
    fn initialize_state(&self, p: &Periph) -> Result<()> {
        let eeprom = p.ctx().telemetry().eeprom(p.kind(), p.id())?;
        let mut extra = vec![
            (fields::MODEL_NAME, eeprom.model_name.clone()),
            (fields::SOFTWARE_VERSION, eeprom.software_version.clone()),
        ];
        if let Some(mac) = &eeprom.mac_addr {
            extra.push((fields::BASE_MAC, mac.clone()));
        }
        p.write_identity(&eeprom, extra)?;
        Ok(())
    }

    fn update_pm(&self, p: &Periph) -> Result<()> {
        match inlet_temperature(p.ctx()) {
            Some(celsius) => p.update_pm("InletTemperature", celsius as f64),
            None => Ok(()),
        }
    }
}

/// Chassis inlet temperature in Celsius
///
/// The hottest present line card, or the control unit sensor when no line
/// card is present. `None` when no usable reading exists.
pub fn inlet_temperature(ctx: &Context) -> Option<f32> {
    let telemetry = ctx.telemetry();
    let mut any_present = false;
    let mut hottest: Option<f32> = None;

    for id in 1..=ctx.spec.expected_count(PeriphKind::Linecard) {
        match telemetry.presence(PeriphKind::Linecard, id) {
            Ok(true) => any_present = true,
            Ok(false) => continue,
            Err(e) => {
                debug!(id, error = %e, "Line card presence unreadable");
                continue;
            }
        }
        if let Ok(Some(celsius)) = telemetry
            .temperature(PeriphKind::Linecard, id)
            .map(|raw| raw.celsius())
        {
            hottest = Some(hottest.map_or(celsius, |h| h.max(celsius)));
        }
    }

    if any_present {
        return hottest;
    }

    telemetry
        .temperature(PeriphKind::Cu, 1)
        .ok()
        .and_then(|raw| raw.celsius())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::data::MemoryStore;
    use crate::hw::{FixedHostStats, SimTelemetry, SimUnit};
    use crate::platform::DeviceSpec;
    use crate::pm::StorePmSink;
    use std::sync::Arc;

    fn context(sim: Arc<SimTelemetry>) -> Context {
        let store = Arc::new(MemoryStore::new());
        let spec: DeviceSpec = serde_json::from_str(r#"{ "number": { "LINECARD": 3 } }"#).unwrap();
        Context::new(
            store.clone(),
            sim,
            Arc::new(StorePmSink::new(store)),
            Arc::new(FixedHostStats::default()),
            spec,
            DaemonConfig::default(),
        )
    }

    #[test]
    fn test_hottest_linecard_wins() {
        let sim = Arc::new(SimTelemetry::new());
        sim.insert(PeriphKind::Linecard, 1, SimUnit::default().with_temperature(3650));
        sim.insert(PeriphKind::Linecard, 2, SimUnit::default().with_temperature(4100));
        sim.insert(PeriphKind::Linecard, 3, SimUnit { present: false, ..SimUnit::default() });
        sim.insert(PeriphKind::Cu, 1, SimUnit::default().with_temperature(6000));

        assert_eq!(inlet_temperature(&context(sim)), Some(41.0));
    }

    #[test]
    fn test_falls_back_to_control_unit() {
        let sim = Arc::new(SimTelemetry::new());
        sim.insert(PeriphKind::Cu, 1, SimUnit::default().with_temperature(3300));

        assert_eq!(inlet_temperature(&context(sim)), Some(33.0));
    }

    #[test]
    fn test_invalid_sensor_is_unreadable() {
        let sim = Arc::new(SimTelemetry::new());
        sim.insert(PeriphKind::Linecard, 1, SimUnit::default().with_temperature(-99));

        assert_eq!(inlet_temperature(&context(sim)), None);
    }
}
