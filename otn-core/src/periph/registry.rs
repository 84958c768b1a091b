//! Process-wide peripheral registry
//!
//! Hands out one [`Periph`] per `(kind, id)` for the lifetime of the process so
//! in-memory state such as `state_initialized` survives between ticks.
//! Entities are created on first lookup and never evicted.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::Periph;
use crate::context::Context;
use crate::data::PeriphKind;

pub struct PeriphRegistry {
    ctx: Context,
    entities: Mutex<HashMap<(PeriphKind, u32), Arc<Periph>>>,
}

impl PeriphRegistry {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            entities: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The entity for `(kind, id)`, created on first use
    pub fn get(&self, kind: PeriphKind, id: u32) -> Arc<Periph> {
        let mut entities = self.entities.lock();
        entities
            .entry((kind, id))
            .or_insert_with(|| {
                debug!(kind = %kind, id, "Registering peripheral");
                Arc::new(Periph::new(self.ctx.clone(), kind, id))
            })
            .clone()
    }

    /// Every peripheral the device spec declares, in reconciliation order
    pub fn all(&self) -> Vec<Arc<Periph>> {
        self.ctx
            .spec
            .all_peripherals()
            .into_iter()
            .map(|(kind, id)| self.get(kind, id))
            .collect()
    }

    /// Every fan slot the device spec declares
    pub fn fans(&self) -> Vec<Arc<Periph>> {
        (1..=self.ctx.spec.expected_count(PeriphKind::Fan))
            .map(|id| self.get(PeriphKind::Fan, id))
            .collect()
    }

    /// One reconciliation pass over every peripheral, one at a time
    pub fn synchronize_all(&self) {
        for periph in self.all() {
            periph.synchronize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::data::MemoryStore;
    use crate::hw::{FixedHostStats, SimTelemetry};
    use crate::platform::DeviceSpec;
    use crate::pm::StorePmSink;

    fn registry() -> PeriphRegistry {
        let store = Arc::new(MemoryStore::new());
        let spec: DeviceSpec =
            serde_json::from_str(r#"{ "number": { "LINECARD": 2, "PSU": 2, "FAN": 4 } }"#).unwrap();
        PeriphRegistry::new(Context::new(
            store.clone(),
            Arc::new(SimTelemetry::from_device_spec(&spec)),
            Arc::new(StorePmSink::new(store)),
            Arc::new(FixedHostStats::default()),
            spec,
            DaemonConfig::default(),
        ))
    }

    #[test]
    fn test_same_entity_for_same_key() {
        let registry = registry();
        let a = registry.get(PeriphKind::Fan, 3);
        let b = registry.get(PeriphKind::Fan, 3);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &registry.get(PeriphKind::Fan, 4)));
    }

    #[test]
    fn test_initialized_flag_survives_lookups() {
        let registry = registry();
        registry.synchronize_all();
        assert!(registry.all().iter().all(|p| p.is_initialized()));
        assert!(registry.get(PeriphKind::Psu, 2).is_initialized());
    }

    #[test]
    fn test_enumeration() {
        let registry = registry();
        assert_eq!(registry.all().len(), 1 + 1 + 2 + 2 + 4);
        let fans = registry.fans();
        assert_eq!(fans.len(), 4);
        assert_eq!(fans[3].name(), "FAN-1-4");
    }
}
