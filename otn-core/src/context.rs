//! Shared collaborators handed to every peripheral and to the fan controller

use std::sync::Arc;

use crate::config::DaemonConfig;
use crate::data::StateStore;
use crate::hw::{HostStats, Telemetry};
use crate::platform::DeviceSpec;
use crate::pm::PmSink;

/// Process-wide context, loaded once at startup
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn StateStore>,
    pub telemetry: Arc<dyn Telemetry>,
    pub pm: Arc<dyn PmSink>,
    pub host: Arc<dyn HostStats>,
    pub spec: Arc<DeviceSpec>,
    pub config: Arc<DaemonConfig>,
}

impl Context {
    pub fn new(
        store: Arc<dyn StateStore>,
        telemetry: Arc<dyn Telemetry>,
        pm: Arc<dyn PmSink>,
        host: Arc<dyn HostStats>,
        spec: DeviceSpec,
        config: DaemonConfig,
    ) -> Self {
        Self {
            store,
            telemetry,
            pm,
            host,
            spec: Arc::new(spec),
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn telemetry(&self) -> &dyn Telemetry {
        self.telemetry.as_ref()
    }
}
