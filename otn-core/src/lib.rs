//! OTN Peripheral Monitor Core Library
//!
//! Presence, identity and health monitoring of the field-replaceable units of
//! an optical transport chassis, plus closed-loop fan speed control.
//!
//! # Features
//!
//! - **Reconciliation**: a per-peripheral state machine that mirrors presence
//!   and slot status into the state store once per tick
//! - **Alarms**: idempotent, family-exclusive alarm rows with history
//! - **PM**: 15-minute and 24-hour rollups of every telemetry reading
//! - **Fan control**: six-level hysteresis controller with a full-speed override
//!
//! # Module Structure
//!
//! - `data/` - Data types, state store, snapshots, validation
//! - `hw/` - Telemetry seam, simulated chassis, host statistics
//! - `periph/` - Peripheral state machine, kind-specific rules, registry
//! - `engine/` - Control levels and the fan speed controller
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use otn_core::{
//!     Context, DaemonConfig, DeviceSpec, FanSpeedController, MemoryStore, PeriphRegistry,
//!     ProcHostStats, SimTelemetry, StorePmSink,
//! };
//!
//! let spec = DeviceSpec::load("/usr/share/sonic/platform".as_ref()).unwrap();
//! let store = Arc::new(MemoryStore::new());
//! let ctx = Context::new(
//!     store.clone(),
//!     Arc::new(SimTelemetry::from_device_spec(&spec)),
//!     Arc::new(StorePmSink::new(store)),
//!     Arc::new(ProcHostStats::new()),
//!     spec,
//!     DaemonConfig::default(),
//! );
//!
//! let registry = Arc::new(PeriphRegistry::new(ctx));
//! registry.synchronize_all();
//!
//! let controller = FanSpeedController::new(registry, Default::default());
//! controller.run_once().unwrap();
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;
pub mod periph;

// Standalone modules
pub mod alarm;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod platform;
pub mod pm;

// Re-export primary types from data/
pub use data::{
    ControlMode, Eeprom, FanSpeed, FanSpeedSpec, LedColor, OperStatus, PeriphKind, PsuInfo,
    RawTemperature, RebootType, ResultCode, SlotStatus, VinSpec,
};

// Re-export the state store and its snapshots
pub use data::{load_snapshot, save_snapshot, Fields, MemoryStore, StateStore, StoreSnapshot};

// Re-export validation functions from data/
pub use data::{
    validate_interval_ms, validate_level_table, validate_speed_rate, validate_threshold_pair,
};

// Re-export error types
pub use error::{PmonError, Result};

// Re-export engine types
pub use engine::{
    ControlLevel, ControlReport, FanSpeedController, FullSpeedReason, LevelTable, SpeedSetting,
};

// Re-export hardware types from hw/
pub use hw::{
    CoreUsage, CpuUsage, FixedHostStats, HostStats, MemoryUsage, ProcHostStats, SimCommand,
    SimTelemetry, SimUnit, Telemetry,
};

// Re-export peripheral types
pub use periph::{inlet_temperature, FanControl, Periph, PeriphRegistry};

// Re-export standalone module types
pub use alarm::{Alarm, Severity};
pub use config::{DaemonConfig, TelemetryBackend};
pub use context::Context;
pub use platform::DeviceSpec;
pub use pm::{PmPeriod, PmSample, PmSink, StorePmSink};
