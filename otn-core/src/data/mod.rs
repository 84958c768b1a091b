//! Data types, state store, persistence, and validation modules

mod persistence;
pub mod store;
mod types;
mod validation;

pub use persistence::{load_snapshot, save_snapshot, StoreSnapshot};
pub use store::{Fields, MemoryStore, StateStore, TableMap};
pub use types::{
    ControlMode, Eeprom, FanSpeed, FanSpeedSpec, LedColor, OperStatus, PeriphKind, PsuInfo,
    RawTemperature, RebootType, ResultCode, SlotStatus, VinSpec,
};
pub use validation::{
    validate_interval_ms, validate_level_table, validate_speed_rate, validate_threshold_pair,
};
