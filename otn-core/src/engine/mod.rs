//! Fan control engine modules
//!
//! Contains the discrete level table and the fan speed controller.

mod controller;
mod levels;

pub use controller::{ControlReport, FanSpeedController, FullSpeedReason};
pub use levels::{ControlLevel, LevelTable, SpeedSetting};
