//! Discrete fan control levels
//!
//! Six levels S1..S6, each with a fixed speed rate and a pair of hysteresis
//! thresholds. A level moves up one step when the inlet temperature exceeds its
//! upshift threshold and down one step when it falls below its downshift
//! threshold. A threshold of zero disables that direction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::fan;
use crate::data::{validate_level_table, validate_speed_rate};
use crate::error::{PmonError, Result};

/// One control level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlLevel {
    /// Speed rate commanded at this level (percent)
    pub rate: u8,
    /// Inlet temperature above which the next level is selected
    pub upshift: f32,
    /// Inlet temperature below which the previous level is selected
    pub downshift: f32,
}

impl ControlLevel {
    pub fn upshift_enabled(&self) -> bool {
        self.upshift != fan::THRESHOLD_DISABLED
    }

    pub fn downshift_enabled(&self) -> bool {
        self.downshift != fan::THRESHOLD_DISABLED
    }
}

/// Validated S1..S6 table
#[derive(Debug, Clone, PartialEq)]
pub struct LevelTable {
    levels: Vec<ControlLevel>,
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            levels: fan::default_levels(),
        }
    }
}

impl LevelTable {
    pub fn new(levels: Vec<ControlLevel>) -> Result<Self> {
        validate_level_table(&levels)?;
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[ControlLevel] {
        &self.levels
    }

    /// Rate of the highest level
    pub fn max_rate(&self) -> u8 {
        self.levels.last().map(|l| l.rate).unwrap_or(fan::MAX_RATE)
    }

    /// Index of the level a commanded rate belongs to
    ///
    /// A rate at or below S1 is S1; otherwise it is the lowest level whose rate
    /// is not below it.
    pub fn index_for_rate(&self, rate: u8) -> usize {
        self.levels
            .iter()
            .position(|level| rate <= level.rate)
            .unwrap_or(self.levels.len() - 1)
    }

    /// Rate to move to from `current_rate` at inlet temperature `inlet`, or
    /// `None` to stay
    ///
    /// Upshift is checked first and wins when both thresholds match.
    pub fn next_rate(&self, current_rate: u8, inlet: f32) -> Option<u8> {
        let idx = self.index_for_rate(current_rate);
        let level = &self.levels[idx];

        if level.upshift_enabled() && inlet > level.upshift {
            return self.levels.get(idx + 1).map(|l| l.rate);
        }
        if level.downshift_enabled() && inlet < level.downshift && idx > 0 {
            return Some(self.levels[idx - 1].rate);
        }
        None
    }
}

/// Requested fan speed: controller-owned or a fixed rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedSetting {
    Auto,
    Fixed(u8),
}

impl FromStr for SpeedSetting {
    type Err = PmonError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(SpeedSetting::Auto);
        }
        let value: u32 = s
            .parse()
            .map_err(|_| PmonError::InvalidSpeedRate(s.to_string()))?;
        Ok(SpeedSetting::Fixed(validate_speed_rate(value)?))
    }
}

impl fmt::Display for SpeedSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedSetting::Auto => f.write_str("auto"),
            SpeedSetting::Fixed(rate) => write!(f, "{}", rate),
        }
    }
}
