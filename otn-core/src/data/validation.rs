//! Input validation for configuration and speed requests
//!
//! Values arriving from configuration files or external speed requests are
//! checked here before they reach the control loop or the hardware.

use crate::constants::{fan, timing};
use crate::engine::ControlLevel;
use crate::error::{PmonError, Result};

/// Validates that a speed rate is within 0-100 percent
pub fn validate_speed_rate(value: u32) -> Result<u8> {
    if value > fan::MAX_RATE as u32 {
        return Err(PmonError::InvalidSpeedRate(value.to_string()));
    }
    Ok(value as u8)
}

/// Validates a loop interval against the minimum
pub fn validate_interval_ms(field: &str, value: u64) -> Result<u64> {
    if value < timing::MIN_INTERVAL_MS {
        return Err(PmonError::invalid_config(
            field,
            format!("must be at least {}ms, got {}ms", timing::MIN_INTERVAL_MS, value),
        ));
    }
    Ok(value)
}

/// Validates a raise/clear hysteresis pair: clear must sit below raise
pub fn validate_threshold_pair(field: &str, raise: f32, clear: f32) -> Result<()> {
    if !raise.is_finite() || !clear.is_finite() {
        return Err(PmonError::invalid_config(field, "thresholds must be finite"));
    }
    if clear >= raise {
        return Err(PmonError::invalid_config(
            field,
            format!("clear threshold {} must be below raise threshold {}", clear, raise),
        ));
    }
    Ok(())
}

/// Validates the six-level fan control table
///
/// Rates must strictly increase and stay within 0-100. The lowest level has no
/// downshift threshold and the highest level has no upshift threshold.
pub fn validate_level_table(levels: &[ControlLevel]) -> Result<()> {
    if levels.len() != fan::LEVEL_COUNT {
        return Err(PmonError::InvalidLevelTable(format!(
            "expected {} levels, got {}",
            fan::LEVEL_COUNT,
            levels.len()
        )));
    }

    for (idx, level) in levels.iter().enumerate() {
        validate_speed_rate(level.rate as u32)
            .map_err(|_| PmonError::InvalidLevelTable(format!("S{} rate {} above 100", idx + 1, level.rate)))?;

        if idx > 0 && level.rate <= levels[idx - 1].rate {
            return Err(PmonError::InvalidLevelTable(format!(
                "S{} rate {} does not exceed S{} rate {}",
                idx + 1,
                level.rate,
                idx,
                levels[idx - 1].rate
            )));
        }

        if level.upshift_enabled() && level.downshift_enabled() && level.downshift >= level.upshift {
            return Err(PmonError::InvalidLevelTable(format!(
                "S{} downshift {} must be below upshift {}",
                idx + 1,
                level.downshift,
                level.upshift
            )));
        }
    }

    if levels[0].downshift_enabled() {
        return Err(PmonError::InvalidLevelTable("S1 cannot have a downshift threshold".into()));
    }
    if levels[fan::LEVEL_COUNT - 1].upshift_enabled() {
        return Err(PmonError::InvalidLevelTable("S6 cannot have an upshift threshold".into()));
    }

    Ok(())
}
