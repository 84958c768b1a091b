//! Power supply rules

use super::{Periph, PeriphHooks};
use crate::alarm::{codes, Alarm};
use crate::constants::fields;
use crate::data::SlotStatus;
use crate::error::Result;

pub(crate) struct Psu;

impl PeriphHooks for Psu {
    fn initialize_state(&self, p: &Periph) -> Result<()> {
        let telemetry = p.ctx().telemetry();
        let eeprom = telemetry.eeprom(p.kind(), p.id())?;
        let info = telemetry.psu_info(p.id())?;
        let extra = vec![
            (fields::MODEL_NAME, eeprom.model_name.clone()),
            (fields::CAPACITY, info.capacity.to_string()),
        ];
        p.write_identity(&eeprom, extra)?;
        Ok(())
    }

    /// Any non-empty part number outside the accepted list
    fn unknown(&self, p: &Periph) -> Result<bool> {
        let pn = p.ctx().telemetry().eeprom(p.kind(), p.id())?.part_number;
        let accepted = p.ctx().spec.expected_pns(p.kind());
        Ok(!pn.is_empty() && !accepted.iter().any(|a| *a == pn))
    }

    /// Reported capacity differs from the chassis-declared capacity
    fn mismatch(&self, p: &Periph) -> Result<bool> {
        let Some(declared) = p.ctx().spec.power_capacity else {
            return Ok(false);
        };
        Ok(p.ctx().telemetry().psu_info(p.id())?.capacity != declared)
    }

    fn mismatch_code(&self) -> &'static str {
        codes::PSU_MISMATCH
    }

    /// Input voltage family, evaluated only while READY
    fn update_alarm(&self, p: &Periph) -> Result<()> {
        if p.slot_status()? != Some(SlotStatus::Ready) {
            return Ok(());
        }

        let store = p.ctx().store();
        let telemetry = p.ctx().telemetry();
        let vin = telemetry.psu_info(p.id())?.vin;
        let spec = telemetry.psu_vin_spec(p.id())?;

        let code = if vin > spec.max {
            Some(codes::VOLTAGE_INPUT_HIGH)
        } else if vin < spec.min {
            Some(codes::VOLTAGE_INPUT_LOW)
        } else {
            None
        };

        match code {
            Some(code) => Alarm::new(p.name(), code)
                .create_and_clear_others(store, Some(codes::VOLTAGE_INPUT_FAMILY))?,
            None => {
                Alarm::clear_by(store, p.name(), codes::VOLTAGE_INPUT_FAMILY)?;
            }
        }
        Ok(())
    }

    fn update_pm(&self, p: &Periph) -> Result<()> {
        p.update_temperature_pm()?;

        let info = p.ctx().telemetry().psu_info(p.id())?;
        for (metric, value) in [
            ("InputCurrent", info.iin),
            ("InputVoltage", info.vin),
            ("InputPower", info.pin),
            ("OutputCurrent", info.iout),
            ("OutputPower", info.pout),
            ("OutputVoltage", info.vout),
            ("AmbientTemperature", info.ambient_temp),
            ("PrimaryTemperature", info.primary_temp),
            ("SecondaryTemperature", info.secondary_temp),
            ("FanSpeed", info.fan as f64),
        ] {
            p.update_pm(metric, value)?;
        }
        Ok(())
    }
}
