//! Alarm model
//!
//! An alarm is identified by `(peripheral name, alarm code)`. Active alarms are
//! rows of the `CURALARM` table keyed `"<name>|<code>"`; clearing one moves it
//! to the `HISALARM` table. Codes sharing a prefix form a family in which at
//! most one member is active at a time (see [`Alarm::create_and_clear_others`]).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::constants::tables;
use crate::data::store::StateStore;
use crate::error::Result;

// ============================================================================
// Alarm codes
// ============================================================================

pub mod codes {
    pub const CRD_MISS: &str = "CRD_MISS";
    pub const CRD_BOOT_FAIL: &str = "CRD_BOOT_FAIL";
    pub const CRD_UNKNOWN: &str = "CRD_UNKNOWN";
    pub const CRD_MISMATCH: &str = "CRD_MISMATCH";
    pub const PSU_MISMATCH: &str = "PSU_MISMATCH";
    pub const FAN_FAIL: &str = "FAN_FAIL";
    pub const FAN_HIGH: &str = "FAN_HIGH";
    pub const FAN_LOW: &str = "FAN_LOW";
    pub const VOLTAGE_INPUT_HIGH: &str = "VOLTAGE_INPUT_HIGH";
    pub const VOLTAGE_INPUT_LOW: &str = "VOLTAGE_INPUT_LOW";
    pub const MEM_USAGE_HIGH: &str = "MEM_USAGE_HIGH";
    pub const TEMP_HIGH: &str = "TEMP_HIGH";
    pub const COMM_FAIL: &str = "COMM_FAIL";

    /// Prefix of the fan speed family
    pub const FAN_FAMILY: &str = "FAN_";

    /// Prefix of the PSU input voltage family
    pub const VOLTAGE_INPUT_FAMILY: &str = "VOLTAGE_INPUT";
}

/// Row field names of alarm rows
mod alarm_fields {
    pub const RESOURCE: &str = "resource";
    pub const TYPE_ID: &str = "type-id";
    pub const SEVERITY: &str = "severity";
    pub const TEXT: &str = "text";
    pub const TIME_CREATED: &str = "time-created";
    pub const TIME_CLEARED: &str = "time-cleared";
}

/// Alarm severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Major => "MAJOR",
            Severity::Minor => "MINOR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity and description of an alarm code. Unlisted codes are MINOR.
pub fn catalog(code: &str) -> (Severity, &'static str) {
    match code {
        codes::CRD_MISS => (Severity::Critical, "Card is missing"),
        codes::CRD_BOOT_FAIL => (Severity::Critical, "Card failed to boot"),
        codes::CRD_UNKNOWN => (Severity::Major, "Card type is unknown"),
        codes::CRD_MISMATCH => (Severity::Major, "Card does not match the configuration"),
        codes::PSU_MISMATCH => (Severity::Major, "Power supply capacity mismatch"),
        codes::FAN_FAIL => (Severity::Critical, "Fan has stopped"),
        codes::FAN_HIGH => (Severity::Minor, "Fan speed above specification"),
        codes::FAN_LOW => (Severity::Minor, "Fan speed below specification"),
        codes::VOLTAGE_INPUT_HIGH => (Severity::Major, "Input voltage too high"),
        codes::VOLTAGE_INPUT_LOW => (Severity::Major, "Input voltage too low"),
        codes::MEM_USAGE_HIGH => (Severity::Minor, "Memory usage is high"),
        codes::TEMP_HIGH => (Severity::Major, "Temperature too high"),
        codes::COMM_FAIL => (Severity::Critical, "Communication failure"),
        _ => (Severity::Minor, "Unclassified alarm"),
    }
}

/// Family prefix of a code: everything before its last `_` segment
///
/// `FAN_HIGH` belongs to `FAN`, `VOLTAGE_INPUT_LOW` to `VOLTAGE_INPUT`. A code
/// without `_` is its own family.
pub fn family_prefix(code: &str) -> &str {
    match code.rfind('_') {
        Some(idx) => &code[..idx],
        None => code,
    }
}

fn now_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

fn row_key(name: &str, code: &str) -> String {
    format!("{}|{}", name, code)
}

// ============================================================================
// Alarm
// ============================================================================

/// One alarm condition of one peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    name: String,
    code: String,
}

impl Alarm {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Row key in the current alarm table
    pub fn key(&self) -> String {
        row_key(&self.name, &self.code)
    }

    pub fn is_active(&self, store: &dyn StateStore) -> Result<bool> {
        Ok(store.get_entry(tables::CURRENT_ALARM, &self.key())?.is_some())
    }

    /// Mark the alarm active. No-op when it already is.
    pub fn create(&self, store: &dyn StateStore) -> Result<()> {
        if self.is_active(store)? {
            return Ok(());
        }

        let (severity, text) = catalog(&self.code);
        store.set(
            tables::CURRENT_ALARM,
            &self.key(),
            &[
                (alarm_fields::RESOURCE, self.name.clone()),
                (alarm_fields::TYPE_ID, self.code.clone()),
                (alarm_fields::SEVERITY, severity.as_str().to_string()),
                (alarm_fields::TEXT, text.to_string()),
                (alarm_fields::TIME_CREATED, now_ns().to_string()),
            ],
        )?;
        info!(name = %self.name, code = %self.code, severity = %severity, "Alarm raised");
        Ok(())
    }

    /// Mark the alarm cleared. No-op when it is not active.
    pub fn clear(&self, store: &dyn StateStore) -> Result<()> {
        clear_key(store, &self.key())
    }

    /// Create this alarm and clear every other alarm of the peripheral whose
    /// code starts with `prefix`
    ///
    /// `None` uses the code's own family (see [`family_prefix`]). An empty
    /// prefix supersedes every other alarm of the peripheral.
    pub fn create_and_clear_others(&self, store: &dyn StateStore, prefix: Option<&str>) -> Result<()> {
        self.create(store)?;

        let prefix = prefix.unwrap_or_else(|| family_prefix(&self.code));
        let own_key = self.key();
        for key in matching_keys(store, &self.name, prefix)? {
            if key != own_key {
                clear_key(store, &key)?;
            }
        }
        Ok(())
    }

    /// Clear every alarm of `name` whose code starts with `prefix`. Returns the
    /// number of alarms cleared.
    pub fn clear_by(store: &dyn StateStore, name: &str, prefix: &str) -> Result<usize> {
        let keys = matching_keys(store, name, prefix)?;
        for key in &keys {
            clear_key(store, key)?;
        }
        Ok(keys.len())
    }

    /// Codes of every active alarm of `name`
    pub fn active_codes(store: &dyn StateStore, name: &str) -> Result<Vec<String>> {
        let owner = format!("{}|", name);
        Ok(matching_keys(store, name, "")?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&owner).map(str::to_string))
            .collect())
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.code)
    }
}

/// Active alarm keys of `name` whose code starts with `prefix`
fn matching_keys(store: &dyn StateStore, name: &str, prefix: &str) -> Result<Vec<String>> {
    let owner = format!("{}|", name);
    let wanted = format!("{}{}", owner, prefix);
    Ok(store
        .scan_keys(tables::CURRENT_ALARM, &owner)?
        .into_iter()
        .filter(|key| key.starts_with(&wanted))
        .collect())
}

fn clear_key(store: &dyn StateStore, key: &str) -> Result<()> {
    let Some(mut row) = store.get_entry(tables::CURRENT_ALARM, key)? else {
        return Ok(());
    };

    let created = row
        .get(alarm_fields::TIME_CREATED)
        .cloned()
        .unwrap_or_default();
    row.insert(alarm_fields::TIME_CLEARED.to_string(), now_ns().to_string());

    let history: Vec<(&str, String)> = row.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    store.set(tables::HISTORY_ALARM, &format!("{}|{}", key, created), &history)?;
    store.delete_entry(tables::CURRENT_ALARM, key)?;

    debug!(alarm = %key, "Alarm cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::MemoryStore;

    #[test]
    fn test_create_is_idempotent() {
        let store = MemoryStore::new();
        let alarm = Alarm::new("FAN-1-1", codes::FAN_LOW);
        alarm.create(&store).unwrap();
        let writes = store.write_count();
        alarm.create(&store).unwrap();

        assert_eq!(store.write_count(), writes);
        assert_eq!(store.row_count(tables::CURRENT_ALARM), 1);
    }

    #[test]
    fn test_clear_moves_to_history() {
        let store = MemoryStore::new();
        let alarm = Alarm::new("PSU-1-1", codes::VOLTAGE_INPUT_LOW);
        alarm.create(&store).unwrap();
        alarm.clear(&store).unwrap();
        alarm.clear(&store).unwrap();

        assert!(!alarm.is_active(&store).unwrap());
        assert_eq!(store.row_count(tables::HISTORY_ALARM), 1);
        let keys = store.scan_keys(tables::HISTORY_ALARM, "PSU-1-1|VOLTAGE_INPUT_LOW|").unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_family_supersede() {
        let store = MemoryStore::new();
        Alarm::new("FAN-1-2", codes::FAN_LOW).create(&store).unwrap();
        Alarm::new("FAN-1-2", codes::CRD_UNKNOWN).create(&store).unwrap();

        Alarm::new("FAN-1-2", codes::FAN_HIGH)
            .create_and_clear_others(&store, None)
            .unwrap();

        let mut active = Alarm::active_codes(&store, "FAN-1-2").unwrap();
        active.sort();
        assert_eq!(active, vec![codes::CRD_UNKNOWN.to_string(), codes::FAN_HIGH.to_string()]);
    }

    #[test]
    fn test_empty_prefix_supersedes_everything() {
        let store = MemoryStore::new();
        Alarm::new("PSU-1-3", codes::VOLTAGE_INPUT_HIGH).create(&store).unwrap();
        Alarm::new("PSU-1-3", codes::PSU_MISMATCH).create(&store).unwrap();
        Alarm::new("PSU-1-30", codes::PSU_MISMATCH).create(&store).unwrap();

        Alarm::new("PSU-1-3", codes::CRD_MISS)
            .create_and_clear_others(&store, Some(""))
            .unwrap();

        assert_eq!(Alarm::active_codes(&store, "PSU-1-3").unwrap(), vec![codes::CRD_MISS.to_string()]);
        assert_eq!(Alarm::active_codes(&store, "PSU-1-30").unwrap().len(), 1);
    }

    #[test]
    fn test_clear_by_prefix() {
        let store = MemoryStore::new();
        Alarm::new("FAN-1-1", codes::FAN_LOW).create(&store).unwrap();
        Alarm::new("FAN-1-1", codes::CRD_UNKNOWN).create(&store).unwrap();

        assert_eq!(Alarm::clear_by(&store, "FAN-1-1", codes::FAN_FAMILY).unwrap(), 1);
        assert_eq!(Alarm::clear_by(&store, "FAN-1-1", "").unwrap(), 1);
        assert_eq!(store.row_count(tables::CURRENT_ALARM), 0);
    }

    #[test]
    fn test_family_prefix() {
        assert_eq!(family_prefix("FAN_HIGH"), "FAN");
        assert_eq!(family_prefix("VOLTAGE_INPUT_LOW"), "VOLTAGE_INPUT");
        assert_eq!(family_prefix("CRD_MISS"), "CRD");
        assert_eq!(family_prefix("OTHER"), "OTHER");
    }

    #[test]
    fn test_catalog_defaults_to_minor() {
        assert_eq!(catalog(codes::CRD_MISS).0, Severity::Critical);
        assert_eq!(catalog("SOMETHING_NEW").0, Severity::Minor);
    }
}
