//! Platform device spec
//!
//! Static description of the chassis: how many units of each kind it holds,
//! which part numbers are accepted, and the declared PSU capacity. Loaded once
//! at startup and shared through the [`Context`](crate::Context).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::constants::paths;
use crate::data::PeriphKind;
use crate::error::{PmonError, Result};

/// Contents of `dev_spec.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Expected unit count per kind
    #[serde(default)]
    pub number: BTreeMap<PeriphKind, u32>,

    /// Accepted part numbers per kind
    #[serde(rename = "expected-pn", default)]
    pub expected_pn: BTreeMap<PeriphKind, Vec<String>>,

    /// Chassis-declared PSU capacity (W)
    #[serde(rename = "power-capacity", default, skip_serializing_if = "Option::is_none")]
    pub power_capacity: Option<u32>,
}

impl DeviceSpec {
    /// Load `<platform_dir>/dev_spec.json`
    pub fn load(platform_dir: &Path) -> Result<Self> {
        let path = platform_dir.join(paths::DEV_SPEC_FILE);
        let contents = fs::read_to_string(&path).map_err(|e| PmonError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let spec: DeviceSpec = serde_json::from_str(&contents)?;
        info!(
            path = %path.display(),
            linecards = spec.expected_count(PeriphKind::Linecard),
            psus = spec.expected_count(PeriphKind::Psu),
            fans = spec.expected_count(PeriphKind::Fan),
            "Loaded device spec"
        );
        for kind in [PeriphKind::Linecard, PeriphKind::Psu, PeriphKind::Fan] {
            if spec.expected_count(kind) > 0 {
                debug!(kind = ?kind, first = spec.first_slot_id(kind), last = spec.last_slot_id(kind), "Slot range");
            }
        }
        Ok(spec)
    }

    /// Expected number of units of `kind`. Chassis and control unit default to one.
    pub fn expected_count(&self, kind: PeriphKind) -> u32 {
        match self.number.get(&kind) {
            Some(n) => *n,
            None if matches!(kind, PeriphKind::Chassis | PeriphKind::Cu) => 1,
            None => 0,
        }
    }

    /// Accepted part numbers of `kind`
    pub fn expected_pns(&self, kind: PeriphKind) -> &[String] {
        self.expected_pn.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a reported part number is unknown for `kind`
    ///
    /// Empty part numbers are never unknown, and a kind without an accepted
    /// list accepts everything.
    pub fn is_unknown_pn(&self, kind: PeriphKind, pn: &str) -> bool {
        let accepted = self.expected_pns(kind);
        !pn.is_empty() && !accepted.is_empty() && !accepted.iter().any(|p| p == pn)
    }

    /// First chassis slot id of `kind`
    ///
    /// Line cards start at slot 1, PSUs follow the line cards and fans follow
    /// the PSUs.
    pub fn first_slot_id(&self, kind: PeriphKind) -> u32 {
        let linecards = self.expected_count(PeriphKind::Linecard);
        let psus = self.expected_count(PeriphKind::Psu);
        match kind {
            PeriphKind::Linecard | PeriphKind::Cu | PeriphKind::Chassis => 1,
            PeriphKind::Psu => 1 + linecards,
            PeriphKind::Fan => 1 + linecards + psus,
        }
    }

    /// Last chassis slot id of `kind`, or 0 when none are expected
    pub fn last_slot_id(&self, kind: PeriphKind) -> u32 {
        match self.expected_count(kind) {
            0 => 0,
            n => self.first_slot_id(kind) + n - 1,
        }
    }

    /// Every `(kind, id)` the chassis should hold, in reconciliation order
    pub fn all_peripherals(&self) -> Vec<(PeriphKind, u32)> {
        PeriphKind::ALL
            .iter()
            .flat_map(|&kind| (1..=self.expected_count(kind)).map(move |id| (kind, id)))
            .collect()
    }
}
