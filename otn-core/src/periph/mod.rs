//! Peripheral reconciliation state machine
//!
//! Every field-replaceable unit is a [`Periph`]: an entity keyed by kind and
//! numeric id that is reconciled against the state store once per polling
//! tick by [`Periph::synchronize`].
//!
//! # States
//!
//! ```text
//! Absent --present--> Initializing --initialize_state--> SlotInit --> SlotReady
//!                                                           |           |  ^
//!                                                      boot timeout  Unknown/Mismatch
//!                                                           v
//!                                                        BootFail
//! ```
//!
//! Kind-specific behavior lives behind [`PeriphHooks`], implemented by one
//! variant per kind.

mod chassis;
mod cu;
mod fan;
mod linecard;
mod psu;
mod registry;

pub use chassis::inlet_temperature;
pub use fan::FanControl;
pub use registry::PeriphRegistry;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::alarm::{codes, Alarm};
use crate::constants::{fields, identity};
use crate::context::Context;
use crate::data::{Eeprom, LedColor, PeriphKind, RebootType, ResultCode, SlotStatus};
use crate::error::Result;
use crate::pm;

use chassis::Chassis;
use cu::Cu;
use fan::Fan;
use linecard::Linecard;
use psu::Psu;

/// Kind-specific behavior of a peripheral
///
/// Defaults describe a unit that is never unknown or mismatched and has no
/// alarms or PM of its own.
pub(crate) trait PeriphHooks {
    /// Read identity facts and write the full row
    fn initialize_state(&self, p: &Periph) -> Result<()>;

    fn unknown(&self, _p: &Periph) -> Result<bool> {
        Ok(false)
    }

    fn mismatch(&self, _p: &Periph) -> Result<bool> {
        Ok(false)
    }

    /// Alarm raised while `mismatch` holds
    fn mismatch_code(&self) -> &'static str {
        codes::CRD_MISMATCH
    }

    /// Whether a kind-specific fault currently owns the slot status, so the
    /// reconciliation pass must not force READY
    fn holds_slot_status(&self, _p: &Periph) -> Result<bool> {
        Ok(false)
    }

    fn update_alarm(&self, _p: &Periph) -> Result<()> {
        Ok(())
    }

    fn update_pm(&self, _p: &Periph) -> Result<()> {
        Ok(())
    }
}

enum Variant {
    Chassis(Chassis),
    Linecard(Linecard),
    Psu(Psu),
    Fan(Fan),
    Cu(Cu),
}

/// One monitored peripheral
pub struct Periph {
    kind: PeriphKind,
    id: u32,
    name: String,
    ctx: Context,
    state_initialized: AtomicBool,
    boot_epoch: AtomicU64,
    variant: Variant,
}

impl Periph {
    pub(crate) fn new(ctx: Context, kind: PeriphKind, id: u32) -> Self {
        let variant = match kind {
            PeriphKind::Chassis => Variant::Chassis(Chassis),
            PeriphKind::Linecard => Variant::Linecard(Linecard),
            PeriphKind::Psu => Variant::Psu(Psu),
            PeriphKind::Fan => Variant::Fan(Fan::default()),
            PeriphKind::Cu => Variant::Cu(Cu),
        };
        Self {
            kind,
            id,
            name: kind.entity_name(id),
            ctx,
            state_initialized: AtomicBool::new(false),
            boot_epoch: AtomicU64::new(0),
            variant,
        }
    }

    pub fn kind(&self) -> PeriphKind {
        self.kind
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// State store table holding this peripheral's row
    pub fn table_name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn removable(&self) -> bool {
        self.kind.removable()
    }

    pub fn is_initialized(&self) -> bool {
        self.state_initialized.load(Ordering::SeqCst)
    }

    /// Epoch of the most recently armed boot timer
    pub fn boot_epoch(&self) -> u64 {
        self.boot_epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn ctx(&self) -> &Context {
        &self.ctx
    }

    fn hooks(&self) -> &dyn PeriphHooks {
        match &self.variant {
            Variant::Chassis(h) => h,
            Variant::Linecard(h) => h,
            Variant::Psu(h) => h,
            Variant::Fan(h) => h,
            Variant::Cu(h) => h,
        }
    }

    /// Fan control handle, `None` for other kinds
    pub fn fan(&self) -> Option<FanControl<'_>> {
        match &self.variant {
            Variant::Fan(fan) => Some(FanControl::new(self, fan)),
            _ => None,
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Reconcile this peripheral once. Never fails: errors are logged and the
    /// next tick retries.
    pub fn synchronize(self: &Arc<Self>) {
        if let Err(e) = self.try_synchronize() {
            if e.is_unreachable() {
                warn!(name = %self.name, error = %e, "Peripheral unreachable, retrying next tick");
            } else {
                warn!(name = %self.name, error = %e, "Failed to synchronize peripheral");
            }
        }
    }

    fn try_synchronize(self: &Arc<Self>) -> Result<()> {
        if self.ctx.telemetry().presence(self.kind, self.id)? {
            self.synchronize_presence()
        } else {
            self.synchronize_absence()
        }
    }

    fn synchronize_presence(self: &Arc<Self>) -> Result<()> {
        if !self.is_initialized() {
            Alarm::clear_by(self.ctx.store(), &self.name, "")?;
            self.hooks().initialize_state(self)?;
            self.state_initialized.store(true, Ordering::SeqCst);
            info!(name = %self.name, "Peripheral initialized");

            if self.removable() {
                self.start_boot_timer(self.boot_timeout());
            }
            return Ok(());
        }

        if self.update_state()? {
            let hooks = self.hooks();
            hooks.update_alarm(self)?;
            hooks.update_pm(self)?;
        }
        Ok(())
    }

    /// Writes performed on every absent tick; each one is idempotent
    fn synchronize_absence(&self) -> Result<()> {
        let store = self.ctx.store();
        let table = self.table_name();

        if self.state_initialized.swap(false, Ordering::SeqCst) {
            // Disarm any pending boot timer
            self.boot_epoch.fetch_add(1, Ordering::SeqCst);
            info!(name = %self.name, "Peripheral removed");
        }

        store.delete_entry(table, &self.name)?;
        self.ctx.pm.clear_by_name(&self.name)?;
        store.set(
            table,
            &self.name,
            &[
                (fields::EMPTY, "true".to_string()),
                (fields::SLOT_STATUS, SlotStatus::Empty.as_str().to_string()),
            ],
        )?;
        // Keeps an active CRD_MISS as is and clears everything else
        Alarm::new(&self.name, codes::CRD_MISS).create_and_clear_others(store, Some(""))?;
        Ok(())
    }

    /// Identity checks and slot status. Returns whether alarms and PM run this
    /// tick.
    fn update_state(&self) -> Result<bool> {
        let hooks = self.hooks();
        let store = self.ctx.store();
        let unknown = Alarm::new(&self.name, codes::CRD_UNKNOWN);
        let mismatch = Alarm::new(&self.name, hooks.mismatch_code());

        if hooks.unknown(self)? {
            self.update_slot_status(SlotStatus::Unknown)?;
            unknown.create(store)?;
            mismatch.clear(store)?;
            return Ok(false);
        }
        if hooks.mismatch(self)? {
            self.update_slot_status(SlotStatus::Mismatch)?;
            mismatch.create(store)?;
            unknown.clear(store)?;
            return Ok(false);
        }
        unknown.clear(store)?;
        mismatch.clear(store)?;

        // Line card slot status past INIT is owned by the card's own agent
        if self.kind != PeriphKind::Linecard && !hooks.holds_slot_status(self)? {
            self.update_slot_status(SlotStatus::Ready)?;
        }
        Ok(true)
    }

    // ========================================================================
    // Slot status
    // ========================================================================

    /// Persisted slot status, `None` when missing or unparsable
    pub fn slot_status(&self) -> Result<Option<SlotStatus>> {
        Ok(self
            .ctx
            .store()
            .get_field(self.table_name(), &self.name, fields::SLOT_STATUS)?
            .and_then(|s| s.parse().ok()))
    }

    /// Move the persisted slot status to `status`
    ///
    /// Non-removable kinds carry no slot status and are never written. Fields
    /// are only written when present and different. An actual slot status
    /// change also updates the LED.
    pub fn update_slot_status(&self, status: SlotStatus) -> Result<()> {
        if !self.removable() {
            return Ok(());
        }

        let store = self.ctx.store();
        let table = self.table_name();
        let mut changed = false;

        if let Some(current) = store.get_field(table, &self.name, fields::SLOT_STATUS)? {
            if current.parse::<SlotStatus>().ok() != Some(status) {
                store.set_field(table, &self.name, fields::SLOT_STATUS, status.as_str())?;
                changed = true;
            }
        }

        let oper = status.oper_status();
        if let Some(current) = store.get_field(table, &self.name, fields::OPER_STATUS)? {
            if current != oper.as_str() {
                store.set_field(table, &self.name, fields::OPER_STATUS, oper.as_str())?;
            }
        }

        if changed {
            info!(name = %self.name, status = %status, "Slot status changed");
            self.set_led(status);
        }
        Ok(())
    }

    /// Slot status a freshly initialized peripheral starts in
    ///
    /// Removable units keep a carried-over status unless it is missing or
    /// EMPTY, which becomes INIT. Fixed units carry none and start in INIT.
    fn initial_slot_status(&self) -> Result<SlotStatus> {
        if !self.removable() {
            return Ok(SlotStatus::Init);
        }
        Ok(match self.slot_status()? {
            None | Some(SlotStatus::Empty) => SlotStatus::Init,
            Some(status) => status,
        })
    }

    /// Chassis slot holding this unit
    pub fn slot_id(&self) -> u32 {
        self.ctx.spec.first_slot_id(self.kind) + self.id - 1
    }

    /// Write the identity row shared by every kind plus `extra` fields
    pub(crate) fn write_identity(&self, eeprom: &Eeprom, extra: Vec<(&str, String)>) -> Result<SlotStatus> {
        let status = self.initial_slot_status()?;

        let mut row: Vec<(&str, String)> = vec![
            (fields::PART_NO, eeprom.part_number.clone()),
            (fields::SERIAL_NO, eeprom.serial_number.clone()),
            (fields::MFG_DATE, eeprom.mfg_date.clone()),
            (fields::HARDWARE_VERSION, eeprom.hardware_version.clone()),
            (fields::PARENT, identity::PARENT.to_string()),
            (fields::EMPTY, "false".to_string()),
            (fields::REMOVABLE, self.removable().to_string()),
            (fields::MFG_NAME, identity::MFG_NAME.to_string()),
            (fields::OPER_STATUS, status.oper_status().as_str().to_string()),
        ];
        if self.removable() {
            row.push((fields::SLOT_STATUS, status.as_str().to_string()));
            row.push((fields::SLOT_ID, self.slot_id().to_string()));
        }
        row.extend(extra);

        self.ctx.store().set(self.table_name(), &self.name, &row)?;
        if self.removable() {
            self.set_led(status);
        }
        Ok(status)
    }

    // ========================================================================
    // Boot timer
    // ========================================================================

    fn boot_timeout(&self) -> Duration {
        let config = &self.ctx.config;
        match self.kind {
            PeriphKind::Linecard => Duration::from_secs(config.linecard_boot_timeout_secs),
            _ => Duration::from_secs(config.boot_timeout_secs),
        }
    }

    /// Arm a one-shot boot timer. Arming again disarms the previous one.
    fn start_boot_timer(self: &Arc<Self>, timeout: Duration) {
        let epoch = self.boot_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(self);

        let spawned = thread::Builder::new()
            .name(format!("boot-{}", self.name))
            .spawn(move || {
                thread::sleep(timeout);
                if let Some(periph) = weak.upgrade() {
                    periph.on_boot_timeout(epoch);
                }
            });

        match spawned {
            Ok(_) => info!(name = %self.name, timeout_secs = timeout.as_secs(), "Boot timer started"),
            Err(e) => warn!(name = %self.name, error = %e, "Failed to start boot timer"),
        }
    }

    /// Boot timer expiry for the timer armed at `epoch`
    ///
    /// A peripheral still in INIT moves to BOOTFAIL and raises CRD_BOOT_FAIL.
    /// Any other status, or a stale epoch, leaves everything untouched.
    pub fn on_boot_timeout(&self, epoch: u64) {
        if self.boot_epoch() != epoch {
            debug!(name = %self.name, epoch, "Ignoring stale boot timer");
            return;
        }
        if let Err(e) = self.handle_boot_timeout() {
            warn!(name = %self.name, error = %e, "Failed to handle boot timeout");
        }
    }

    fn handle_boot_timeout(&self) -> Result<()> {
        let status = self.slot_status()?;
        if status == Some(SlotStatus::Init) {
            self.update_slot_status(SlotStatus::Bootfail)?;
            Alarm::new(&self.name, codes::CRD_BOOT_FAIL)
                .create_and_clear_others(self.ctx.store(), Some(""))?;
        }
        info!(
            name = %self.name,
            status = status.map(|s| s.as_str()).unwrap_or("NONE"),
            "Boot finished"
        );
        Ok(())
    }

    // ========================================================================
    // Telemetry and commands
    // ========================================================================

    /// Temperature in Celsius, `None` when the sensor is unreadable
    pub fn temperature(&self) -> Result<Option<f32>> {
        Ok(self.ctx.telemetry().temperature(self.kind, self.id)?.celsius())
    }

    pub fn reboot(&self, reboot: RebootType) -> bool {
        let result = self.ctx.telemetry().reboot(self.kind, self.id, reboot);
        self.command_accepted("reboot", result)
    }

    /// Ask the service to initialize the unit's hardware
    pub fn initialize_hardware(&self) -> bool {
        let result = self.ctx.telemetry().initialize(self.kind, self.id);
        self.command_accepted("initialize", result)
    }

    fn set_led(&self, status: SlotStatus) {
        let color = LedColor::for_status(status);
        let result = self.ctx.telemetry().set_led_color(self.kind, self.id, color);
        self.command_accepted("set_led_color", result);
    }

    /// Log a command outcome; only OK counts as accepted
    pub(crate) fn command_accepted(&self, command: &str, result: Result<ResultCode>) -> bool {
        match result {
            Ok(ResultCode::Ok) => true,
            Ok(code) => {
                warn!(name = %self.name, command, code = %code, "Command rejected");
                false
            }
            Err(e) => {
                warn!(name = %self.name, command, error = %e, "Command failed");
                false
            }
        }
    }

    /// Feed one reading of `metric` into both PM windows
    pub(crate) fn update_pm(&self, metric: &str, value: f64) -> Result<()> {
        pm::update_both(self.ctx.pm.as_ref(), self.table_name(), &self.name, metric, value)
    }

    /// Feed the unit temperature into PM, skipping unreadable sensors
    pub(crate) fn update_temperature_pm(&self) -> Result<()> {
        match self.temperature()? {
            Some(celsius) => self.update_pm("Temperature", celsius as f64),
            None => {
                debug!(name = %self.name, "Temperature unreadable, PM skipped");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::data::{MemoryStore, OperStatus, StateStore};
    use crate::hw::{FixedHostStats, SimCommand, SimTelemetry, SimUnit};
    use crate::platform::DeviceSpec;
    use crate::pm::StorePmSink;

    struct Harness {
        store: Arc<MemoryStore>,
        sim: Arc<SimTelemetry>,
        ctx: Context,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sim = Arc::new(SimTelemetry::new());
        let spec: DeviceSpec = serde_json::from_str(
            r#"{ "number": { "FAN": 2, "PSU": 1 }, "expected-pn": { "FAN": ["FAN-80"] } }"#,
        )
        .unwrap();
        let ctx = Context::new(
            store.clone(),
            sim.clone(),
            Arc::new(StorePmSink::new(store.clone())),
            Arc::new(FixedHostStats::default()),
            spec,
            DaemonConfig::default(),
        );
        Harness { store, sim, ctx }
    }

    fn field(store: &MemoryStore, table: &str, row: &str, field: &str) -> Option<String> {
        store.get_field(table, row, field).unwrap()
    }

    #[test]
    fn test_first_presence_initializes_row() {
        let h = harness();
        h.sim.insert(PeriphKind::Fan, 1, SimUnit::default().with_part_number("FAN-80"));
        let fan = Arc::new(Periph::new(h.ctx.clone(), PeriphKind::Fan, 1));

        fan.synchronize();

        assert!(fan.is_initialized());
        assert_eq!(field(&h.store, "FAN", "FAN-1-1", "slot-status").as_deref(), Some("INIT"));
        assert_eq!(field(&h.store, "FAN", "FAN-1-1", "oper-status").as_deref(), Some("INACTIVE"));
        assert_eq!(field(&h.store, "FAN", "FAN-1-1", "part-no").as_deref(), Some("FAN-80"));
        assert_eq!(field(&h.store, "FAN", "FAN-1-1", "parent").as_deref(), Some("CHASSIS-1"));
        assert_eq!(fan.boot_epoch(), 1);
    }

    #[test]
    fn test_second_tick_moves_to_ready() {
        let h = harness();
        h.sim.insert(PeriphKind::Fan, 1, SimUnit::default().with_part_number("FAN-80"));
        let fan = Arc::new(Periph::new(h.ctx.clone(), PeriphKind::Fan, 1));

        fan.synchronize();
        fan.synchronize();

        assert_eq!(fan.slot_status().unwrap(), Some(SlotStatus::Ready));
        assert_eq!(
            field(&h.store, "FAN", "FAN-1-1", "oper-status").as_deref(),
            Some(OperStatus::Active.as_str())
        );
        assert!(h.sim.commands().contains(&SimCommand::Led {
            kind: PeriphKind::Fan,
            id: 1,
            color: LedColor::Green
        }));
    }

    #[test]
    fn test_unknown_part_number_raises_alarm_and_skips_pm() {
        let h = harness();
        h.sim.insert(PeriphKind::Fan, 2, SimUnit::default().with_part_number("FAN-OTHER"));
        let fan = Arc::new(Periph::new(h.ctx.clone(), PeriphKind::Fan, 2));

        fan.synchronize();
        fan.synchronize();

        assert_eq!(fan.slot_status().unwrap(), Some(SlotStatus::Unknown));
        assert!(Alarm::new("FAN-1-2", codes::CRD_UNKNOWN).is_active(h.store.as_ref()).unwrap());
        assert!(h.store.scan_keys("COUNTERS", "FAN-1-2_").unwrap().is_empty());

        // Fixing the part number recovers on the next tick
        h.sim.modify(PeriphKind::Fan, 2, |u| u.eeprom.part_number = "FAN-80".into());
        fan.synchronize();
        assert_eq!(fan.slot_status().unwrap(), Some(SlotStatus::Ready));
        assert!(!Alarm::new("FAN-1-2", codes::CRD_UNKNOWN).is_active(h.store.as_ref()).unwrap());
    }

    #[test]
    fn test_unreachable_hardware_is_contained() {
        let h = harness();
        h.sim.insert(PeriphKind::Psu, 1, SimUnit::default());
        h.sim.set_unreachable(PeriphKind::Psu, 1, true);
        let psu = Arc::new(Periph::new(h.ctx.clone(), PeriphKind::Psu, 1));

        psu.synchronize();

        assert!(!psu.is_initialized());
        assert_eq!(h.store.write_count(), 0);
    }

    #[test]
    fn test_boot_timeout_only_acts_in_init() {
        let h = harness();
        h.sim.insert(PeriphKind::Fan, 1, SimUnit::default().with_part_number("FAN-80"));
        let fan = Arc::new(Periph::new(h.ctx.clone(), PeriphKind::Fan, 1));
        fan.synchronize();

        fan.on_boot_timeout(fan.boot_epoch());

        assert_eq!(fan.slot_status().unwrap(), Some(SlotStatus::Bootfail));
        assert_eq!(
            Alarm::active_codes(h.store.as_ref(), "FAN-1-1").unwrap(),
            vec![codes::CRD_BOOT_FAIL.to_string()]
        );
    }

    #[test]
    fn test_stale_boot_timer_is_ignored() {
        let h = harness();
        h.sim.insert(PeriphKind::Fan, 1, SimUnit::default().with_part_number("FAN-80"));
        let fan = Arc::new(Periph::new(h.ctx.clone(), PeriphKind::Fan, 1));
        fan.synchronize();
        let stale = fan.boot_epoch();

        h.sim.set_present(PeriphKind::Fan, 1, false);
        fan.synchronize();
        h.sim.set_present(PeriphKind::Fan, 1, true);
        fan.synchronize();

        fan.on_boot_timeout(stale);
        assert_eq!(fan.slot_status().unwrap(), Some(SlotStatus::Init));
    }

    #[test]
    fn test_absent_tick_is_idempotent() {
        let h = harness();
        h.sim.insert(PeriphKind::Psu, 1, SimUnit { present: false, ..SimUnit::default() });
        let psu = Arc::new(Periph::new(h.ctx.clone(), PeriphKind::Psu, 1));

        psu.synchronize();
        let first = h.store.get_entry("PSU", "PSU-1-1").unwrap();
        let raised = h.store.get_entry("CURALARM", "PSU-1-1|CRD_MISS").unwrap();
        for _ in 0..10 {
            psu.synchronize();
        }

        assert_eq!(h.store.get_entry("PSU", "PSU-1-1").unwrap(), first);
        // The missing-card alarm is raised once, not re-raised every tick
        assert_eq!(h.store.get_entry("CURALARM", "PSU-1-1|CRD_MISS").unwrap(), raised);
        assert!(h.store.scan_keys("HISALARM", "PSU-1-1").unwrap().is_empty());
        assert_eq!(field(&h.store, "PSU", "PSU-1-1", "slot-status").as_deref(), Some("EMPTY"));
        assert_eq!(
            Alarm::active_codes(h.store.as_ref(), "PSU-1-1").unwrap(),
            vec![codes::CRD_MISS.to_string()]
        );
    }

    #[test]
    fn test_update_slot_status_skips_fixed_units() {
        let h = harness();
        let cu = Periph::new(h.ctx.clone(), PeriphKind::Cu, 1);
        let before = h.store.write_count();

        cu.update_slot_status(SlotStatus::Bootfail).unwrap();

        assert_eq!(h.store.write_count(), before);
    }

    #[test]
    fn test_update_slot_status_only_writes_differences() {
        let h = harness();
        let psu = Periph::new(h.ctx.clone(), PeriphKind::Psu, 1);
        h.store
            .set("PSU", "PSU-1-1", &[("slot-status", "READY".into()), ("oper-status", "ACTIVE".into())])
            .unwrap();
        let before = h.store.write_count();

        psu.update_slot_status(SlotStatus::Ready).unwrap();
        assert_eq!(h.store.write_count(), before);

        psu.update_slot_status(SlotStatus::Comfail).unwrap();
        assert_eq!(h.store.write_count(), before + 2);
        assert_eq!(field(&h.store, "PSU", "PSU-1-1", "oper-status").as_deref(), Some("INACTIVE"));
    }

    #[test]
    fn test_rejected_led_command_is_not_an_error() {
        let h = harness();
        h.sim.insert(PeriphKind::Fan, 1, SimUnit::default().with_part_number("FAN-80"));
        h.sim.reject_commands(Some(-1));
        let fan = Arc::new(Periph::new(h.ctx.clone(), PeriphKind::Fan, 1));

        fan.synchronize();
        fan.synchronize();

        assert_eq!(fan.slot_status().unwrap(), Some(SlotStatus::Ready));
        assert!(!fan.reboot(RebootType::Cold));
        h.sim.reject_commands(None);
        assert!(fan.initialize_hardware());
    }
}
