//! Reconciliation loop
//!
//! One pass calls `synchronize()` on every peripheral the device spec
//! declares, one at a time, then persists the store snapshot if configured.
//! Peripheral failures are contained by `synchronize()` itself, so a pass
//! only fails when the snapshot cannot be written.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use otn_core::{save_snapshot, MemoryStore, PeriphRegistry};
use otn_error::Result;

/// Consecutive failed passes between repeated error logs
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

pub struct Poller {
    registry: Arc<PeriphRegistry>,
    store: Arc<MemoryStore>,
    snapshot: Option<PathBuf>,
    passes: AtomicU64,
}

impl Poller {
    pub fn new(registry: Arc<PeriphRegistry>, store: Arc<MemoryStore>, snapshot: Option<PathBuf>) -> Self {
        Self {
            registry,
            store,
            snapshot,
            passes: AtomicU64::new(0),
        }
    }

    /// One reconciliation pass followed by a snapshot write
    pub fn run_pass(&self) -> Result<()> {
        let started = Instant::now();
        self.registry.synchronize_all();
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(pass, elapsed_ms = started.elapsed().as_millis() as u64, "Reconciliation pass complete");
        self.flush_snapshot()
    }

    /// Write the store snapshot, if one is configured
    pub fn flush_snapshot(&self) -> Result<()> {
        match &self.snapshot {
            Some(path) => save_snapshot(&self.store, path),
            None => Ok(()),
        }
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }
}

pub async fn run_poll_loop(poller: Arc<Poller>, interval: Duration, shutdown: Arc<AtomicBool>) {
    info!(interval_ms = interval.as_millis() as u64, "Reconciliation loop starting");

    let mut consecutive_errors: u32 = 0;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("Reconciliation loop shutting down");
            break;
        }

        let pass_poller = poller.clone();
        match tokio::task::spawn_blocking(move || pass_poller.run_pass()).await {
            Ok(Ok(())) => {
                if consecutive_errors > 0 {
                    debug!("Reconciliation recovered after {} errors", consecutive_errors);
                    consecutive_errors = 0;
                }
            }
            Ok(Err(e)) => {
                consecutive_errors += 1;
                if consecutive_errors == 1 || consecutive_errors % MAX_CONSECUTIVE_ERRORS == 0 {
                    warn!("Reconciliation pass error (count: {}): {}", consecutive_errors, e);
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                error!("Reconciliation pass panicked: {}", e);
            }
        }

        tokio::time::sleep(interval).await;
    }

    info!(passes = poller.passes(), "Reconciliation loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use otn_core::{
        load_snapshot, Context, DaemonConfig, DeviceSpec, FixedHostStats, PeriphKind, SimTelemetry,
        SlotStatus, StateStore, StorePmSink,
    };

    fn poller(snapshot: Option<PathBuf>) -> (Arc<MemoryStore>, Arc<SimTelemetry>, Poller) {
        let store = Arc::new(MemoryStore::new());
        let spec: DeviceSpec =
            serde_json::from_str(r#"{ "number": { "LINECARD": 1, "PSU": 1, "FAN": 2 } }"#).unwrap();
        let sim = Arc::new(SimTelemetry::from_device_spec(&spec));
        let ctx = Context::new(
            store.clone(),
            sim.clone(),
            Arc::new(StorePmSink::new(store.clone())),
            Arc::new(FixedHostStats::default()),
            spec,
            DaemonConfig::default(),
        );
        let registry = Arc::new(PeriphRegistry::new(ctx));
        (store.clone(), sim, Poller::new(registry, store, snapshot))
    }

    #[test]
    fn test_pass_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let (_store, _sim, poller) = poller(Some(path.clone()));

        poller.run_pass().unwrap();
        poller.run_pass().unwrap();
        assert_eq!(poller.passes(), 2);

        let restored = load_snapshot(&path).unwrap();
        assert_eq!(
            restored.get_field("FAN", "FAN-1-2", "slot-status").unwrap().as_deref(),
            Some(SlotStatus::Ready.as_str())
        );
    }

    #[test]
    fn test_pass_without_snapshot() {
        let (store, sim, poller) = poller(None);
        poller.run_pass().unwrap();

        sim.set_present(PeriphKind::Psu, 1, false);
        poller.run_pass().unwrap();
        assert_eq!(store.get_field("PSU", "PSU-1-1", "empty").unwrap().as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let (_store, _sim, poller) = poller(None);
        let poller = Arc::new(poller);
        let shutdown = Arc::new(AtomicBool::new(true));

        run_poll_loop(poller.clone(), Duration::from_millis(10), shutdown).await;
        assert_eq!(poller.passes(), 0);
    }
}
