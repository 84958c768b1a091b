//! Fan Control Loop
//!
//! Drives [`FanSpeedController::run_once`] on its own interval, independent of
//! reconciliation. Each iteration runs on the blocking pool because the
//! controller talks to telemetry synchronously.
//!
//! # Safety Features
//! - **Full-speed override**: handled inside the controller (inlet unreadable,
//!   fans missing, line-card alarm)
//! - **Graceful degradation**: per-fan failures are logged by the controller
//!   and the remaining fans are still stepped
//! - **Error counting**: repeated iteration failures are rate-limited in the log

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use otn_core::{ControlReport, FanSpeedController, SpeedSetting};
use otn_error::Result;

/// Consecutive failed iterations between repeated error logs
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Hand every present fan to the controller
fn take_over_fans(controller: &FanSpeedController) {
    let fans = controller.run_manual(SpeedSetting::Auto, None);
    info!(fans = fans.len(), "Fans placed under automatic control");
}

fn run_iteration(controller: &FanSpeedController) -> Result<ControlReport> {
    let report = controller.run_once()?;
    if !report.changed.is_empty() {
        debug!(
            inlet = ?report.inlet,
            full_speed = ?report.full_speed,
            changed = ?report.changed,
            "Fan rates updated"
        );
    }
    Ok(report)
}

pub async fn run_control_loop(
    controller: Arc<FanSpeedController>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    info!(interval_ms = interval.as_millis() as u64, "Fan control loop starting");

    let startup = controller.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || take_over_fans(&startup)).await {
        error!("Failed to place fans under automatic control: {}", e);
    }

    let mut consecutive_errors: u32 = 0;
    let mut was_full_speed = false;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("Fan control loop shutting down");
            break;
        }

        let iteration = controller.clone();
        match tokio::task::spawn_blocking(move || run_iteration(&iteration)).await {
            Ok(Ok(report)) => {
                if consecutive_errors > 0 {
                    debug!("Fan control recovered after {} errors", consecutive_errors);
                    consecutive_errors = 0;
                }
                let full_speed = report.full_speed.is_some();
                if was_full_speed && !full_speed {
                    info!(inlet = ?report.inlet, "Full-speed condition cleared, resuming level control");
                }
                was_full_speed = full_speed;
            }
            Ok(Err(e)) => {
                consecutive_errors += 1;
                if consecutive_errors == 1 || consecutive_errors % MAX_CONSECUTIVE_ERRORS == 0 {
                    warn!("Fan control error (count: {}): {}", consecutive_errors, e);
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                error!("Fan control iteration panicked: {}", e);
            }
        }

        tokio::time::sleep(interval).await;
    }

    info!("Fan control loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use otn_core::{
        Context, DaemonConfig, DeviceSpec, FixedHostStats, LevelTable, MemoryStore, PeriphKind,
        PeriphRegistry, SimTelemetry, StorePmSink,
    };

    fn controller(inlet_hundredths: i32) -> (Arc<SimTelemetry>, FanSpeedController) {
        let store = Arc::new(MemoryStore::new());
        let spec: DeviceSpec =
            serde_json::from_str(r#"{ "number": { "LINECARD": 1, "FAN": 2 } }"#).unwrap();
        let sim = Arc::new(SimTelemetry::from_device_spec(&spec));
        sim.set_temperature(PeriphKind::Linecard, 1, inlet_hundredths);
        let registry = Arc::new(PeriphRegistry::new(Context::new(
            store.clone(),
            sim.clone(),
            Arc::new(StorePmSink::new(store)),
            Arc::new(FixedHostStats::default()),
            spec,
            DaemonConfig::default(),
        )));
        registry.synchronize_all();
        (sim, FanSpeedController::new(registry, LevelTable::default()))
    }

    #[test]
    fn test_first_iteration_settles_from_top_level() {
        let (sim, controller) = controller(2000);
        take_over_fans(&controller);

        let report = run_iteration(&controller).unwrap();
        assert_eq!(report.full_speed, None);
        assert_eq!(report.changed, vec![1, 2]);
        assert_eq!(sim.fan_rate(1), Some(70));
    }

    #[test]
    fn test_unreadable_inlet_reports_full_speed() {
        let (sim, controller) = controller(-99);
        let report = run_iteration(&controller).unwrap();
        assert!(report.full_speed.is_some());
        assert_eq!(sim.fan_rate(2), Some(100));
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let (sim, controller) = controller(3000);
        let shutdown = Arc::new(AtomicBool::new(true));

        run_control_loop(Arc::new(controller), Duration::from_millis(10), shutdown).await;
        // Startup hand-over still ran
        assert_eq!(sim.fan_mode(1), Some(otn_core::ControlMode::Auto));
    }
}
