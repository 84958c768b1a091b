//! Hardware access
//!
//! The peripheral telemetry seam, the simulated chassis, and control unit host
//! statistics.

mod host;
mod sim;
mod telemetry;

pub use host::{CoreUsage, CpuUsage, FixedHostStats, HostStats, MemoryUsage, ProcHostStats};
pub use sim::{SimCommand, SimTelemetry, SimUnit};
pub use telemetry::Telemetry;
