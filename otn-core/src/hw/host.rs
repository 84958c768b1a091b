//! Control unit host statistics
//!
//! Memory usage from `/proc/meminfo` and CPU utilization from `/proc/stat`.
//! CPU percentages are deltas between consecutive samples.

use parking_lot::Mutex;
use std::fs;

use crate::error::{PmonError, Result};

const MEMINFO_PATH: &str = "/proc/meminfo";
const STAT_PATH: &str = "/proc/stat";

/// Bytes per kilobyte for meminfo conversion
const BYTES_PER_KB: u64 = 1024;

/// Memory usage snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub utilized_bytes: u64,
    pub available_bytes: u64,
    pub percent: f32,
}

/// Utilization of one core in percent
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoreUsage {
    pub total: f64,
    pub user: f64,
    pub kernel: f64,
    pub nice: f64,
    pub idle: f64,
    pub wait: f64,
}

/// CPU utilization snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CpuUsage {
    pub total_percent: f64,
    pub cores: Vec<CoreUsage>,
}

/// Host statistics source of the control unit
pub trait HostStats: Send + Sync {
    fn memory(&self) -> Result<MemoryUsage>;

    fn cpu(&self) -> Result<CpuUsage>;
}

// ============================================================================
// /proc backed implementation
// ============================================================================

/// Cumulative jiffies of one `cpu` line
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTimes {
    fn sum(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq + self.steal
    }

    fn usage_since(&self, prev: &CpuTimes) -> CoreUsage {
        let elapsed = self.sum().saturating_sub(prev.sum());
        if elapsed == 0 {
            return CoreUsage::default();
        }
        let pct = |now: u64, before: u64| now.saturating_sub(before) as f64 * 100.0 / elapsed as f64;
        let idle = pct(self.idle, prev.idle);
        CoreUsage {
            total: 100.0 - idle,
            user: pct(self.user, prev.user),
            kernel: pct(self.system, prev.system),
            nice: pct(self.nice, prev.nice),
            idle,
            wait: pct(self.iowait, prev.iowait),
        }
    }
}

/// Reads `/proc`
#[derive(Default)]
pub struct ProcHostStats {
    previous: Mutex<Option<(CpuTimes, Vec<CpuTimes>)>>,
}

impl ProcHostStats {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostStats for ProcHostStats {
    fn memory(&self) -> Result<MemoryUsage> {
        let contents = fs::read_to_string(MEMINFO_PATH).map_err(|e| PmonError::FileRead {
            path: MEMINFO_PATH.into(),
            source: e,
        })?;
        parse_meminfo(&contents)
    }

    fn cpu(&self) -> Result<CpuUsage> {
        let contents = fs::read_to_string(STAT_PATH).map_err(|e| PmonError::FileRead {
            path: STAT_PATH.into(),
            source: e,
        })?;
        let (total, cores) = parse_stat(&contents)?;

        let mut previous = self.previous.lock();
        let zero = CpuTimes::default();
        let usage = match previous.as_ref() {
            Some((prev_total, prev_cores)) => CpuUsage {
                total_percent: total.usage_since(prev_total).total,
                cores: cores
                    .iter()
                    .enumerate()
                    .map(|(i, core)| core.usage_since(prev_cores.get(i).unwrap_or(&zero)))
                    .collect(),
            },
            None => CpuUsage {
                total_percent: total.usage_since(&zero).total,
                cores: cores.iter().map(|core| core.usage_since(&zero)).collect(),
            },
        };
        *previous = Some((total, cores));
        Ok(usage)
    }
}

/// Parse a meminfo line like "MemTotal:       16384000 kB"
fn meminfo_kb(line: &str) -> Option<u64> {
    line.split_whitespace().nth(1)?.parse().ok()
}

fn parse_meminfo(contents: &str) -> Result<MemoryUsage> {
    let mut total = None;
    let mut available = None;
    for line in contents.lines() {
        if line.starts_with("MemTotal:") {
            total = meminfo_kb(line);
        } else if line.starts_with("MemAvailable:") {
            available = meminfo_kb(line);
        }
    }

    let (Some(total), Some(available)) = (total, available) else {
        return Err(PmonError::generic("meminfo lacks MemTotal or MemAvailable"));
    };
    if total == 0 {
        return Err(PmonError::generic("meminfo reports zero memory"));
    }

    let utilized = total.saturating_sub(available);
    Ok(MemoryUsage {
        utilized_bytes: utilized * BYTES_PER_KB,
        available_bytes: available * BYTES_PER_KB,
        percent: (utilized as f64 * 100.0 / total as f64) as f32,
    })
}

fn parse_cpu_line(line: &str) -> Option<CpuTimes> {
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|v| v.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    let at = |i: usize| values.get(i).copied().unwrap_or(0);
    if values.len() < 4 {
        return None;
    }
    Some(CpuTimes {
        user: at(0),
        nice: at(1),
        system: at(2),
        idle: at(3),
        iowait: at(4),
        irq: at(5),
        softirq: at(6),
        steal: at(7),
    })
}

/// Aggregate line and per-core lines of `/proc/stat`
fn parse_stat(contents: &str) -> Result<(CpuTimes, Vec<CpuTimes>)> {
    let mut total = None;
    let mut cores = Vec::new();
    for line in contents.lines() {
        if line.starts_with("cpu ") {
            total = parse_cpu_line(line);
        } else if line.starts_with("cpu") {
            if let Some(times) = parse_cpu_line(line) {
                cores.push(times);
            }
        }
    }
    total
        .map(|total| (total, cores))
        .ok_or_else(|| PmonError::generic("/proc/stat lacks the cpu line"))
}

// ============================================================================
// Fixed implementation
// ============================================================================

/// Host statistics that report fixed values
#[derive(Default)]
pub struct FixedHostStats {
    memory: Mutex<Option<MemoryUsage>>,
    cpu: Mutex<CpuUsage>,
}

impl FixedHostStats {
    pub fn new(memory: MemoryUsage, cpu: CpuUsage) -> Self {
        Self {
            memory: Mutex::new(Some(memory)),
            cpu: Mutex::new(cpu),
        }
    }

    pub fn set_memory_percent(&self, percent: f32) {
        let mut memory = self.memory.lock();
        let total: u64 = 8 * 1024 * 1024 * 1024;
        let utilized = (total as f64 * percent as f64 / 100.0) as u64;
        *memory = Some(MemoryUsage {
            utilized_bytes: utilized,
            available_bytes: total - utilized,
            percent,
        });
    }
}

impl HostStats for FixedHostStats {
    fn memory(&self) -> Result<MemoryUsage> {
        (*self.memory.lock()).ok_or_else(|| PmonError::generic("memory usage not set"))
    }

    fn cpu(&self) -> Result<CpuUsage> {
        Ok(self.cpu.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "MemTotal:       1000 kB\nMemFree:         100 kB\nMemAvailable:    250 kB\n";

    const STAT_A: &str = "cpu  100 0 50 850 0 0 0 0 0 0\ncpu0 50 0 25 425 0 0 0 0 0 0\ncpu1 50 0 25 425 0 0 0 0 0 0\nintr 1\n";
    const STAT_B: &str = "cpu  160 0 90 950 0 0 0 0 0 0\ncpu0 110 0 50 440 0 0 0 0 0 0\ncpu1 50 0 40 510 0 0 0 0 0 0\nintr 2\n";

    #[test]
    fn test_parse_meminfo() {
        let mem = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(mem.utilized_bytes, 750 * 1024);
        assert_eq!(mem.available_bytes, 250 * 1024);
        assert!((mem.percent - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_meminfo_requires_fields() {
        assert!(parse_meminfo("MemTotal: 1000 kB\n").is_err());
    }

    #[test]
    fn test_cpu_delta() {
        let (total_a, cores_a) = parse_stat(STAT_A).unwrap();
        let (total_b, cores_b) = parse_stat(STAT_B).unwrap();
        assert_eq!(cores_a.len(), 2);

        // 200 jiffies elapsed in aggregate, 100 of them idle
        let usage = total_b.usage_since(&total_a);
        assert!((usage.total - 50.0).abs() < 0.01);

        // core0: 100 elapsed, 15 idle, 60 user, 25 system
        let core0 = cores_b[0].usage_since(&cores_a[0]);
        assert!((core0.user - 60.0).abs() < 0.01);
        assert!((core0.kernel - 25.0).abs() < 0.01);
        assert!((core0.idle - 15.0).abs() < 0.01);
    }

    #[test]
    fn test_fixed_stats() {
        let stats = FixedHostStats::default();
        assert!(stats.memory().is_err());
        stats.set_memory_percent(85.0);
        assert!((stats.memory().unwrap().percent - 85.0).abs() < f32::EPSILON);
    }
}
