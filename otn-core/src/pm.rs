//! Performance monitoring samples
//!
//! Instantaneous readings are rolled up into fixed windows of 15 minutes and
//! 24 hours. Every reading updates both windows.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::constants::{tables, timing};
use crate::data::store::{Fields, StateStore};
use crate::error::Result;

/// Rollup window length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PmPeriod {
    Min15,
    Hour24,
}

impl PmPeriod {
    pub const ALL: [PmPeriod; 2] = [PmPeriod::Min15, PmPeriod::Hour24];

    pub fn as_str(&self) -> &'static str {
        match self {
            PmPeriod::Min15 => "15min",
            PmPeriod::Hour24 => "24h",
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            PmPeriod::Min15 => timing::PM_WINDOW_15MIN,
            PmPeriod::Hour24 => timing::PM_WINDOW_24H,
        }
    }

    /// Start of the window containing `epoch_secs`
    pub fn window_start(&self, epoch_secs: u64) -> u64 {
        let len = self.window().as_secs();
        epoch_secs - epoch_secs % len
    }
}

impl fmt::Display for PmPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reading of one metric
#[derive(Debug, Clone, PartialEq)]
pub struct PmSample {
    pub table: String,
    pub name: String,
    pub metric: String,
    pub period: PmPeriod,
    pub value: f64,
}

impl PmSample {
    /// Counter row key: `"<table>:<name>_<metric>:<period>"`
    pub fn key(&self) -> String {
        format!("{}:{}_{}:{}", self.table, self.name, self.metric, self.period)
    }
}

/// Destination of PM samples
pub trait PmSink: Send + Sync {
    fn update(&self, sample: &PmSample) -> Result<()>;

    /// Drop every counter of a peripheral
    fn clear_by_name(&self, name: &str) -> Result<()>;
}

/// Feed one reading into both rollup windows
pub fn update_both(sink: &dyn PmSink, table: &str, name: &str, metric: &str, value: f64) -> Result<()> {
    for period in PmPeriod::ALL {
        sink.update(&PmSample {
            table: table.to_string(),
            name: name.to_string(),
            metric: metric.to_string(),
            period,
            value,
        })?;
    }
    Ok(())
}

mod counter_fields {
    pub const CURRENT: &str = "current";
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const AVERAGE: &str = "average";
    pub const COUNT: &str = "count";
    pub const START_TIME: &str = "start-time";
}

/// Running statistics of one window
#[derive(Debug, Clone, Copy, PartialEq)]
struct Window {
    start: u64,
    current: f64,
    min: f64,
    max: f64,
    average: f64,
    count: u64,
}

impl Window {
    fn open(start: u64, value: f64) -> Self {
        Self {
            start,
            current: value,
            min: value,
            max: value,
            average: value,
            count: 1,
        }
    }

    fn from_fields(fields: &Fields) -> Option<Self> {
        let num = |key: &str| fields.get(key).and_then(|v| v.parse::<f64>().ok());
        Some(Self {
            start: fields.get(counter_fields::START_TIME)?.parse().ok()?,
            current: num(counter_fields::CURRENT)?,
            min: num(counter_fields::MIN)?,
            max: num(counter_fields::MAX)?,
            average: num(counter_fields::AVERAGE)?,
            count: fields.get(counter_fields::COUNT)?.parse().ok()?,
        })
    }

    fn push(&mut self, value: f64) {
        self.current = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.average = (self.average * self.count as f64 + value) / (self.count + 1) as f64;
        self.count += 1;
    }

    fn to_fields(self) -> Vec<(&'static str, String)> {
        vec![
            (counter_fields::START_TIME, self.start.to_string()),
            (counter_fields::CURRENT, self.current.to_string()),
            (counter_fields::MIN, self.min.to_string()),
            (counter_fields::MAX, self.max.to_string()),
            (counter_fields::AVERAGE, self.average.to_string()),
            (counter_fields::COUNT, self.count.to_string()),
        ]
    }
}

/// PM sink persisting window statistics in the `COUNTERS` table
pub struct StorePmSink {
    store: Arc<dyn StateStore>,
    lock: Mutex<()>,
}

impl StorePmSink {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Apply a sample as if it arrived at `epoch_secs`
    pub fn update_at(&self, sample: &PmSample, epoch_secs: u64) -> Result<()> {
        let _guard = self.lock.lock();
        let key = sample.key();
        let start = sample.period.window_start(epoch_secs);

        let window = match self
            .store
            .get_entry(tables::COUNTERS, &key)?
            .as_ref()
            .and_then(Window::from_fields)
        {
            Some(mut window) if window.start == start => {
                window.push(sample.value);
                window
            }
            _ => Window::open(start, sample.value),
        };

        self.store.set(tables::COUNTERS, &key, &window.to_fields())
    }
}

impl PmSink for StorePmSink {
    fn update(&self, sample: &PmSample) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.update_at(sample, now)
    }

    fn clear_by_name(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let needle = format!(":{}_", name);
        for key in self.store.scan_keys(tables::COUNTERS, &needle)? {
            self.store.delete_entry(tables::COUNTERS, &key)?;
        }
        Ok(())
    }
}
