//! The normalized time-series model shared by every ingestion path.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{Result, StatError};

/// Sample timestamp. `None` is the unset timestamp a counter-log row falls
/// back to when its time column cannot be parsed; it sorts before every
/// real instant.
pub type Timestamp = Option<DateTime<Utc>>;

/// Lookup identity of a [`Stat`]: lowercased process plus metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatKey {
    pub process: String,
    pub metric: String,
}

impl StatKey {
    pub fn new(process: &str, metric: &str) -> Self {
        Self {
            process: process.to_lowercase(),
            metric: metric.to_string(),
        }
    }
}

/// One metric's time series for one process.
#[derive(Debug, Clone, PartialEq)]
pub struct Stat {
    /// Process name as first observed (case preserved).
    process: String,
    /// Metric name, e.g. `CPU` or a counter name from a log header.
    metric: String,
    /// Timestamp -> value, iterated in ascending timestamp order.
    series: BTreeMap<Timestamp, f64>,
}

impl Stat {
    /// Create an empty stat. Both names must be non-empty.
    pub fn new(process: impl Into<String>, metric: impl Into<String>) -> Result<Self> {
        let process = process.into();
        let metric = metric.into();
        if process.is_empty() {
            return Err(StatError::InvalidStat("process name is empty".to_string()));
        }
        if metric.is_empty() {
            return Err(StatError::InvalidStat(format!(
                "metric name is empty for process {}",
                process
            )));
        }
        Ok(Self {
            process,
            metric,
            series: BTreeMap::new(),
        })
    }

    /// Insert or overwrite the value recorded at `timestamp`.
    pub fn add_value(&mut self, timestamp: Timestamp, value: f64) {
        self.series.insert(timestamp, value);
    }

    pub fn values(&self) -> &BTreeMap<Timestamp, f64> {
        &self.series
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn key(&self) -> StatKey {
        StatKey::new(&self.process, &self.metric)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Render a timestamp the way stats print it.
pub fn format_timestamp(ts: &Timestamp) -> String {
    match ts {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => "unset".to_string(),
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stat [process={} metric={} values=[",
            self.process, self.metric
        )?;
        for (i, (ts, value)) in self.series.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", format_timestamp(ts), value)?;
        }
        f.write_str("]]")
    }
}
