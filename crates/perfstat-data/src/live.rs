//! Live sampler feed ingestion.
//!
//! Parses the line-per-process output of `pidstat -d -r -u -h <interval>`
//! and folds each sample into three stats per process: `CPU` (`%CPU`),
//! `RAM` (`%MEM`) and `HDD` (read + write + cancelled-write kB/s).
//!
//! The feed mixes banner, header and blank lines with samples. Any line
//! whose timestamp token is not an integer is not a sample and is skipped.
//! A sample whose numeric fields do not parse is an error; no value is
//! made up for it.

use std::io::BufRead;

use chrono::{DateTime, Utc};
use perfstat_core::error::{Result, StatError};
use perfstat_core::registry::StatRegistry;
use perfstat_core::settings::MalformedSamplePolicy;
use perfstat_core::stat::Stat;
use perfstat_core::time_utils::from_epoch_seconds;
use tracing::{debug, warn};

use crate::lines::read_lossy_line;

pub const CPU_METRIC: &str = "CPU";
pub const RAM_METRIC: &str = "RAM";
pub const HDD_METRIC: &str = "HDD";

// ── ColumnLayout ──────────────────────────────────────────────────────────────

/// Token positions of the fields a sample is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub time: usize,
    pub cpu: usize,
    pub mem: usize,
    /// `kB_rd/s`, `kB_wr/s`, `kB_ccwr/s`.
    pub disk: [usize; 3],
    pub command: usize,
}

impl Default for ColumnLayout {
    /// Classic sysstat `-h` columns:
    /// `Time PID %usr %system %guest %CPU CPU minflt/s majflt/s VSZ RSS %MEM
    /// kB_rd/s kB_wr/s kB_ccwr/s Command`.
    fn default() -> Self {
        Self {
            time: 0,
            cpu: 5,
            mem: 11,
            disk: [12, 13, 14],
            command: 15,
        }
    }
}

impl ColumnLayout {
    /// Derive a layout from a `#`-prefixed pidstat header line.
    ///
    /// Returns `None` unless every required column is named.
    pub fn from_header(line: &str) -> Option<Self> {
        let body = line.trim_start().strip_prefix('#')?;
        let names: Vec<&str> = body.split_whitespace().collect();
        let find = |name: &str| names.iter().position(|n| *n == name);

        Some(Self {
            time: find("Time")?,
            cpu: find("%CPU")?,
            mem: find("%MEM")?,
            disk: [find("kB_rd/s")?, find("kB_wr/s")?, find("kB_ccwr/s")?],
            command: find("Command")?,
        })
    }

    /// Number of tokens a sample line needs for every position to exist.
    pub fn min_tokens(&self) -> usize {
        [self.time, self.cpu, self.mem, self.command]
            .into_iter()
            .chain(self.disk)
            .max()
            .unwrap_or(0)
            + 1
    }
}

// ── LiveSample ────────────────────────────────────────────────────────────────

/// One parsed sample line.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSample {
    pub timestamp: DateTime<Utc>,
    pub process: String,
    pub cpu: f64,
    pub ram: f64,
    /// Sum of the three disk-rate fields.
    pub disk: f64,
}

/// Parse one feed line against `layout`.
///
/// Returns `Ok(None)` for lines that are not samples and
/// [`StatError::MalformedSample`] for sample lines that are too short or
/// carry non-numeric fields. `line_no` is only used for error context.
pub fn parse_sample(line: &str, line_no: u64, layout: &ColumnLayout) -> Result<Option<LiveSample>> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let Some(secs) = tokens
        .get(layout.time)
        .and_then(|t| t.parse::<i64>().ok())
    else {
        return Ok(None);
    };

    if tokens.len() < layout.min_tokens() {
        return Err(StatError::MalformedSample {
            line: line_no,
            reason: format!(
                "expected at least {} fields, found {}",
                layout.min_tokens(),
                tokens.len()
            ),
        });
    }

    let timestamp = from_epoch_seconds(secs).ok_or_else(|| StatError::MalformedSample {
        line: line_no,
        reason: format!("timestamp {} is out of range", secs),
    })?;

    let field = |idx: usize, name: &str| -> Result<f64> {
        let raw = tokens[idx];
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(StatError::MalformedSample {
                line: line_no,
                reason: format!("{} is not a number: {:?}", name, raw),
            }),
        }
    };

    let cpu = field(layout.cpu, "%CPU")?;
    let ram = field(layout.mem, "%MEM")?;
    let disk = field(layout.disk[0], "kB_rd/s")?
        + field(layout.disk[1], "kB_wr/s")?
        + field(layout.disk[2], "kB_ccwr/s")?;

    Ok(Some(LiveSample {
        timestamp,
        process: tokens[layout.command].to_string(),
        cpu,
        ram,
        disk,
    }))
}

// ── LiveSampleParser ──────────────────────────────────────────────────────────

/// Incremental parser that owns the stats built from a live feed.
///
/// After every [`apply_line`](Self::apply_line) call, [`stats`](Self::stats)
/// reflects all samples seen so far.
#[derive(Debug, Default)]
pub struct LiveSampleParser {
    registry: StatRegistry,
    layout: ColumnLayout,
    lines_read: u64,
    samples_applied: u64,
    samples_skipped: u64,
}

impl LiveSampleParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one feed line.
    ///
    /// Header lines update the column layout. Samples are recorded under
    /// their process's `CPU`, `RAM` and `HDD` stats and returned.
    pub fn apply_line(&mut self, line: &str) -> Result<Option<LiveSample>> {
        self.lines_read += 1;

        if line.trim_start().starts_with('#') {
            match ColumnLayout::from_header(line) {
                Some(layout) => {
                    if layout != self.layout {
                        debug!(?layout, "pidstat column layout updated from header");
                    }
                    self.layout = layout;
                }
                None => debug!("ignoring header without the expected columns: {}", line.trim()),
            }
            return Ok(None);
        }

        let Some(sample) = parse_sample(line, self.lines_read, &self.layout)? else {
            return Ok(None);
        };
        self.apply_sample(&sample)?;
        Ok(Some(sample))
    }

    fn apply_sample(&mut self, sample: &LiveSample) -> Result<()> {
        let ts = Some(sample.timestamp);
        for (metric, value) in [
            (CPU_METRIC, sample.cpu),
            (RAM_METRIC, sample.ram),
            (HDD_METRIC, sample.disk),
        ] {
            self.registry
                .find_or_create(&sample.process, metric)?
                .add_value(ts, value);
        }
        self.samples_applied += 1;
        Ok(())
    }

    /// Record a malformed-sample error according to `policy`.
    ///
    /// Returns the error back under [`MalformedSamplePolicy::Abort`]; other
    /// errors are always returned.
    pub fn handle_error(&mut self, err: StatError, policy: MalformedSamplePolicy) -> Result<()> {
        match (err, policy) {
            (err @ StatError::MalformedSample { .. }, MalformedSamplePolicy::Skip) => {
                self.samples_skipped += 1;
                warn!("Skipping sample: {}", err);
                Ok(())
            }
            (err, _) => Err(err),
        }
    }

    /// Read `reader` to end of stream one line at a time, applying every
    /// line. Bytes that are not UTF-8 are replaced before parsing; I/O errors
    /// are returned as-is. Returns the number of samples applied during this
    /// call.
    pub fn consume<R: BufRead>(&mut self, mut reader: R, policy: MalformedSamplePolicy) -> Result<u64> {
        let before = self.samples_applied;
        let mut buf = Vec::new();
        while let Some(line) = read_lossy_line(&mut reader, &mut buf)? {
            if let Err(err) = self.apply_line(&line) {
                self.handle_error(err, policy)?;
            }
        }
        Ok(self.samples_applied - before)
    }

    pub fn stats(&self) -> &[Stat] {
        self.registry.stats()
    }

    pub fn registry(&self) -> &StatRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> Vec<Stat> {
        self.registry.snapshot()
    }

    pub fn into_stats(self) -> Vec<Stat> {
        self.registry.into_stats()
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn samples_applied(&self) -> u64 {
        self.samples_applied
    }

    pub fn samples_skipped(&self) -> u64 {
        self.samples_skipped
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
