//! Rendering of ingested stats for stdout or an output file.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, StatError};
use crate::stat::{format_timestamp, Stat};

/// Output encodings accepted by `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One `Display` line per stat.
    Text,
    /// `process,metric,timestamp,value`, one row per sample.
    Csv,
    /// Pretty-printed JSON array of stats.
    Json,
}

impl OutputFormat {
    /// Parse a `--format` value. Unknown names fall back to [`OutputFormat::Text`].
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "csv" => Self::Csv,
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

#[derive(Serialize)]
struct StatRecord<'a> {
    process: &'a str,
    metric: &'a str,
    values: Vec<PointRecord>,
}

#[derive(Serialize)]
struct PointRecord {
    timestamp: Option<String>,
    value: f64,
}

/// One line per stat using its `Display` form.
///
/// # Examples
///
/// ```
/// use perfstat_core::formatting::render_text;
/// use perfstat_core::stat::Stat;
///
/// let mut stat = Stat::new("app", "CPU").unwrap();
/// stat.add_value(None, 1.5);
/// assert_eq!(
///     render_text(&[stat]),
///     "Stat [process=app metric=CPU values=[unset=1.5]]\n"
/// );
/// ```
pub fn render_text(stats: &[Stat]) -> String {
    let mut out = String::new();
    for stat in stats {
        out.push_str(&stat.to_string());
        out.push('\n');
    }
    out
}

/// Long-form CSV with a header row. The unset timestamp is written as an
/// empty cell.
pub fn render_csv(stats: &[Stat]) -> String {
    let mut out = String::from("process,metric,timestamp,value\n");
    for stat in stats {
        for (ts, value) in stat.values() {
            let ts = if ts.is_some() {
                format_timestamp(ts)
            } else {
                String::new()
            };
            out.push_str(&format!(
                "{},{},{},{}\n",
                csv_field(stat.process()),
                csv_field(stat.metric()),
                ts,
                value
            ));
        }
    }
    out
}

pub fn render_json(stats: &[Stat]) -> Result<String> {
    let records: Vec<StatRecord<'_>> = stats
        .iter()
        .map(|stat| StatRecord {
            process: stat.process(),
            metric: stat.metric(),
            values: stat
                .values()
                .iter()
                .map(|(ts, value)| PointRecord {
                    timestamp: ts.is_some().then(|| format_timestamp(ts)),
                    value: *value,
                })
                .collect(),
        })
        .collect();
    serde_json::to_string_pretty(&records).map_err(|e| StatError::Other(e.into()))
}

pub fn render(stats: &[Stat], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(stats)),
        OutputFormat::Csv => Ok(render_csv(stats)),
        OutputFormat::Json => render_json(stats),
    }
}

/// Render `stats` and write them to `path`, or to stdout when `path` is `None`.
pub fn write_output(stats: &[Stat], format: OutputFormat, path: Option<&Path>) -> Result<()> {
    let rendered = render(stats, format)?;
    match path {
        Some(path) => {
            std::fs::write(path, rendered)?;
            tracing::info!("Wrote {} stats to {}", stats.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            lock.write_all(rendered.as_bytes())?;
            lock.flush()?;
        }
    }
    Ok(())
}

/// Quote a CSV cell when it contains a separator, quote or newline.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
