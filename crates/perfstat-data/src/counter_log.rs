//! Counter-log (relog CSV) ingestion.
//!
//! A converted counter log is a CSV whose header names one performance
//! counter per column (`\\HOST\Process(name)\Metric`) and whose rows carry a
//! wall-clock timestamp followed by one sample per counter. Header problems
//! are fatal for the whole file; bad timestamps and bad cells in data rows
//! are recovered with defaults and logged.

use std::io::BufRead;
use std::path::Path;

use perfstat_core::error::{Result, StatError};
use perfstat_core::registry::StatRegistry;
use perfstat_core::stat::{Stat, Timestamp};
use perfstat_core::time_utils::{strip_quotes, TimestampParser};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::lines::read_lossy_line;

// ── Input classification ──────────────────────────────────────────────────────

/// Offline formats the static ingestion path accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Binary performance log; must be converted to CSV before parsing.
    Blg,
    /// Counter log already converted to CSV.
    Csv,
}

/// Check that `path` is a usable, non-empty file of a supported format.
///
/// Runs before any parsing so an unusable source never yields a partial
/// result.
pub fn classify_input(path: &Path) -> Result<LogFormat> {
    let metadata = std::fs::metadata(path).map_err(|e| StatError::InvalidInput {
        path: path.to_path_buf(),
        reason: format!("cannot access file: {}", e),
    })?;
    if !metadata.is_file() {
        return Err(StatError::InvalidInput {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    if metadata.len() == 0 {
        return Err(StatError::InvalidInput {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "blg" => Ok(LogFormat::Blg),
        "csv" => Ok(LogFormat::Csv),
        _ => Err(StatError::UnsupportedFormat(format!(
            "{}: only binary counter logs (.blg) and converted counter CSV files (.csv) are supported",
            path.display()
        ))),
    }
}

// ── Header parsing ────────────────────────────────────────────────────────────

/// Process and metric named by one counter column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterColumn {
    pub process: String,
    pub metric: String,
}

fn process_pattern() -> Regex {
    Regex::new(r"\(([^)]+)\)").expect("regex is valid")
}

/// Parse one header cell. `column` is the cell's position in the header
/// row and is only used for error context.
///
/// The process is the content of the first parenthesized group and the
/// metric is everything after the last `\`.
pub fn parse_header_column(column: usize, raw: &str) -> Result<CounterColumn> {
    parse_header_column_with(&process_pattern(), column, raw)
}

fn parse_header_column_with(pattern: &Regex, column: usize, raw: &str) -> Result<CounterColumn> {
    let header = strip_quotes(raw);
    let malformed = |reason: &str| StatError::MalformedHeader {
        column,
        header: header.to_string(),
        reason: reason.to_string(),
    };

    let process = pattern
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| malformed("no parenthesized process name"))?;

    let metric = header.rsplit('\\').next().unwrap_or_default();
    if metric.is_empty() {
        return Err(malformed("no metric name after the last path separator"));
    }

    Ok(CounterColumn {
        process,
        metric: metric.to_string(),
    })
}

/// Parse a header row into its counter columns, skipping the leading
/// timestamp column. Any unparseable column fails the whole header.
pub fn parse_header(line: &str) -> Result<Vec<CounterColumn>> {
    let pattern = process_pattern();
    let line = line.trim_start_matches('\u{feff}').trim_end_matches('\r');
    split_row(line)
        .into_iter()
        .enumerate()
        .skip(1)
        .map(|(column, raw)| parse_header_column_with(&pattern, column, raw))
        .collect()
}

// ── Row parsing ───────────────────────────────────────────────────────────────

/// Split a CSV line on commas that are not inside double quotes.
pub fn split_row(line: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cells.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    cells.push(&line[start..]);
    cells
}

/// Parse a sample cell, resolving gaps and garbage to `0.0`.
pub fn parse_cell_value(raw: &str) -> f64 {
    match strip_quotes(raw).parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Parse a converted counter log from `reader`.
///
/// `source` names the input in errors and logs. Returns one stat per
/// distinct header (process, metric) pair in header order, each holding one
/// entry per data row.
pub fn parse_counter_csv<R: BufRead>(
    mut reader: R,
    source: &Path,
    timestamps: &TimestampParser,
) -> Result<Vec<Stat>> {
    let mut buf = Vec::new();
    let mut line_no = 1u64;
    let read_error = |line: u64, err: std::io::Error| StatError::ReadLine {
        path: source.to_path_buf(),
        line,
        source: err,
    };

    let header_line = match read_lossy_line(&mut reader, &mut buf)
        .map_err(|e| read_error(line_no, e))?
    {
        Some(line) => line,
        None => {
            return Err(StatError::InvalidInput {
                path: source.to_path_buf(),
                reason: "no header line".to_string(),
            })
        }
    };
    let columns = parse_header(&header_line)?;

    let mut registry = StatRegistry::new();
    let mut targets = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let known = registry.len();
        let idx = registry.position_or_insert(&column.process, &column.metric)?;
        if idx < known {
            warn!(
                "Header column {} repeats {}\\{}; its samples share one stat",
                i + 1,
                column.process,
                column.metric
            );
        }
        targets.push(idx);
    }

    let mut rows = 0u64;
    let mut recovered_cells = 0u64;
    loop {
        line_no += 1;
        let next = read_lossy_line(&mut reader, &mut buf).map_err(|e| read_error(line_no, e))?;
        let Some(line) = next else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let cells = split_row(&line);

        let timestamp: Timestamp = timestamps.parse_counter_time(cells[0]);
        if timestamp.is_none() {
            warn!(
                "Could not parse timestamp {:?} on line {} of {}; using unset timestamp",
                cells[0],
                line_no,
                source.display()
            );
        }

        for (col, &idx) in targets.iter().enumerate() {
            let raw = cells.get(col + 1).copied().unwrap_or_default();
            let value = parse_cell_value(raw);
            if value == 0.0 && !is_zero_literal(raw) {
                recovered_cells += 1;
                debug!(
                    "Line {} column {}: no sample in {:?}, recorded 0.0",
                    line_no,
                    col + 1,
                    raw
                );
            }
            if let Some(stat) = registry.get_mut_at(idx) {
                stat.add_value(timestamp, value);
            }
        }
        rows += 1;
    }

    info!(
        "Parsed {} rows into {} stats from {} ({} empty or invalid cells)",
        rows,
        registry.len(),
        source.display(),
        recovered_cells
    );

    Ok(registry.into_stats())
}

/// Open and parse a converted counter-log CSV file.
pub fn load_counter_csv(path: &Path, timestamps: &TimestampParser) -> Result<Vec<Stat>> {
    let file = std::fs::File::open(path).map_err(|source| StatError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_counter_csv(std::io::BufReader::new(file), path, timestamps)
}

fn is_zero_literal(raw: &str) -> bool {
    matches!(strip_quotes(raw).parse::<f64>(), Ok(v) if v == 0.0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const HEADER: &str = r"\\HOST\Process(app)\% CPU,\\HOST\Process(app)\RAM";

    fn parse(text: &str) -> Result<Vec<Stat>> {
        parse_counter_csv(
            std::io::Cursor::new(text.to_string()),
            Path::new("test.csv"),
            &TimestampParser::default(),
        )
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    // ── classify_input ────────────────────────────────────────────────────────

    #[test]
    fn test_classify_missing_file() {
        let err = classify_input(Path::new("/tmp/perfstat-missing-xyz.blg")).unwrap_err();
        assert!(matches!(err, StatError::InvalidInput { .. }));
    }

    #[test]
    fn test_classify_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "empty.blg", "");
        let err = classify_input(&path).unwrap_err();
        assert!(err.to_string().contains("file is empty"));
    }

    #[test]
    fn test_classify_directory() {
        let dir = TempDir::new().unwrap();
        let err = classify_input(dir.path()).unwrap_err();
        assert!(matches!(err, StatError::InvalidInput { .. }));
    }

    #[test]
    fn test_classify_supported_extensions() {
        let dir = TempDir::new().unwrap();
        let blg = write_file(dir.path(), "run.BLG", "x");
        let csv = write_file(dir.path(), "run.csv", "x");
        assert_eq!(classify_input(&blg).unwrap(), LogFormat::Blg);
        assert_eq!(classify_input(&csv).unwrap(), LogFormat::Csv);
    }

    #[test]
    fn test_classify_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "run.tsv", "x");
        let err = classify_input(&path).unwrap_err();
        assert!(matches!(err, StatError::UnsupportedFormat(_)));
        assert!(err.to_string().contains(".blg"));
    }

    // ── Header parsing ────────────────────────────────────────────────────────

    #[test]
    fn test_header_column_extracts_process_and_metric() {
        let col = parse_header_column(1, r"\\HOST\Process(app)\% CPU").unwrap();
        assert_eq!(col.process, "app");
        assert_eq!(col.metric, "% CPU");
    }

    #[test]
    fn test_header_column_independent_of_path_depth() {
        for raw in [
            r"Process(app)\Working Set",
            r"\Process(app)\Working Set",
            r"\\HOST\Process(app)\Working Set",
            r"\\HOST\a\b\c\Process(app)\Working Set",
        ] {
            let col = parse_header_column(1, raw).unwrap();
            assert_eq!(col.process, "app", "{}", raw);
            assert_eq!(col.metric, "Working Set", "{}", raw);
        }
    }

    #[test]
    fn test_header_column_strips_quotes() {
        let col = parse_header_column(3, r#""\\HOST\Process(svchost#2)\IO Data Bytes/sec""#).unwrap();
        assert_eq!(col.process, "svchost#2");
        assert_eq!(col.metric, "IO Data Bytes/sec");
    }

    #[test]
    fn test_header_column_uses_first_parenthesized_group() {
        let col = parse_header_column(1, r"\\HOST\Process(app)\Bytes (peak)").unwrap();
        assert_eq!(col.process, "app");
        assert_eq!(col.metric, "Bytes (peak)");
    }

    #[test]
    fn test_header_column_without_parenthesis_is_malformed() {
        let err = parse_header_column(2, r"\\HOST\Memory\Available MBytes").unwrap_err();
        match err {
            StatError::MalformedHeader { column, header, .. } => {
                assert_eq!(column, 2);
                assert_eq!(header, r"\\HOST\Memory\Available MBytes");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_header_column_with_empty_parenthesis_is_malformed() {
        assert!(parse_header_column(1, r"\\HOST\Process()\RAM").is_err());
    }

    #[test]
    fn test_header_column_with_trailing_separator_is_malformed() {
        assert!(parse_header_column(1, r"\\HOST\Process(app)\").is_err());
    }

    #[test]
    fn test_parse_header_skips_timestamp_column() {
        let line = format!(
            "\u{feff}\"(PDH-CSV 4.0) (Eastern Standard Time)(300)\",{}\r",
            HEADER
        );
        let cols = parse_header(&line).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[1].metric, "RAM");
    }

    // ── Row parsing ───────────────────────────────────────────────────────────

    #[test]
    fn test_split_row_respects_quotes() {
        assert_eq!(split_row(r#""a,b",1,"""#), vec![r#""a,b""#, "1", r#""""#]);
        assert_eq!(split_row(""), vec![""]);
    }

    #[test]
    fn test_parse_cell_value_lenient() {
        assert_eq!(parse_cell_value("\"12.5\""), 12.5);
        assert_eq!(parse_cell_value("\"\""), 0.0);
        assert_eq!(parse_cell_value(""), 0.0);
        assert_eq!(parse_cell_value(" "), 0.0);
        assert_eq!(parse_cell_value("\"n/a\""), 0.0);
        assert_eq!(parse_cell_value("NaN"), 0.0);
        assert_eq!(parse_cell_value("inf"), 0.0);
    }

    // ── parse_counter_csv ─────────────────────────────────────────────────────

    #[test]
    fn test_parse_end_to_end() {
        let text = format!(
            "\"(PDH-CSV 4.0)\",{}\n\
             \"12/05/2013 19:40:44.951\",\"12.5\",\"256\"\n\
             \"12/05/2013 19:40:45.951\",\"\",\"300\"\n",
            HEADER
        );
        let stats = parse(&text).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].process(), "app");
        assert_eq!(stats[0].metric(), "% CPU");
        assert_eq!(stats[1].process(), "app");
        assert_eq!(stats[1].metric(), "RAM");

        let cpu: Vec<f64> = stats[0].values().values().cloned().collect();
        let ram: Vec<f64> = stats[1].values().values().cloned().collect();
        assert_eq!(cpu, vec![12.5, 0.0]);
        assert_eq!(ram, vec![256.0, 300.0]);

        let first = stats[0].values().keys().next().unwrap().unwrap();
        assert_eq!(first.timestamp(), 1_386_272_444);
    }

    #[test]
    fn test_parse_bad_timestamp_uses_unset() {
        let text = format!("Time,{}\n\"garbage\",\"1\",\"2\"\n", HEADER);
        let stats = parse(&text).unwrap();
        assert_eq!(stats[0].values().get(&None), Some(&1.0));
        assert_eq!(stats[1].values().get(&None), Some(&2.0));
    }

    #[test]
    fn test_parse_short_row_fills_zero() {
        let text = format!("Time,{}\n\"12/05/2013 19:40:44.951\",\"7\"\n", HEADER);
        let stats = parse(&text).unwrap();
        assert_eq!(stats[0].values().values().next(), Some(&7.0));
        assert_eq!(stats[1].values().values().next(), Some(&0.0));
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let text = format!(
            "Time,{}\r\n\r\n\"12/05/2013 19:40:44.951\",\"1\",\"2\"\r\n\n",
            HEADER
        );
        let stats = parse(&text).unwrap();
        assert_eq!(stats[0].len(), 1);
    }

    #[test]
    fn test_parse_malformed_header_returns_no_stats() {
        let text = "Time,\\\\HOST\\Memory\\Available\n\"12/05/2013 19:40:44.951\",\"1\"\n";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, StatError::MalformedHeader { column: 1, .. }));
    }

    #[test]
    fn test_parse_empty_source_is_invalid_input() {
        assert!(matches!(parse("").unwrap_err(), StatError::InvalidInput { .. }));
    }

    #[test]
    fn test_parse_header_only() {
        let stats = parse(&format!("Time,{}\n", HEADER)).unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn test_parse_duplicate_columns_share_a_stat() {
        let text = "Time,\\\\A\\Process(app)\\RAM,\\\\B\\Process(APP)\\RAM\n\
                    \"12/05/2013 19:40:44.951\",\"1\",\"2\"\n";
        let stats = parse(text).unwrap();
        assert_eq!(stats.len(), 1);
        // Later column wins for the shared timestamp.
        assert_eq!(stats[0].values().values().next(), Some(&2.0));
    }

    #[test]
    fn test_parse_invalid_utf8_cell_recovers() {
        let mut bytes = b"Time,\\\\HOST\\Process(app)\\RAM\n".to_vec();
        bytes.extend_from_slice(b"\"12/05/2013 19:40:44.000\",\"1\"\n");
        bytes.extend_from_slice(b"\"12/05/2013 19:40:45.000\",\"\xe9\"\n");
        bytes.extend_from_slice(b"\"12/05/2013 19:40:46.000\",\"3\"\n");

        let stats = parse_counter_csv(
            std::io::Cursor::new(bytes),
            Path::new("test.csv"),
            &TimestampParser::default(),
        )
        .unwrap();

        let values: Vec<f64> = stats[0].values().values().cloned().collect();
        assert_eq!(values, vec![1.0, 0.0, 3.0]);
    }

    #[test]
    fn test_parse_non_utf8_process_name() {
        let mut bytes = b"Time,\\\\HOST\\Process(caf\xe9)\\RAM\n".to_vec();
        bytes.extend_from_slice(b"\"12/05/2013 19:40:44.000\",\"7\"\n");

        let stats = parse_counter_csv(
            std::io::Cursor::new(bytes),
            Path::new("test.csv"),
            &TimestampParser::default(),
        )
        .unwrap();
        assert_eq!(stats[0].process(), "caf\u{FFFD}");
    }

    #[test]
    fn test_parse_read_failure_names_file_and_line() {
        struct FailsAfterHeader(bool);
        impl std::io::Read for FailsAfterHeader {
            fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
                if self.0 {
                    return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
                }
                self.0 = true;
                let header = b"Time,\\\\HOST\\Process(app)\\RAM\n";
                out[..header.len()].copy_from_slice(header);
                Ok(header.len())
            }
        }

        let err = parse_counter_csv(
            std::io::BufReader::new(FailsAfterHeader(false)),
            Path::new("run.csv"),
            &TimestampParser::default(),
        )
        .unwrap_err();
        match err {
            StatError::ReadLine { path, line, .. } => {
                assert_eq!(path, Path::new("run.csv"));
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_counter_csv_from_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "run.csv",
            &format!("Time,{}\n\"12/05/2013 19:40:44.951\",\"3\",\"4\"\n", HEADER),
        );
        let stats = load_counter_csv(&path, &TimestampParser::default()).unwrap();
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn test_load_counter_csv_missing_file() {
        let err = load_counter_csv(
            Path::new("/tmp/perfstat-missing-xyz.csv"),
            &TimestampParser::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StatError::FileRead { .. }));
    }
}
