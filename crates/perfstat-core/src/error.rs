use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while ingesting performance counters.
#[derive(Error, Debug)]
pub enum StatError {
    /// The input source is missing, empty, or otherwise unusable.
    #[error("Invalid input {path}: {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// A recognised input variant that this build cannot ingest.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A counter-log header column does not name a process and metric.
    #[error("Malformed header in column {column} ({header:?}): {reason}")]
    MalformedHeader {
        column: usize,
        header: String,
        reason: String,
    },

    /// A live sample line carries a field that cannot be parsed.
    #[error("Malformed sample on line {line}: {reason}")]
    MalformedSample { line: u64, reason: String },

    /// A stat was constructed with an empty process or metric name.
    #[error("Invalid stat: {0}")]
    InvalidStat(String),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a file failed part way through.
    #[error("Failed to read {path} at line {line}: {source}")]
    ReadLine {
        path: PathBuf,
        line: u64,
        #[source]
        source: std::io::Error,
    },

    /// The external counter-log converter failed.
    #[error("Log conversion failed: {0}")]
    Converter(String),

    /// The external sampling process failed.
    #[error("Sampler failed: {0}")]
    Sampler(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the perfstat crates.
pub type Result<T> = std::result::Result<T, StatError>;
