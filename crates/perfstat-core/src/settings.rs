use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::time_utils::{resolve_timezone_name, TimestampParser};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Per-process CPU, memory and disk statistics from counter logs or live sampling
#[derive(Parser, Debug, Clone)]
#[command(
    name = "perfstat",
    about = "Per-process CPU, memory and disk statistics from counter logs or live sampling",
    version,
    group(ArgGroup::new("source").required(true).args(["input", "live"]))
)]
pub struct Settings {
    /// Counter log to ingest (.blg, or an already converted .csv)
    #[arg(short = 'i', long, env = "PERFSTAT_INPUT")]
    pub input: Option<PathBuf>,

    /// Sample running processes live with pidstat
    #[arg(long)]
    pub live: bool,

    /// Write results to this file instead of stdout
    #[arg(short = 'o', long, env = "PERFSTAT_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "text", value_parser = ["text", "csv", "json"])]
    pub format: String,

    /// Live sampling interval in seconds (1-3600)
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=3600))]
    pub interval: u32,

    /// Timezone of counter-log timestamps ("auto" uses the system zone)
    #[arg(long, default_value = "UTC", env = "PERFSTAT_TIMEZONE", value_parser = parse_timezone)]
    pub timezone: String,

    /// What to do with a live sample line whose numeric fields do not parse
    #[arg(long, default_value = "skip", value_parser = ["skip", "abort"])]
    pub on_malformed: String,

    /// Logging level
    #[arg(long, default_value = "INFO", env = "PERFSTAT_LOG_LEVEL", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path (logs go to stderr when absent)
    #[arg(long, env = "PERFSTAT_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Which ingestion strategy a run uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionMode {
    /// Parse a recorded counter log in full.
    Static(PathBuf),
    /// Follow a live sampler feed until it ends or is cancelled.
    Live,
}

/// How the live parser treats a sample line with unparseable numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedSamplePolicy {
    /// Log the line and keep reading.
    #[default]
    Skip,
    /// Stop ingestion with the error.
    Abort,
}

/// `--timezone` must be an IANA zone name or `auto`.
fn parse_timezone(name: &str) -> Result<String, String> {
    if TimestampParser::validate_timezone(name) {
        Ok(name.to_string())
    } else {
        Err(format!(
            "unknown timezone \"{}\" (expected an IANA name such as Europe/Berlin, or auto)",
            name
        ))
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments and resolve derived values.
    pub fn load() -> Self {
        Self::resolve(Settings::parse())
    }

    /// Same as [`load`] but accepts an explicit argument list, enabling
    /// unit-testing without spawning subprocesses.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Settings::try_parse_from(args).map(Self::resolve)
    }

    /// Resolve `"auto"` sentinel values and apply the `--debug` flag.
    fn resolve(mut settings: Settings) -> Settings {
        settings.timezone = resolve_timezone_name(&settings.timezone);

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }

    /// The ingestion strategy selected on the command line. `--input` wins
    /// when both are somehow present.
    pub fn mode(&self) -> IngestionMode {
        match &self.input {
            Some(path) => IngestionMode::Static(path.clone()),
            None => IngestionMode::Live,
        }
    }

    pub fn malformed_policy(&self) -> MalformedSamplePolicy {
        match self.on_malformed.as_str() {
            "abort" => MalformedSamplePolicy::Abort,
            _ => MalformedSamplePolicy::Skip,
        }
    }

    pub fn timestamp_parser(&self) -> TimestampParser {
        TimestampParser::new(&self.timezone)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
