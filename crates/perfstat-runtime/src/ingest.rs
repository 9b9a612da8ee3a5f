//! The two ingestion strategies a caller chooses between.
//!
//! Each strategy checks its own platform precondition before doing any
//! work: static ingestion of a `.blg` needs the Windows-only converter, live
//! ingestion needs the Unix-only sampler. Already converted `.csv` logs
//! parse anywhere.

use std::path::Path;

use perfstat_core::error::Result;
use perfstat_core::settings::MalformedSamplePolicy;
use perfstat_core::stat::Stat;
use perfstat_core::time_utils::TimestampParser;
use perfstat_data::counter_log::{classify_input, load_counter_csv, LogFormat};
use tokio::sync::mpsc;

use crate::converter::{converter_available, RelogConverter};
use crate::sampler::{sampler_available, CollectorHandle, LiveCollector, LiveUpdate};

/// Precondition for ingesting a counter log of `format` on this platform.
pub fn static_availability(format: LogFormat) -> Result<()> {
    match format {
        LogFormat::Csv => Ok(()),
        LogFormat::Blg => converter_available(),
    }
}

/// Precondition for live ingestion on this platform.
pub fn live_availability() -> Result<()> {
    sampler_available()
}

/// Ingest a recorded counter log in full.
///
/// The input is validated before anything runs. A `.blg` log is converted
/// into a temporary directory that is removed once parsing finishes.
pub async fn ingest_counter_log(path: &Path, timestamps: &TimestampParser) -> Result<Vec<Stat>> {
    let format = classify_input(path)?;
    static_availability(format)?;

    match format {
        LogFormat::Csv => load_counter_csv(path, timestamps),
        LogFormat::Blg => ingest_blg_with(&RelogConverter::new(), path, timestamps).await,
    }
}

/// Convert `path` with `converter` and parse the result.
pub async fn ingest_blg_with(
    converter: &RelogConverter,
    path: &Path,
    timestamps: &TimestampParser,
) -> Result<Vec<Stat>> {
    let work_dir = tempfile::tempdir()?;
    let csv = converter.convert(path, work_dir.path()).await?;
    load_counter_csv(&csv, timestamps)
}

/// Start live ingestion from `pidstat` sampling every `interval` seconds.
pub fn start_live(
    interval: u32,
    policy: MalformedSamplePolicy,
) -> Result<(mpsc::Receiver<LiveUpdate>, CollectorHandle)> {
    live_availability()?;
    LiveCollector::new(policy).start_pidstat(interval)
}
