mod bootstrap;

use std::path::Path;

use anyhow::{Context, Result};
use perfstat_core::formatting::{render_text, write_output, OutputFormat};
use perfstat_core::settings::{IngestionMode, Settings};
use perfstat_core::stat::Stat;
use perfstat_runtime::ingest::{ingest_counter_log, start_live};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("perfstat v{} starting", env!("CARGO_PKG_VERSION"));

    let stats = match settings.mode() {
        IngestionMode::Static(path) => {
            tracing::info!(
                "Ingesting counter log {} (timestamps in {})",
                path.display(),
                settings.timezone
            );
            ingest_counter_log(&path, &settings.timestamp_parser())
                .await
                .with_context(|| format!("ingesting {}", path.display()))?
        }
        IngestionMode::Live => {
            tracing::info!("Sampling live every {}s", settings.interval);
            run_live(&settings).await?
        }
    };

    let format = OutputFormat::from_name(&settings.format);
    write_output(&stats, format, settings.output.as_deref()).context("writing results")?;

    Ok(())
}

/// Follow the live sampler until its feed ends or Ctrl+C, returning the
/// final stats. Each update is printed as text when results go to stdout in
/// text form.
async fn run_live(settings: &Settings) -> Result<Vec<Stat>> {
    let (mut rx, mut handle) = start_live(settings.interval, settings.malformed_policy())
        .context("starting live sampler")?;
    let print_updates = prints_live_updates(
        settings.output.as_deref(),
        OutputFormat::from_name(&settings.format),
    );

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(update) => {
                    tracing::info!(
                        samples = update.samples,
                        stats = update.stats.len(),
                        "live update"
                    );
                    if print_updates {
                        print!("{}", render_text(&update.stats));
                    }
                }
                // The collector dropped its sender: the feed has ended.
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; stopping sampler");
                handle.stop();
                break;
            }
        }
    }

    // Nobody reads further updates; the collector must not wait on a full channel.
    drop(rx);
    handle.join().await.context("live sampling failed")
}

/// Live updates go to stdout only alongside final text output on stdout, so
/// CSV and JSON streams stay parseable.
fn prints_live_updates(output: Option<&Path>, format: OutputFormat) -> bool {
    output.is_none() && format == OutputFormat::Text
}
