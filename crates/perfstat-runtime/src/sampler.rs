//! Async live collector.
//!
//! Runs a [`LiveSampleParser`] in a tokio task fed by the sampler's stdout,
//! sending [`LiveUpdate`] snapshots through an `mpsc` channel whenever a new
//! sampling interval starts and once more when collection ends. The task is
//! the only writer of the stats; readers only ever see cloned snapshots.

use std::process::{ExitStatus, Stdio};

use chrono::{DateTime, Utc};
use perfstat_core::error::{Result, StatError};
use perfstat_core::settings::MalformedSamplePolicy;
use perfstat_core::stat::Stat;
use perfstat_data::lines::decode_line;
use perfstat_data::live::LiveSampleParser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub const PIDSTAT_PROGRAM: &str = "pidstat";

/// Whether live sampling can run on this platform.
pub fn sampler_available() -> Result<()> {
    if cfg!(unix) {
        Ok(())
    } else {
        Err(StatError::UnsupportedFormat(
            "live sampling requires pidstat (sysstat), which is only available on Unix-like systems"
                .to_string(),
        ))
    }
}

/// Arguments for `pidstat`: disk, memory and CPU columns on one line per
/// process, every `interval` seconds.
pub fn pidstat_args(interval: u32) -> Vec<String> {
    vec![
        "-d".to_string(),
        "-r".to_string(),
        "-u".to_string(),
        "-h".to_string(),
        interval.to_string(),
    ]
}

// ── Public types ──────────────────────────────────────────────────────────────

/// A snapshot of the live stats forwarded to the caller.
#[derive(Debug, Clone)]
pub struct LiveUpdate {
    /// Every stat collected so far, in first-seen order.
    pub stats: Vec<Stat>,
    /// Samples applied since the collector started.
    pub samples: u64,
    /// Timestamp of the most recent sample, if any.
    pub latest: Option<DateTime<Utc>>,
}

/// Why a collection run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedEnd {
    Eof,
    Stopped,
}

// ── LiveCollector ─────────────────────────────────────────────────────────────

/// Background live-ingestion driver.
///
/// Call [`LiveCollector::start_pidstat`] to sample the system, or
/// [`LiveCollector::start`] with any line-oriented reader.
pub struct LiveCollector {
    policy: MalformedSamplePolicy,
}

impl LiveCollector {
    pub fn new(policy: MalformedSamplePolicy) -> Self {
        Self { policy }
    }

    /// Spawn `pidstat` and collect from its stdout.
    pub fn start_pidstat(
        self,
        interval: u32,
    ) -> Result<(mpsc::Receiver<LiveUpdate>, CollectorHandle)> {
        self.start_process(PIDSTAT_PROGRAM, &pidstat_args(interval))
    }

    /// Spawn `program args...` in the C locale and collect from its stdout.
    ///
    /// The child is killed when the collector is stopped, fails, or is
    /// aborted. If it exits on its own with a failure status, its stderr is
    /// logged.
    pub fn start_process(
        self,
        program: &str,
        args: &[String],
    ) -> Result<(mpsc::Receiver<LiveUpdate>, CollectorHandle)> {
        // sysstat formats numbers per LC_NUMERIC; the parser expects `1.00`.
        let mut child = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StatError::Sampler(format!("failed to start {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StatError::Sampler(format!("{} stdout was not captured", program)))?;
        let stderr = child.stderr.take();

        tracing::info!("Started {} {}", program, args.join(" "));

        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = oneshot::channel();
        let program = program.to_string();
        let handle = tokio::spawn(async move {
            let diagnostics = tokio::spawn(read_diagnostics(stderr));
            let result = self.collect_loop(BufReader::new(stdout), tx, stop_rx).await;

            let ran_to_end = matches!(result, Ok((_, FeedEnd::Eof)));
            if !ran_to_end {
                let _ = child.kill().await;
            }
            let status = child.wait().await;
            let stderr = diagnostics.await.unwrap_or_default();
            match status {
                Ok(status) if ran_to_end => {
                    if let Some(report) = exit_report(&program, status, &stderr) {
                        tracing::warn!("{}", report);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "failed to reap {}", program),
            }
            result.map(|(stats, _)| stats)
        });

        Ok((rx, CollectorHandle::new(handle, stop_tx)))
    }

    /// Collect from an already open line-oriented reader.
    pub fn start<R>(self, reader: R) -> (mpsc::Receiver<LiveUpdate>, CollectorHandle)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        // Buffer a modest number of snapshots so slow consumers don't stall the loop.
        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            self.collect_loop(reader, tx, stop_rx)
                .await
                .map(|(stats, _)| stats)
        });
        (rx, CollectorHandle::new(handle, stop_tx))
    }

    // ── Private implementation ────────────────────────────────────────────

    /// Read lines until end of stream or a stop request. Read errors end the
    /// loop with the error; malformed samples follow the configured policy.
    /// Lines that are not UTF-8 are decoded lossily and parsed like any other.
    async fn collect_loop<R>(
        self,
        mut reader: R,
        tx: mpsc::Sender<LiveUpdate>,
        mut stop: oneshot::Receiver<()>,
    ) -> Result<(Vec<Stat>, FeedEnd)>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut parser = LiveSampleParser::new();
        let mut latest: Option<DateTime<Utc>> = None;
        let mut buf = Vec::new();
        let mut stop_open = true;

        let end = loop {
            tokio::select! {
                // Lines already buffered are applied before a stop takes effect.
                biased;
                read = reader.read_until(b'\n', &mut buf) => {
                    if read? == 0 {
                        break FeedEnd::Eof;
                    }
                    let line = decode_line(&buf);
                    buf.clear();
                    match parser.apply_line(&line) {
                        Ok(Some(sample)) => {
                            let boundary = latest.is_some_and(|ts| ts != sample.timestamp);
                            latest = Some(sample.timestamp);
                            if boundary {
                                send_snapshot(&parser, latest, &tx).await;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => parser.handle_error(err, self.policy)?,
                    }
                }
                signal = &mut stop, if stop_open => match signal {
                    Ok(()) => break FeedEnd::Stopped,
                    // Handle dropped without a stop request: run to end of stream.
                    Err(_) => stop_open = false,
                },
            }
        };

        tracing::info!(
            lines = parser.lines_read(),
            samples = parser.samples_applied(),
            skipped = parser.samples_skipped(),
            stopped = end == FeedEnd::Stopped,
            "live feed ended"
        );
        send_snapshot(&parser, latest, &tx).await;

        Ok((parser.into_stats(), end))
    }
}

async fn send_snapshot(
    parser: &LiveSampleParser,
    latest: Option<DateTime<Utc>>,
    tx: &mpsc::Sender<LiveUpdate>,
) {
    if tx.is_closed() {
        return;
    }
    let update = LiveUpdate {
        stats: parser.snapshot(),
        samples: parser.samples_applied(),
        latest,
    };
    if let Err(e) = tx.send(update).await {
        tracing::debug!(error = %e, "live update dropped; receiver closed");
    }
}

/// Drain the sampler's stderr so it never blocks on a full pipe.
async fn read_diagnostics(stderr: Option<ChildStderr>) -> String {
    let mut raw = Vec::new();
    if let Some(mut stderr) = stderr {
        if let Err(e) = stderr.read_to_end(&mut raw).await {
            tracing::debug!(error = %e, "could not read sampler stderr");
        }
    }
    String::from_utf8_lossy(&raw).trim().to_string()
}

/// Describe an unsuccessful sampler exit, including what it printed to stderr.
fn exit_report(program: &str, status: ExitStatus, stderr: &str) -> Option<String> {
    if status.success() {
        return None;
    }
    Some(if stderr.is_empty() {
        format!("{} exited with {}", program, status)
    } else {
        format!("{} exited with {}: {}", program, status, stderr)
    })
}

// ── CollectorHandle ───────────────────────────────────────────────────────────

/// A handle to the background collector task.
pub struct CollectorHandle {
    handle: JoinHandle<Result<Vec<Stat>>>,
    stop: Option<oneshot::Sender<()>>,
}

impl CollectorHandle {
    fn new(handle: JoinHandle<Result<Vec<Stat>>>, stop: oneshot::Sender<()>) -> Self {
        Self {
            handle,
            stop: Some(stop),
        }
    }

    /// Ask the collector to finish. Every sample read so far is kept and
    /// returned by [`CollectorHandle::join`]; a sampler child is killed.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Immediately abort the collector, discarding its stats. Any sampler
    /// child is killed.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the collector to finish and return the final stats.
    pub async fn join(self) -> Result<Vec<Stat>> {
        self.handle
            .await
            .map_err(|e| StatError::Sampler(format!("collector task failed: {}", e)))?
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
