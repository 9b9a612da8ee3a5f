//! Wrapper around the external `relog` converter.
//!
//! `relog` turns a binary `.blg` performance log into the counter CSV that
//! [`perfstat_data::counter_log`] parses. It ships with Windows only.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use perfstat_core::error::{Result, StatError};
use tokio::process::Command;

pub const RELOG_PROGRAM: &str = "relog";

/// Whether `.blg` conversion can run on this platform.
pub fn converter_available() -> Result<()> {
    if cfg!(windows) {
        Ok(())
    } else {
        Err(StatError::UnsupportedFormat(
            "converting .blg counter logs requires relog, which is only available on Windows; \
             convert the log to .csv there and pass the .csv instead"
                .to_string(),
        ))
    }
}

/// Runs `relog <input> -f csv -o <output> -y`.
#[derive(Debug, Clone)]
pub struct RelogConverter {
    program: OsString,
}

impl Default for RelogConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl RelogConverter {
    pub fn new() -> Self {
        Self::with_program(RELOG_PROGRAM)
    }

    /// Use a different executable (a full path to relog, or a stand-in).
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments passed to the converter for one conversion.
    pub fn command_args(input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            input.as_os_str().to_owned(),
            "-f".into(),
            "csv".into(),
            "-o".into(),
            output.as_os_str().to_owned(),
            "-y".into(),
        ]
    }

    /// Convert `input` into a CSV inside `out_dir` and return its path.
    ///
    /// Fails when the converter cannot start, exits unsuccessfully, or
    /// leaves no non-empty output behind.
    pub async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf> {
        let stem = input
            .file_stem()
            .map(|s| s.to_owned())
            .unwrap_or_else(|| OsString::from("counters"));
        let mut output = out_dir.join(stem);
        output.set_extension("csv");

        tracing::info!(
            "Converting {} to {} with {}",
            input.display(),
            output.display(),
            self.program.to_string_lossy()
        );

        let result = Command::new(&self.program)
            .args(Self::command_args(input, &output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                StatError::Converter(format!(
                    "failed to start {}: {}",
                    self.program.to_string_lossy(),
                    e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(StatError::Converter(format!(
                "{} exited with {}: {}",
                self.program.to_string_lossy(),
                result.status,
                stderr.trim()
            )));
        }

        match std::fs::metadata(&output) {
            Ok(meta) if meta.len() > 0 => Ok(output),
            _ => Err(StatError::Converter(format!(
                "{} produced no output at {}",
                self.program.to_string_lossy(),
                output.display()
            ))),
        }
    }
}
