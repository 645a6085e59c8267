//! `raspistill` adapter for the camera port.
//!
//! Each capture runs the binary once and waits for it to exit. There is no
//! timeout: a wedged camera blocks the caller until the process returns.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;

use rpicam_core::{config::ImageSize, errors::Error, ports::Camera, Result};

use tokio::process::Command;

const STDERR_TAIL_MAX_BYTES: usize = 4 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 20;

/// How long raspistill keeps the sensor running before taking the shot.
pub const DEFAULT_WARMUP: Duration = Duration::from_millis(1000);

static CAPTURE_COUNTER: AtomicUsize = AtomicUsize::new(1);

#[derive(Clone, Debug)]
pub struct RaspiStillConfig {
    pub program: PathBuf,
    pub warmup: Duration,
}

impl RaspiStillConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            warmup: DEFAULT_WARMUP,
        }
    }
}

/// A concrete process invocation for one still.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output: PathBuf,
}

#[derive(Clone, Debug)]
pub struct RaspiStill {
    cfg: RaspiStillConfig,
}

impl RaspiStill {
    pub fn new(cfg: RaspiStillConfig) -> Self {
        Self { cfg }
    }

    pub fn build_invocation(
        &self,
        output_dir: &Path,
        size: ImageSize,
        file_name: &str,
    ) -> CaptureInvocation {
        let output = output_dir.join(file_name);
        let args = vec![
            "-n".to_string(),
            "-e".to_string(),
            "jpg".to_string(),
            "-w".to_string(),
            size.width.to_string(),
            "-h".to_string(),
            size.height.to_string(),
            "-t".to_string(),
            self.cfg.warmup.as_millis().max(1).to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
        ];

        CaptureInvocation {
            program: self.cfg.program.clone(),
            args,
            output,
        }
    }
}

#[async_trait]
impl Camera for RaspiStill {
    async fn capture(&self, output_dir: &Path, size: ImageSize) -> Result<PathBuf> {
        tokio::fs::create_dir_all(output_dir).await?;

        let inv = self.build_invocation(output_dir, size, &next_file_name());
        tracing::debug!(program = %inv.program.display(), args = ?inv.args, "running capture");

        let out = Command::new(&inv.program)
            .args(&inv.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                Error::Capture(format!("failed to run {}: {e}", inv.program.display()))
            })?;

        if !out.status.success() {
            let stderr = stderr_tail(&out.stderr);
            if stderr.trim().is_empty() {
                return Err(Error::Capture(format!(
                    "{} exited with {}",
                    inv.program.display(),
                    out.status
                )));
            }
            return Err(Error::Capture(format!(
                "{} exited with {}\nstderr (tail):\n{stderr}",
                inv.program.display(),
                out.status
            )));
        }

        if tokio::fs::metadata(&inv.output).await.is_err() {
            return Err(Error::Capture(format!(
                "{} exited successfully but wrote no file at {}",
                inv.program.display(),
                inv.output.display()
            )));
        }

        Ok(inv.output)
    }
}

fn next_file_name() -> String {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = CAPTURE_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("capture_{ts}_{n}.jpg")
}

/// Last few lines of a finished process's stderr, for error messages.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let mut start = lines.len().saturating_sub(STDERR_TAIL_MAX_LINES);
    // +1 per line for the '\n' we join with.
    while start < lines.len()
        && lines[start..].iter().map(|l| l.len() + 1).sum::<usize>() > STDERR_TAIL_MAX_BYTES
    {
        start += 1;
    }
    lines[start..].join("\n")
}
