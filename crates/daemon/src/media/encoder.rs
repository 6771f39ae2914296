use async_trait::async_trait;
use engine::RenderCommand;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::executor::RenderExecutor;

/// Keep only the tail of captured stderr; ffmpeg's banner and per-frame
/// chatter bury the actual failure reason otherwise.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum EncodeProcessError {
    #[error("encoder I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg exited with code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },
    #[error("render cancelled")]
    Cancelled,
}

/// Executes a render by spawning the system ffmpeg with the compiled
/// argument vector plus `-progress pipe:1`, and turns the progress stream
/// into fractional callbacks against the known total output duration.
pub struct FfmpegEncoder {
    binary: String,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        FfmpegEncoder {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        FfmpegEncoder::new("ffmpeg")
    }
}

#[async_trait]
impl RenderExecutor for FfmpegEncoder {
    async fn execute(
        &self,
        cmd: &RenderCommand,
        total_duration: f64,
        cancel: CancellationToken,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), EncodeProcessError> {
        // -progress must precede the output path, which is always last.
        let mut args = cmd.ffmpeg_args.clone();
        let output_path = args.pop().unwrap_or_default();
        args.push("-progress".into());
        args.push("pipe:1".into());
        args.push(output_path);

        debug!("spawning {} {}", self.binary, args.join(" "));
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Drain stderr concurrently so a full pipe buffer cannot deadlock
        // the encoder.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let stdout = child.stdout.take();
        let mut lines = stdout.map(|out| BufReader::new(out).lines());

        loop {
            let next = async {
                match lines.as_mut() {
                    Some(lines) => lines.next_line().await,
                    None => Ok(None),
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(EncodeProcessError::Cancelled);
                }
                line = next => match line? {
                    Some(line) => {
                        if let Some(out_time) = parse_progress_line(&line) {
                            if total_duration > 0.0 {
                                on_progress((out_time / total_duration).clamp(0.0, 1.0));
                            }
                        }
                    }
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(EncodeProcessError::Cancelled);
            }
            status = child.wait() => status?,
        };

        if status.success() {
            on_progress(1.0);
            Ok(())
        } else {
            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => Vec::new(),
            };
            let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            Err(EncodeProcessError::Failed {
                exit_code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr[start..]).into_owned(),
            })
        }
    }
}

/// Extract elapsed output time in seconds from one `-progress pipe:1` line.
/// `out_time_ms` is in microseconds despite the name.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let value = line.trim().strip_prefix("out_time_ms=")?;
    let microseconds: u64 = value.trim().parse().ok()?;
    Some(microseconds as f64 / 1_000_000.0)
}
