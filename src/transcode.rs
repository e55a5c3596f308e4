// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! External transcoder seam.
//!
//! Clip and preview code describe a [`ToolJob`] (argument list, optional
//! stdin playlist, timeout) and hand it to a [`Transcoder`]. The production
//! implementation spawns ffmpeg; tests inject a fake.
//!
//! Playlists always travel over stdin (`-i /dev/stdin` with the `pipe`
//! protocol whitelisted), never through a temporary file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error talking to tool: {0}")]
    Io(#[from] std::io::Error),
}

/// One invocation of the external tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolJob {
    pub args: Vec<String>,
    /// Written to the child's stdin, then stdin is closed.
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl ToolJob {
    pub fn new(args: Vec<String>, timeout: Duration) -> Self {
        Self { args, stdin: None, timeout }
    }

    pub fn with_stdin(mut self, input: String) -> Self {
        self.stdin = Some(input);
        self
    }

    /// Last argument, which is the output target for every job we build.
    pub fn output(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

/// Runs a [`ToolJob`]. Exit status is the only success signal; on success the
/// child's stdout is returned.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(&self, job: ToolJob) -> Result<Bytes, ToolError>;
}

/// Spawns ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(binary: &Path) -> Self {
        Self { binary: binary.to_path_buf() }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(&self, job: ToolJob) -> Result<Bytes, ToolError> {
        debug!(tool = ?self.binary, args = ?job.args, "Spawning transcoder");

        let mut child = Command::new(&self.binary)
            .args(&job.args)
            .stdin(if job.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future (client went away, timeout) kills ffmpeg.
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn { tool: self.binary.display().to_string(), source })?;

        // Feed stdin from its own task so a child that starts writing output
        // before it has read the whole playlist cannot deadlock us.
        let feeder = match (job.stdin, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => Some(tokio::spawn(async move {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await
            })),
            _ => None,
        };

        let output = match tokio::time::timeout(job.timeout, child.wait_with_output()).await {
            Ok(out) => out?,
            Err(_) => {
                error!(tool = ?self.binary, timeout = ?job.timeout, "Transcoder timed out");
                return Err(ToolError::Timeout(job.timeout));
            }
        };

        if let Some(feeder) = feeder {
            // A broken pipe here just means the child quit early; the exit
            // status below is what decides success.
            if let Ok(Err(e)) = feeder.await {
                debug!(error = %e, "Transcoder stdin closed early");
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(code = ?output.status.code(), stderr = %stderr, "Transcoder failed");
            return Err(ToolError::Exit { code: output.status.code(), stderr });
        }

        Ok(Bytes::from(output.stdout))
    }
}

/// ffmpeg concat-demuxer playlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConcatPlaylist {
    lines: Vec<String>,
}

impl ConcatPlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&mut self, path: &str) -> &mut Self {
        // Single quotes inside a quoted path are escaped as '\''.
        self.lines.push(format!("file '{}'", path.replace('\'', "'\\''")));
        self
    }

    pub fn inpoint(&mut self, secs: i64) -> &mut Self {
        self.lines.push(format!("inpoint {secs}"));
        self
    }

    pub fn outpoint(&mut self, secs: i64) -> &mut Self {
        self.lines.push(format!("outpoint {secs}"));
        self
    }

    pub fn duration(&mut self, secs: f64) -> &mut Self {
        self.lines.push(format!("duration {secs}"));
        self
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

/// Leading arguments for reading a concat playlist from stdin.
pub fn concat_input_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "warning",
        "-y",
        "-protocol_whitelist",
        "pipe,file",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
        "/dev/stdin",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Trailing arguments that encode a looping GIF to stdout.
pub fn gif_output_args() -> Vec<String> {
    ["-loop", "0", "-c:v", "gif", "-f", "gif", "-"].iter().map(|s| s.to_string()).collect()
}
