//! External build toolchain
//!
//! The toolchain is a black box run against a prepared application
//! directory. A failing build is a normal outcome reported through
//! `ToolchainStatus`, not an error.

mod make;

pub use make::MakeToolchain;

use crate::error::ForgeResult;
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How a toolchain run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainStatus {
    Success,
    /// Non-zero exit; `None` when terminated by a signal
    Failed(Option<i32>),
    /// Killed after exceeding the configured timeout
    TimedOut,
}

impl ToolchainStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Captured output and status of one toolchain run
#[derive(Debug, Clone)]
pub struct ToolchainOutput {
    pub output: String,
    pub status: ToolchainStatus,
}

/// Abstract build toolchain
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Build the application in `app_dir` for `board`.
    ///
    /// Returns `Err` only when the toolchain could not be started.
    async fn run(&self, app_dir: &Path, board: &str) -> ForgeResult<ToolchainOutput>;

    /// Human-readable name for logs
    fn name(&self) -> &'static str;
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Lines are interleaved in arrival order. Bytes that are not valid UTF-8 are
/// replaced rather than ending the stream, so both pipes are always drained.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) {
    let stderr = child.stderr.take();
    let stdout = child.stdout.take();

    let mut stderr_reader = stderr.map(BufReader::new);
    let mut stdout_reader = stdout.map(BufReader::new);

    let mut stderr_done = stderr_reader.is_none();
    let mut stdout_done = stdout_reader.is_none();
    let mut stderr_buf = Vec::new();
    let mut stdout_buf = Vec::new();

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = next_line(&mut stderr_reader, &mut stderr_buf), if !stderr_done => {
                match line {
                    Some(line) => on_output(line),
                    None => stderr_done = true,
                }
            }
            line = next_line(&mut stdout_reader, &mut stdout_buf), if !stdout_done => {
                match line {
                    Some(line) => on_output(line),
                    None => stdout_done = true,
                }
            }
        }
    }
}

/// Next raw line, decoded lossily. `None` at end of stream or on a read error.
///
/// `buf` persists across calls so a line interrupted by the other branch of
/// the select is resumed, not lost.
async fn next_line<R>(reader: &mut Option<BufReader<R>>, buf: &mut Vec<u8>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let reader = reader.as_mut()?;
    match reader.read_until(b'\n', buf).await {
        Ok(0) if buf.is_empty() => None,
        Ok(_) => {
            let mut end = buf.len();
            while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
                end -= 1;
            }
            let line = String::from_utf8_lossy(&buf[..end]).into_owned();
            buf.clear();
            Some(line)
        }
        Err(_) => None,
    }
}
