//! Process runner: launches one external command, merges its stdout and
//! stderr into a single ordered line sequence, and streams each line to the
//! caller as it arrives. Exit codes are returned as data; only a failure to
//! supervise the child at all is an error.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::errors::RunnerError;

/// Per-line sink. The orchestrator's sink forwards lines to the event bus
/// and runs the phase classifier; tests record them.
pub type LineSink<'a> = &'a (dyn Fn(String) + Send + Sync);

/// Seam between the orchestrator and child-process supervision, so tests can
/// substitute a spy that records invocations without spawning anything.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run `argv` in `cwd` with the parent environment overlaid by
    /// `extra_env`, streaming each output line through `on_line`, and return
    /// the child's exit code.
    async fn run(
        &self,
        argv: &[String],
        cwd: &Path,
        extra_env: &[(String, String)],
        on_line: LineSink<'_>,
    ) -> Result<i32, RunnerError>;
}

/// The real runner used in production.
pub struct ShellRunner;

#[async_trait]
impl StepRunner for ShellRunner {
    async fn run(
        &self,
        argv: &[String],
        cwd: &Path,
        extra_env: &[(String, String)],
        on_line: LineSink<'_>,
    ) -> Result<i32, RunnerError> {
        let (program, args) = argv.split_first().ok_or(RunnerError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .envs(extra_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: program.clone(),
                source,
            })?;

        // Both pipes were requested above; take() cannot fail.
        let stdout = child.stdout.take().ok_or(RunnerError::EmptyCommand)?;
        let stderr = child.stderr.take().ok_or(RunnerError::EmptyCommand)?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;

        // Drain both streams concurrently, preserving arrival order.
        // next_line is cancel-safe, so the select loop never drops a line.
        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => {
                    match line.map_err(RunnerError::Read)? {
                        Some(line) => on_line(line),
                        None => out_done = true,
                    }
                }
                line = err_lines.next_line(), if !err_done => {
                    match line.map_err(RunnerError::Read)? {
                        Some(line) => on_line(line),
                        None => err_done = true,
                    }
                }
            }
        }

        let status = child.wait().await.map_err(RunnerError::Wait)?;
        Ok(status.code().unwrap_or(-1))
    }
}
