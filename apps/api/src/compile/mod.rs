//! Compile Executor — bounded-time invocation of the external LaTeX compiler.
//!
//! # Budgets
//! - soft limit: the process group receives SIGTERM and may exit on its own.
//! - hard limit: the process group is killed.
//!
//! A run that crosses the soft limit reports `TimedOut`, whichever way it
//! ended. Nothing here retries; retry policy belongs to the worker.

mod summary;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

pub use summary::summarize_log;

/// Program and leading arguments; the entry file is appended last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CompilerCommand {
    /// A LaTeX engine run non-interactively, stopping at the first error.
    pub fn latex(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: vec![
                "-interaction=nonstopmode".to_string(),
                "-halt-on-error".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileLimits {
    pub soft: Duration,
    pub hard: Duration,
}

impl CompileLimits {
    pub fn new(soft: Duration, hard: Duration) -> Result<Self> {
        if soft.is_zero() {
            bail!("soft compile timeout must be greater than zero");
        }
        if soft > hard {
            bail!(
                "soft compile timeout ({}s) exceeds hard timeout ({}s)",
                soft.as_secs(),
                hard.as_secs()
            );
        }
        Ok(Self { soft, hard })
    }
}

impl Default for CompileLimits {
    fn default() -> Self {
        Self {
            soft: Duration::from_secs(90),
            hard: Duration::from_secs(120),
        }
    }
}

/// The compiler's single designated output.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum CompileFailure {
    /// The compiler rejected its input, or exited cleanly without output.
    #[error("compilation failed: {summary}")]
    Failed {
        exit_code: Option<i32>,
        summary: String,
    },

    /// The run exceeded its time budget and was stopped.
    #[error("compilation timed out after {}s", .limit.as_secs())]
    TimedOut { limit: Duration, killed: bool },

    /// The compiler could not be run at all.
    #[error("compiler unavailable: {0}")]
    Infra(String),
}

impl CompileFailure {
    /// Only infrastructure problems may succeed on a blind retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, CompileFailure::Infra(_))
    }
}

#[derive(Debug, Clone)]
pub struct CompileExecutor {
    command: CompilerCommand,
    limits: CompileLimits,
}

impl CompileExecutor {
    pub fn new(command: CompilerCommand, limits: CompileLimits) -> Self {
        Self { command, limits }
    }

    pub fn limits(&self) -> CompileLimits {
        self.limits
    }

    /// Compiles `entry_file` inside `working_dir`. On success the output is
    /// `<entry stem>.pdf` next to the entry file.
    pub async fn compile(
        &self,
        working_dir: &Path,
        entry_file: &str,
    ) -> Result<CompiledArtifact, CompileFailure> {
        let started = Instant::now();
        let output_path = working_dir.join(Path::new(entry_file).with_extension("pdf"));

        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .arg(entry_file)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            warn!("Failed to spawn compiler '{}': {e}", self.command.program);
            CompileFailure::Infra(format!("could not start '{}'", self.command.program))
        })?;

        let stdout = child.stdout.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });
        // Drained so a chatty compiler never blocks on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = match tokio::time::timeout(self.limits.soft, child.wait()).await {
            Ok(status) => status.map_err(|e| CompileFailure::Infra(format!("wait failed: {e}")))?,
            Err(_) => {
                let killed = self.stop(&mut child).await;
                if let Some(handle) = stderr {
                    handle.abort();
                }
                return Err(CompileFailure::TimedOut {
                    limit: if killed { self.limits.hard } else { self.limits.soft },
                    killed,
                });
            }
        };

        let console = match stdout {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };
        if let Some(handle) = stderr {
            let _ = handle.await;
        }
        let elapsed = started.elapsed();

        if !status.success() {
            let log = read_log(working_dir, entry_file, &console).await;
            let summary = summarize_log(&log, working_dir);
            info!(
                "Compiler exited with {:?} after {}ms",
                status.code(),
                elapsed.as_millis()
            );
            return Err(CompileFailure::Failed {
                exit_code: status.code(),
                summary,
            });
        }

        match tokio::fs::read(&output_path).await {
            Ok(bytes) => {
                debug!(
                    "Compiled {entry_file} to {} bytes in {}ms",
                    bytes.len(),
                    elapsed.as_millis()
                );
                Ok(CompiledArtifact {
                    path: output_path,
                    bytes,
                    elapsed,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CompileFailure::Failed {
                exit_code: status.code(),
                summary: "compiler exited successfully but produced no output".to_string(),
            }),
            Err(e) => Err(CompileFailure::Infra(format!("could not read output: {e}"))),
        }
    }

    /// SIGTERM, then SIGKILL once the hard budget is spent.
    /// Returns true when the process had to be killed.
    async fn stop(&self, child: &mut Child) -> bool {
        let grace = self.limits.hard.saturating_sub(self.limits.soft);
        warn!(
            "Compiler exceeded soft limit of {}s, requesting stop",
            self.limits.soft.as_secs()
        );
        signal_group(child, Signal::Terminate);

        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return false;
        }

        warn!(
            "Compiler exceeded hard limit of {}s, killing",
            self.limits.hard.as_secs()
        );
        signal_group(child, Signal::Kill);
        let _ = child.kill().await;
        true
    }
}

enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: Signal) {
    let Some(pid) = child.id() else {
        return;
    };
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // The child leads its own process group, so this reaches every
    // subprocess the compiler started as well.
    unsafe {
        libc::kill(-(pid as libc::pid_t), signo);
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child, _signal: Signal) {}

/// The compiler's log file if it wrote one, otherwise its console output.
async fn read_log(working_dir: &Path, entry_file: &str, console: &[u8]) -> String {
    let log_path = working_dir.join(Path::new(entry_file).with_extension("log"));
    match tokio::fs::read(&log_path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::from_utf8_lossy(console).into_owned(),
    }
}
