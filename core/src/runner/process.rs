// callflow/src/runner/process.rs

//! `ToolExecutor` backed by OS processes.
//!
//! Piped links are coupled through an OS pipe: the upstream child's stdout
//! handle is moved into the downstream child's stdin, so the orchestrator
//! never holds either end. Children are reaped in chain order; once a link
//! fails, later links are killed and reaped rather than left running. A link
//! that died on a broken pipe does not stop the links after it: they closed
//! the pipe and are waited for normally.

use super::{Invocation, Sink, ToolExecutor};
use crate::core::outcome::ExecutionResult;
use crate::error::{CallflowError, CallflowResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{event, Level};

#[derive(Debug, Clone)]
pub struct ProcessExecutor {
  stderr_tail_bytes: usize,
}

impl Default for ProcessExecutor {
  fn default() -> Self {
    Self::new(crate::config::DEFAULT_STDERR_TAIL_BYTES)
  }
}

impl ProcessExecutor {
  pub fn new(stderr_tail_bytes: usize) -> Self {
    Self { stderr_tail_bytes }
  }

  pub fn from_config(config: &crate::RunConfig) -> Self {
    Self::new(config.stderr_tail_bytes)
  }

  fn spawn_link(&self, invocation: &Invocation, piped_stdin: Option<Stdio>) -> CallflowResult<Link> {
    let mut command = Command::new(&invocation.program);
    command.args(&invocation.args).stderr(Stdio::piped()).kill_on_drop(true);

    let stdin = match (piped_stdin, &invocation.stdin) {
      (Some(pipe), _) => pipe,
      (None, Some(path)) => Stdio::from(std::fs::File::open(path).map_err(|e| CallflowError::io(path, e))?),
      (None, None) => Stdio::null(),
    };
    let stdout = match &invocation.stdout {
      Sink::Pipe => Stdio::piped(),
      Sink::Discard => Stdio::null(),
      Sink::File(path) => {
        let partial = partial_path(path);
        Stdio::from(std::fs::File::create(&partial).map_err(|e| CallflowError::io(&partial, e))?)
      }
    };
    command.stdin(stdin).stdout(stdout);

    let mut child = command.spawn().map_err(|source| CallflowError::Spawn {
      stage: invocation.stage.clone(),
      program: invocation.program.clone(),
      source,
    })?;
    let stderr = child
      .stderr
      .take()
      .map(|pipe| tokio::spawn(read_tail(pipe, self.stderr_tail_bytes)));

    event!(Level::TRACE, stage = %invocation.stage, pid = ?child.id(), "Process spawned.");
    Ok(Link {
      stage: invocation.stage.clone(),
      child,
      stderr,
      started: Instant::now(),
    })
  }
}

#[async_trait]
impl ToolExecutor for ProcessExecutor {
  async fn execute(&self, chain: &[Invocation]) -> CallflowResult<Vec<ExecutionResult>> {
    let mut links: Vec<Link> = Vec::with_capacity(chain.len());
    let mut upstream: Option<Stdio> = None;

    for invocation in chain {
      let mut link = match self.spawn_link(invocation, upstream.take()) {
        Ok(link) => link,
        Err(err) => {
          abandon(links).await;
          discard_partial(chain);
          return Err(err);
        }
      };
      if invocation.stdout == Sink::Pipe {
        match link.stdout_as_stdin() {
          Ok(stdio) => upstream = Some(stdio),
          Err(err) => {
            links.push(link);
            abandon(links).await;
            discard_partial(chain);
            return Err(err);
          }
        }
      }
      links.push(link);
    }

    let mut results = Vec::with_capacity(links.len());
    let mut chain_failed = false;
    let mut stop_rest = false;
    for link in links {
      let result = if stop_rest { link.kill().await } else { link.wait().await };
      chain_failed |= !result.success();
      // A broken pipe means the reader went away first; it reports its own status.
      stop_rest |= !result.success() && !result.is_broken_pipe();
      results.push(result);
    }

    match chain.last().map(|i| &i.stdout) {
      Some(Sink::File(path)) if !chain_failed => {
        let partial = partial_path(path);
        std::fs::rename(&partial, path).map_err(|e| CallflowError::io(path, e))?;
      }
      _ => discard_partial(chain),
    }
    Ok(results)
  }
}

/// One spawned process of a chain.
struct Link {
  stage: String,
  child: Child,
  stderr: Option<JoinHandle<String>>,
  started: Instant,
}

impl Link {
  fn stdout_as_stdin(&mut self) -> CallflowResult<Stdio> {
    let stdout = self
      .child
      .stdout
      .take()
      .ok_or_else(|| CallflowError::Internal(format!("stage '{}' has no stdout pipe", self.stage)))?;
    stdout
      .try_into()
      .map_err(|e: std::io::Error| CallflowError::Internal(format!("stage '{}' stdout cannot be piped: {e}", self.stage)))
  }

  async fn wait(mut self) -> ExecutionResult {
    let status = self.child.wait().await;
    self.finish(status, false).await
  }

  /// Kills the process unless it already exited on its own.
  async fn kill(mut self) -> ExecutionResult {
    if let Ok(Some(status)) = self.child.try_wait() {
      return self.finish(Ok(status), false).await;
    }
    event!(Level::DEBUG, stage = %self.stage, "Killing downstream process of a failed chain.");
    if let Err(err) = self.child.start_kill() {
      event!(Level::WARN, stage = %self.stage, error = %err, "Failed to signal process.");
    }
    let status = self.child.wait().await;
    self.finish(status, true).await
  }

  async fn finish(self, status: std::io::Result<ExitStatus>, killed: bool) -> ExecutionResult {
    let duration = self.started.elapsed();
    // A killed link is never blamed, and its stderr may be held open by
    // orphaned grandchildren.
    let mut stderr = match self.stderr {
      Some(handle) if killed => {
        handle.abort();
        String::new()
      }
      Some(handle) => handle.await.unwrap_or_default(),
      None => String::new(),
    };
    let (exit_code, signal) = match status {
      Ok(status) => (status.code(), exit_signal(&status)),
      Err(err) => {
        stderr.push_str(&format!("\nwaiting for process failed: {err}"));
        (None, None)
      }
    };
    event!(Level::DEBUG, stage = %self.stage, ?exit_code, ?signal, killed, elapsed_ms = duration.as_millis() as u64, "Process finished.");
    ExecutionResult {
      stage: self.stage,
      exit_code,
      signal,
      stderr,
      duration,
      killed,
    }
  }
}

// Reaps links that were started before a later link failed to start.
async fn abandon(links: Vec<Link>) {
  for link in links {
    link.kill().await;
  }
}

fn discard_partial(chain: &[Invocation]) {
  if let Some(Sink::File(path)) = chain.last().map(|i| &i.stdout) {
    let _ = std::fs::remove_file(partial_path(path));
  }
}

fn partial_path(path: &Path) -> PathBuf {
  let mut name = path.as_os_str().to_owned();
  name.push(".partial");
  PathBuf::from(name)
}

async fn read_tail(mut pipe: ChildStderr, limit: usize) -> String {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 8192];
  loop {
    match pipe.read(&mut chunk).await {
      Ok(0) | Err(_) => break,
      Ok(n) => {
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > limit {
          let excess = buf.len() - limit;
          buf.drain(..excess);
        }
      }
    }
  }
  String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
  use std::os::unix::process::ExitStatusExt;
  status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
  None
}
