//! Pipe-based spawning of shell commands with process group management.
//!
//! Output from stdout and stderr is forwarded as [`ProcessEvent::Output`]
//! chunks as soon as it is read. A supervisor task waits for both pipes to
//! reach EOF, reaps the child, and then sends a single
//! [`ProcessEvent::Closed`].

use std::io::{self, ErrorKind};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::command::{CommandSpec, ShellKind};
use crate::process::{
    ChildTerminator, ProcessEvent, ProcessExit, ProcessHandle, RunningProcess, StreamKind,
};
use crate::process_group::ProcessGroup;

/// Terminator for pipe-based child processes.
struct PipeChildTerminator {
    group: ProcessGroup,
}

impl ChildTerminator for PipeChildTerminator {
    fn kill(&mut self) -> io::Result<()> {
        self.group.kill()
    }
}

/// Decode a chunk, holding back an incomplete UTF-8 sequence at the end so a
/// multi-byte character split across reads is not mangled.
fn decode_chunk(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(err) if err.error_len().is_none() => {
            let valid = err.valid_up_to();
            let tail = pending.split_off(valid);
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = tail;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

/// Read from an async reader and forward decoded chunks.
async fn read_output_stream<R>(
    mut reader: R,
    stream: StreamKind,
    events: mpsc::UnboundedSender<ProcessEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8_192];
    let mut pending = Vec::new();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let Some(bytes) = buf.get(..n) else { break };
                let text = decode_chunk(&mut pending, bytes);
                if !text.is_empty() {
                    let _ = events.send(ProcessEvent::Output { stream, text });
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        let _ = events.send(ProcessEvent::Output { stream, text });
    }
}

fn configure_process_group(command: &mut Command) {
    #[cfg(unix)]
    {
        let parent_pid = unsafe { libc::getpid() };
        unsafe {
            command.pre_exec(move || crate::process_group::isolate_child(parent_pid));
        }
    }

    #[cfg(not(unix))]
    let _ = command;
}

async fn prepare_directories(spec: &CommandSpec) {
    for dir in &spec.prepare_dirs {
        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            // the compiler reports a missing output directory on its own
            tracing::debug!(dir = %dir.display(), error = %err, "failed to prepare directory");
        }
    }
}

fn supervise(
    mut child: Child,
    started: Instant,
    events: mpsc::UnboundedSender<ProcessEvent>,
) -> Vec<AbortHandle> {
    let stdout_handle = child.stdout.take().map(|stdout| {
        let events = events.clone();
        tokio::spawn(read_output_stream(stdout, StreamKind::Stdout, events))
    });
    let stderr_handle = child.stderr.take().map(|stderr| {
        let events = events.clone();
        tokio::spawn(read_output_stream(stderr, StreamKind::Stderr, events))
    });

    let mut tasks: Vec<AbortHandle> = Vec::new();
    if let Some(handle) = &stdout_handle {
        tasks.push(handle.abort_handle());
    }
    if let Some(handle) = &stderr_handle {
        tasks.push(handle.abort_handle());
    }

    let wait_handle = tokio::spawn(async move {
        if let Some(handle) = stdout_handle {
            let _ = handle.await;
        }
        if let Some(handle) = stderr_handle {
            let _ = handle.await;
        }
        let code = match child.wait().await {
            Ok(status) => status.code(),
            Err(err) => {
                tracing::debug!(error = %err, "failed to reap child process");
                None
            }
        };
        let exit = ProcessExit {
            code,
            elapsed: started.elapsed(),
        };
        tracing::debug!(code = ?exit.code, elapsed = ?exit.elapsed, "process closed");
        let _ = events.send(ProcessEvent::Closed(exit));
    });
    tasks.push(wait_handle.abort_handle());

    tasks
}

/// Run `spec.command` through the platform shell in its own process group.
///
/// Directories listed in `spec.prepare_dirs` are created first; a failure to
/// create them is logged and ignored.
pub async fn spawn_shell_command(spec: &CommandSpec) -> Result<RunningProcess> {
    if spec.command.trim().is_empty() {
        anyhow::bail!("missing command line for shell spawn");
    }

    prepare_directories(spec).await;

    let mut command = spec.shell.one_shot(&spec.command);
    configure_process_group(&mut command);
    command.current_dir(&spec.working_dir);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let started = Instant::now();
    let child = command
        .spawn()
        .with_context(|| format!("failed to spawn `{}`", spec.command))?;
    let pid = child
        .id()
        .ok_or_else(|| io::Error::other("missing child pid"))?;
    tracing::debug!(pid, command = %spec.command, cwd = %spec.working_dir.display(), "spawned shell command");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let tasks = supervise(child, started, events_tx);

    let handle = ProcessHandle::new(
        pid,
        Box::new(PipeChildTerminator {
            group: ProcessGroup::from_leader(pid),
        }),
        None,
        tasks,
    );

    Ok(RunningProcess::new(Arc::new(handle), events_rx))
}

/// Start a long-lived shell that executes lines written to its stdin.
///
/// The shell's stdout and stderr are inherited from the host so its output
/// appears wherever the host's console is. The returned process only ever
/// yields the close event.
pub fn spawn_interactive_shell(shell: ShellKind, cwd: &Path) -> Result<RunningProcess> {
    let mut command = shell.interactive();
    configure_process_group(&mut command);
    command.current_dir(cwd);
    command.stdin(Stdio::piped());
    command.stdout(Stdio::inherit());
    command.stderr(Stdio::inherit());

    let started = Instant::now();
    let mut child = command
        .spawn()
        .context("failed to spawn interactive shell")?;
    let pid = child
        .id()
        .ok_or_else(|| io::Error::other("missing child pid"))?;
    let stdin = child.stdin.take();

    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer_handle = tokio::spawn(async move {
        let Some(mut stdin) = stdin else { return };
        while let Some(bytes) = writer_rx.recv().await {
            if stdin.write_all(&bytes).await.is_err() {
                break;
            }
            let _ = stdin.flush().await;
        }
    });

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut tasks = supervise(child, started, events_tx);
    tasks.push(writer_handle.abort_handle());
    tracing::debug!(pid, cwd = %cwd.display(), "spawned interactive shell");

    let handle = ProcessHandle::new(
        pid,
        Box::new(PipeChildTerminator {
            group: ProcessGroup::from_leader(pid),
        }),
        Some(writer_tx),
        tasks,
    );

    Ok(RunningProcess::new(Arc::new(handle), events_rx))
}
