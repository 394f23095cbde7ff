use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use hdlrun_process::{ProcessHandle, RunningProcess, ShellKind, spawn_interactive_shell};
use parking_lot::Mutex;

use super::{Indent, OutputSink};

/// An interactive shell that accepts text as typed commands.
pub trait TerminalBackend: Send + Sync {
    /// Type `text` followed by Enter.
    fn send_text(&self, text: &str);

    fn clear(&self);

    fn show(&self, _preserve_focus: bool) {}

    fn dispose(&self) {}
}

/// Fire-and-forget output panel backed by a shell.
///
/// Every line is executed as a command. Nothing flows back, so the
/// controller cannot tell whether a compile worked in this mode.
pub struct TerminalSink {
    backend: Arc<dyn TerminalBackend>,
}

impl std::fmt::Debug for TerminalSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSink").finish_non_exhaustive()
    }
}

impl TerminalSink {
    pub fn new(backend: Arc<dyn TerminalBackend>) -> Self {
        Self { backend }
    }
}

impl OutputSink for TerminalSink {
    fn show(&self, preserve_focus: bool) {
        self.backend.show(preserve_focus);
    }

    fn clear(&self) {
        self.backend.clear();
    }

    fn append_line(&self, line: &str) {
        self.backend.send_text(line);
    }

    fn append_raw(&self, text: &str, _indent: Indent) {
        self.backend.send_text(text.strip_suffix('\n').unwrap_or(text));
    }

    fn observes_completion(&self) -> bool {
        false
    }

    fn dispose(&self) {
        self.backend.dispose();
    }
}

struct ShellState {
    handle: Arc<ProcessHandle>,
    process: Option<RunningProcess>,
}

/// Real shell spawned on first use, with stdout and stderr inherited from the
/// host process.
pub struct ShellTerminal {
    shell: ShellKind,
    cwd: PathBuf,
    state: Mutex<Option<ShellState>>,
}

impl std::fmt::Debug for ShellTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellTerminal")
            .field("shell", &self.shell)
            .field("cwd", &self.cwd)
            .field("started", &self.state.lock().is_some())
            .finish()
    }
}

impl ShellTerminal {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            shell: ShellKind::detect(),
            cwd: cwd.into(),
            state: Mutex::new(None),
        }
    }

    fn write_line(&self, text: &str) {
        let mut state = self.state.lock();
        if state.is_none() {
            match spawn_interactive_shell(self.shell, &self.cwd) {
                Ok(process) => {
                    tracing::debug!(pid = process.handle().pid(), "terminal shell started");
                    *state = Some(ShellState {
                        handle: process.handle(),
                        process: Some(process),
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to start terminal shell");
                    return;
                }
            }
        }
        if let Some(shell) = state.as_ref() {
            if !shell.handle.write(format!("{text}\n")) {
                tracing::debug!("terminal shell stopped accepting input");
            }
        }
    }

    /// Ask the shell to exit once the queued commands ran and wait for it.
    ///
    /// Returns the shell's exit code, or `None` when no shell was started.
    pub async fn exit_and_wait(&self) -> Result<Option<i32>> {
        let process = {
            let mut state = self.state.lock();
            let Some(shell) = state.as_mut() else {
                return Ok(None);
            };
            shell.handle.write("exit\n");
            shell.process.take()
        };
        let Some(process) = process else {
            return Ok(None);
        };
        let outcome = process.wait_with_output().await;
        self.state.lock().take();
        Ok(outcome.exit_code)
    }
}

impl TerminalBackend for ShellTerminal {
    fn send_text(&self, text: &str) {
        self.write_line(text);
    }

    fn clear(&self) {
        match self.shell {
            ShellKind::Unix => self.write_line("clear"),
            ShellKind::Windows => self.write_line("cls"),
        }
    }

    fn dispose(&self) {
        if let Some(shell) = self.state.lock().take() {
            shell.handle.terminate();
        }
    }
}

/// What a [`RecordingTerminal`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalAction {
    Show { preserve_focus: bool },
    Clear,
    Send(String),
    Dispose,
}

/// Terminal that records every action instead of executing it.
#[derive(Debug, Default)]
pub struct RecordingTerminal {
    actions: Mutex<Vec<TerminalAction>>,
}

impl RecordingTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<TerminalAction> {
        self.actions.lock().clone()
    }

    /// Only the text that was sent, in order.
    pub fn sent(&self) -> Vec<String> {
        self.actions
            .lock()
            .iter()
            .filter_map(|action| match action {
                TerminalAction::Send(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl TerminalBackend for RecordingTerminal {
    fn send_text(&self, text: &str) {
        self.actions.lock().push(TerminalAction::Send(text.to_string()));
    }

    fn clear(&self) {
        self.actions.lock().push(TerminalAction::Clear);
    }

    fn show(&self, preserve_focus: bool) {
        self.actions
            .lock()
            .push(TerminalAction::Show { preserve_focus });
    }

    fn dispose(&self) {
        self.actions.lock().push(TerminalAction::Dispose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sink_forwards_lines_as_commands() {
        let terminal = Arc::new(RecordingTerminal::new());
        let sink = TerminalSink::new(terminal.clone());

        sink.clear();
        sink.show(true);
        sink.append_line("cd \"/work\"");
        sink.append_raw("mkdir -p build\n", Indent::Bulk);
        sink.dispose();

        assert_eq!(
            terminal.actions(),
            vec![
                TerminalAction::Clear,
                TerminalAction::Show {
                    preserve_focus: true
                },
                TerminalAction::Send("cd \"/work\"".into()),
                TerminalAction::Send("mkdir -p build".into()),
                TerminalAction::Dispose,
            ]
        );
        assert!(!sink.observes_completion());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_terminal_executes_sent_text() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let terminal = ShellTerminal::new(dir.path());

        terminal.send_text("mkdir -p build");
        terminal.send_text("touch build/ran.txt");
        let code = terminal.exit_and_wait().await?;

        assert_eq!(code, Some(0));
        assert!(dir.path().join("build/ran.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn exit_without_shell_is_noop() -> Result<()> {
        let terminal = ShellTerminal::new(".");
        assert_eq!(terminal.exit_and_wait().await?, None);
        Ok(())
    }
}
