use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Shell family used to execute command strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellKind {
    Unix,
    Windows,
}

impl ShellKind {
    /// Shell family of the host platform.
    pub fn detect() -> Self {
        if cfg!(windows) {
            ShellKind::Windows
        } else {
            ShellKind::Unix
        }
    }

    /// Build a command that runs `command_line` once and exits.
    pub fn one_shot(self, command_line: &str) -> Command {
        match self {
            ShellKind::Unix => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(command_line);
                command
            }
            ShellKind::Windows => {
                let mut command = Command::new("cmd");
                command.arg("/C").arg(command_line);
                command
            }
        }
    }

    /// Build a shell that reads commands from stdin until it is closed.
    pub fn interactive(self) -> Command {
        match self {
            ShellKind::Unix => {
                let mut command = Command::new("sh");
                command.arg("-s");
                command
            }
            ShellKind::Windows => {
                let mut command = Command::new("cmd");
                command.arg("/Q");
                command
            }
        }
    }
}

/// Immutable description of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub shell: ShellKind,
    pub command: String,
    pub working_dir: PathBuf,
    /// Directories created (best effort) before the command is spawned.
    pub prepare_dirs: Vec<PathBuf>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            shell: ShellKind::detect(),
            command: command.into(),
            working_dir: working_dir.into(),
            prepare_dirs: Vec::new(),
        }
    }

    pub fn with_shell(mut self, shell: ShellKind) -> Self {
        self.shell = shell;
        self
    }

    /// Create `dir` before spawning; failures are ignored.
    pub fn prepare_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.prepare_dirs.push(dir.as_ref().to_path_buf());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_prepare_dirs() {
        let spec = CommandSpec::new("iverilog -o \"build/top.out\" \"top.v\"", "/work")
            .with_shell(ShellKind::Unix)
            .prepare_dir("/work/build");

        assert_eq!(spec.shell, ShellKind::Unix);
        assert_eq!(spec.working_dir, PathBuf::from("/work"));
        assert_eq!(spec.prepare_dirs, vec![PathBuf::from("/work/build")]);
    }

    #[test]
    fn one_shot_uses_platform_shell() {
        let command = ShellKind::Unix.one_shot("echo hi");
        let std_command = command.as_std();
        assert_eq!(std_command.get_program(), "sh");
        let args: Vec<_> = std_command.get_args().collect();
        assert_eq!(args, vec!["-c", "echo hi"]);
    }
}
