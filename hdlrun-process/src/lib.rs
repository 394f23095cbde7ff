//! Shell command runner used by hdlrun to drive external HDL tools.
//!
//! Commands run through the platform shell inside their own process group so
//! that cancelling a job also stops anything the shell started. Output is
//! streamed per pipe as it arrives and the close event is delivered once, after
//! both pipes are drained.

pub mod command;
pub mod pipe;
pub mod process;
pub mod process_group;

pub use command::{CommandSpec, ShellKind};
pub use pipe::{spawn_interactive_shell, spawn_shell_command};
pub use process::{
    ChildTerminator, ProcessEvent, ProcessExit, ProcessHandle, ProcessOutcome, RunningProcess,
    StreamKind,
};
pub use process_group::ProcessGroup;
