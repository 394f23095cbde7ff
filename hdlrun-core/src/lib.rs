//! Compile/run orchestration for the Icarus Verilog toolchain.
//!
//! The [`RunController`] builds commands with [`template`], spawns them through
//! `hdlrun-process`, follows their lifecycle in a [`RunSession`] and writes
//! formatted progress into an [`OutputSink`]. Everything editor specific sits
//! behind [`EditorHost`].

pub mod controller;
pub mod error;
pub mod host;
pub mod output;
pub mod session;
pub mod template;

pub use controller::{
    GIVE_UP_MARKER, JobReport, JobStatus, OutputMode, RunController, WorkflowReport,
    format_seconds,
};
pub use error::ControllerError;
pub use host::{DocumentHandle, EditorHost};
pub use output::{
    ChannelBackend, ChannelSink, ConsoleBackend, Indent, MemoryBackend, OutputSink,
    RecordingTerminal, ShellTerminal, TerminalAction, TerminalBackend, TerminalSink, indent_chunk,
};
pub use session::{Job, JobId, JobKind, JobSlot, RunSession, RunState, TransitionError};
pub use template::{
    BUILD_DIR, COMPILER, CommandTemplate, SIMULATOR, build_compile_command, build_run_command,
    select_executable,
};
