//! Compile/run orchestration.
//!
//! [`RunController`] owns the single job slot and drives the two workflows:
//! compile-then-run for one file and compile-all for a directory. Output goes
//! to the channel sink, where every job is followed to completion, or to the
//! terminal sink, where commands are typed into a shell and forgotten.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdlrun_config::ConfigSnapshot;
use hdlrun_process::{
    CommandSpec, ProcessEvent, ProcessExit, ShellKind, StreamKind, spawn_shell_command,
};
use parking_lot::RwLock;

use crate::error::ControllerError;
use crate::host::{DocumentHandle, EditorHost};
use crate::output::{Indent, OutputSink};
use crate::session::{Job, JobId, JobKind, RunSession, RunState, TransitionError};
use crate::template::{BUILD_DIR, CommandTemplate};

/// Text the compiler prints when it aborts, sometimes with exit code 0.
pub const GIVE_UP_MARKER: &str = "I give up.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Channel,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed,
    /// Killed by `stop()` before it closed on its own.
    Stopped,
}

/// Outcome of one followed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub id: JobId,
    pub kind: JobKind,
    /// Source file name, or the artifact base name for run jobs.
    pub file_name: String,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
    pub status: JobStatus,
}

/// What a workflow did. In terminal mode no jobs are followed, so `jobs` is
/// always empty there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    pub mode: OutputMode,
    pub jobs: Vec<JobReport>,
    pub stopped: bool,
}

impl WorkflowReport {
    fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            jobs: Vec::new(),
            stopped: false,
        }
    }

    /// True when every followed job succeeded and nothing was stopped.
    pub fn succeeded(&self) -> bool {
        !self.stopped && self.jobs.iter().all(|job| job.status == JobStatus::Succeeded)
    }
}

/// Failure detection for one compile job. Once failed, always failed.
#[derive(Debug, Default)]
struct CompileVerdict {
    failed: bool,
    tail: String,
}

impl CompileVerdict {
    fn observe(&mut self, stream: StreamKind, text: &str) {
        if stream == StreamKind::Stderr && !text.is_empty() {
            self.failed = true;
        }

        // The marker can straddle two chunks of the same stream.
        let window = format!("{}{text}", self.tail);
        if window.contains(GIVE_UP_MARKER) {
            self.failed = true;
        }
        let keep = GIVE_UP_MARKER.len().saturating_sub(1);
        let cut = window.len().saturating_sub(keep);
        let cut = (cut..=window.len())
            .find(|idx| window.is_char_boundary(*idx))
            .unwrap_or(window.len());
        self.tail = window.get(cut..).unwrap_or_default().to_string();
    }

    fn close(&mut self, exit: &ProcessExit) {
        if !exit.success() {
            self.failed = true;
        }
    }

    fn fail(&mut self) {
        self.failed = true;
    }
}

/// Seconds with up to millisecond precision and no trailing zeros: `2`,
/// `1.5`, `0.123`.
pub fn format_seconds(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    let secs = millis / 1000;
    let frac = millis % 1000;
    if frac == 0 {
        return secs.to_string();
    }
    let frac = format!("{frac:03}");
    format!("{secs}.{}", frac.trim_end_matches('0'))
}

/// Orchestrates compile and run jobs for one editor session.
pub struct RunController {
    host: Arc<dyn EditorHost>,
    config: RwLock<Arc<ConfigSnapshot>>,
    session: RunSession,
    channel: Arc<dyn OutputSink>,
    terminal: Arc<dyn OutputSink>,
    shell: ShellKind,
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("config", &self.config.read())
            .field("session", &self.session)
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

impl RunController {
    pub fn new(
        host: Arc<dyn EditorHost>,
        config: ConfigSnapshot,
        channel: Arc<dyn OutputSink>,
        terminal: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            host,
            config: RwLock::new(Arc::new(config)),
            session: RunSession::new(),
            channel,
            terminal,
            shell: ShellKind::detect(),
        }
    }

    /// Shell family used for spawned jobs and terminal commands.
    pub fn with_shell(mut self, shell: ShellKind) -> Self {
        self.shell = shell;
        self
    }

    /// Replace the configuration used by workflows started from now on.
    pub fn set_config(&self, config: ConfigSnapshot) {
        *self.config.write() = Arc::new(config);
    }

    pub fn config(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.config.read())
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn is_compiling(&self) -> bool {
        self.session.is_compiling()
    }

    pub fn state(&self) -> RunState {
        self.session.state()
    }

    /// Compile `target` (or the active file) and then execute the result.
    pub async fn run(&self, target: Option<&Path>) -> Result<WorkflowReport, ControllerError> {
        self.ensure_idle()?;
        let document = self.resolve_document(target).await?;
        let config = self.config();
        let template = CommandTemplate::new(&config);
        tracing::info!(file = %document.path().display(), "run requested");

        if config.run_in_terminal {
            if let Some(sink) = self.untracked_sink() {
                self.type_run(sink, &config, &template, &document);
                return Ok(WorkflowReport::new(OutputMode::Terminal));
            }
        }

        self.follow_run(&config, &template, &document).await
    }

    /// Compile every supported file directly inside `target_dir` (or the
    /// directory of the active file).
    pub async fn compile_all(
        &self,
        target_dir: Option<&Path>,
    ) -> Result<WorkflowReport, ControllerError> {
        self.ensure_idle()?;
        let dir = self.resolve_directory(target_dir)?;
        let config = self.config();
        let template = CommandTemplate::new(&config);
        let files = self.list_sources(&dir, &config).await?;
        tracing::info!(dir = %dir.display(), files = files.len(), "compile-all requested");

        if config.run_in_terminal {
            if let Some(sink) = self.untracked_sink() {
                if config.clear_previous_output {
                    sink.clear();
                }
                // Progress markers still go to the channel; the commands
                // themselves are only typed.
                self.channel.append_line("[Compiling Started]");
                self.channel.append_line("");
                let started = Instant::now();
                for file in &files {
                    let document = DocumentHandle::new(dir.join(file));
                    self.type_compile(sink, &config, &template, &document, true);
                }
                self.append_batch_summary(started);
                return Ok(WorkflowReport::new(OutputMode::Terminal));
            }
        }

        self.follow_batch(&config, &template, &dir, &files).await
    }

    /// Kill the active job, if any, and return to `Idle`.
    pub fn stop(&self) {
        if let Some(job) = self.session.stop() {
            tracing::info!(job = %job.id, kind = ?job.kind, file = %job.file_base_name, "stopped");
        }
    }

    /// Stop and release both sinks.
    pub fn dispose(&self) {
        self.stop();
        self.channel.dispose();
        self.terminal.dispose();
    }

    fn ensure_idle(&self) -> Result<(), ControllerError> {
        if self.session.is_running() {
            return Err(self.reject(ControllerError::AlreadyRunning));
        }
        Ok(())
    }

    fn reject(&self, err: ControllerError) -> ControllerError {
        tracing::warn!(error = %err, "request rejected");
        self.host.notify_user(&err.to_string());
        err
    }

    fn busy(&self, err: TransitionError) -> ControllerError {
        tracing::debug!(?err, "job slot taken");
        self.reject(ControllerError::AlreadyRunning)
    }

    /// The terminal sink, unless it turns out to report completion after all.
    fn untracked_sink(&self) -> Option<&dyn OutputSink> {
        (!self.terminal.observes_completion()).then_some(self.terminal.as_ref())
    }

    async fn resolve_document(
        &self,
        target: Option<&Path>,
    ) -> Result<DocumentHandle, ControllerError> {
        let active = self.host.active_file();
        match (target, active) {
            (Some(target), Some(active)) if active == target => Ok(DocumentHandle::new(active)),
            (Some(target), _) => self.host.open_file(target).await.map_err(|err| {
                self.reject(ControllerError::OpenFailed {
                    path: target.to_path_buf(),
                    message: format!("{err:#}"),
                })
            }),
            (None, Some(active)) => Ok(DocumentHandle::new(active)),
            (None, None) => Err(self.reject(ControllerError::NoTarget)),
        }
    }

    fn resolve_directory(&self, target_dir: Option<&Path>) -> Result<PathBuf, ControllerError> {
        if let Some(dir) = target_dir {
            return Ok(dir.to_path_buf());
        }
        match self.host.active_file() {
            Some(active) => Ok(DocumentHandle::new(active).directory().to_path_buf()),
            None => Err(self.reject(ControllerError::NoTarget)),
        }
    }

    /// File names directly inside `dir` with a supported extension, in
    /// directory listing order.
    async fn list_sources(
        &self,
        dir: &Path,
        config: &ConfigSnapshot,
    ) -> Result<Vec<String>, ControllerError> {
        let list_failed = |err: std::io::Error| {
            self.reject(ControllerError::ListFailed {
                path: dir.to_path_buf(),
                message: err.to_string(),
            })
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(list_failed)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_failed)? {
            let path = entry.path();
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            let document = DocumentHandle::new(&path);
            if config.is_supported_extension(&document.extension()) {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(files)
    }

    fn mkdir_build(&self) -> String {
        match self.shell {
            ShellKind::Unix => format!("mkdir -p {BUILD_DIR}"),
            ShellKind::Windows => format!("if not exist {BUILD_DIR} mkdir {BUILD_DIR}"),
        }
    }

    fn type_compile(
        &self,
        sink: &dyn OutputSink,
        config: &ConfigSnapshot,
        template: &CommandTemplate,
        document: &DocumentHandle,
        bulk: bool,
    ) {
        if config.clear_previous_output && !bulk {
            sink.clear();
        }
        sink.show(config.preserve_focus);
        sink.append_line(&format!("cd \"{}\"", document.directory().display()));
        sink.append_line(&self.mkdir_build());
        sink.append_line(&template.compile_command(
            &document.base_name(),
            &document.extension(),
            bulk,
        ));
    }

    fn type_run(
        &self,
        sink: &dyn OutputSink,
        config: &ConfigSnapshot,
        template: &CommandTemplate,
        document: &DocumentHandle,
    ) {
        self.type_compile(sink, config, template, document, false);
        sink.append_line(&format!("cd {BUILD_DIR}"));
        sink.append_line(&template.run_command(&document.base_name()));
    }

    async fn follow_run(
        &self,
        config: &ConfigSnapshot,
        template: &CommandTemplate,
        document: &DocumentHandle,
    ) -> Result<WorkflowReport, ControllerError> {
        let mut report = WorkflowReport::new(OutputMode::Channel);
        let base = document.base_name();
        let ext = document.extension();
        let dir = document.directory();

        let compile = self.session.new_job(JobKind::Compile, &base, &ext, false);
        let mut slot = self
            .session
            .claim(compile.clone())
            .map_err(|err| self.busy(err))?;

        if config.clear_previous_output {
            self.channel.clear();
        }
        let compile_report = self.compile_job(config, template, dir, &compile).await;
        let compile_stopped = compile_report.status == JobStatus::Stopped;
        report.jobs.push(compile_report);
        if compile_stopped {
            report.stopped = true;
            return Ok(report);
        }

        // A failed compile does not skip the run step.
        let run = self.session.new_job(JobKind::Run, &base, &ext, false);
        if slot.advance(run.clone()).is_err() {
            report.stopped = true;
            return Ok(report);
        }

        let run_report = self.run_job(template, dir, &run).await;
        report.stopped = run_report.status == JobStatus::Stopped;
        report.jobs.push(run_report);
        slot.finish();
        tracing::info!(file = %document.path().display(), "run finished");
        Ok(report)
    }

    async fn follow_batch(
        &self,
        config: &ConfigSnapshot,
        template: &CommandTemplate,
        dir: &Path,
        files: &[String],
    ) -> Result<WorkflowReport, ControllerError> {
        let mut report = WorkflowReport::new(OutputMode::Channel);
        let jobs: Vec<Job> = files
            .iter()
            .map(|file| {
                let document = DocumentHandle::new(dir.join(file));
                self.session.new_job(
                    JobKind::Compile,
                    document.base_name(),
                    document.extension(),
                    true,
                )
            })
            .collect();

        // Claim the slot before touching the panel.
        let mut slot = match jobs.first() {
            Some(first) => Some(
                self.session
                    .claim(first.clone())
                    .map_err(|err| self.busy(err))?,
            ),
            None => {
                self.ensure_idle()?;
                None
            }
        };

        if config.clear_previous_output {
            self.channel.clear();
        }
        self.channel.append_line("[Compiling Started]");
        self.channel.append_line("");
        let started = Instant::now();

        for (index, job) in jobs.iter().enumerate() {
            if index > 0 {
                let advanced = slot.as_mut().map(|slot| slot.advance(job.clone()));
                if !matches!(advanced, Some(Ok(()))) {
                    report.stopped = true;
                    break;
                }
            }

            let job_report = self.compile_job(config, template, dir, job).await;
            let stopped = job_report.status == JobStatus::Stopped;
            report.jobs.push(job_report);
            if stopped {
                report.stopped = true;
                break;
            }
        }
        if let Some(slot) = slot {
            slot.finish();
        }

        self.append_batch_summary(started);
        tracing::info!(dir = %dir.display(), jobs = report.jobs.len(), "compile-all finished");
        Ok(report)
    }

    fn append_batch_summary(&self, started: Instant) {
        self.channel.append_line(&format!(
            "[Done] Compiling Done in {} seconds",
            format_seconds(started.elapsed())
        ));
        self.channel.append_line("");
    }

    async fn compile_job(
        &self,
        config: &ConfigSnapshot,
        template: &CommandTemplate,
        dir: &Path,
        job: &Job,
    ) -> JobReport {
        let indent = Indent::for_bulk(job.bulk);
        let header = indent.header_prefix();
        let file_name = format!("{}{}", job.file_base_name, job.source_extension);

        self.channel.show(config.preserve_focus);
        self.channel.append_line(&format!("{header}[Compile] {file_name}"));

        let spec = CommandSpec::new(
            template.compile_command(&job.file_base_name, &job.source_extension, job.bulk),
            dir,
        )
        .with_shell(self.shell)
        .prepare_dir(dir.join(BUILD_DIR));

        let mut verdict = CompileVerdict::default();
        let exit = self.follow_process(job, &spec, indent, &mut verdict).await;
        verdict.close(&exit);

        let label = if verdict.failed { "[Error]" } else { "[Done]" };
        self.channel.append_line(&format!(
            "{header}{label} exit with code={} in {} seconds",
            exit.code_or_default(),
            format_seconds(exit.elapsed)
        ));
        self.channel.append_line("");

        let status = if !self.session.is_active(job.id) {
            JobStatus::Stopped
        } else if verdict.failed {
            JobStatus::Failed
        } else {
            JobStatus::Succeeded
        };
        JobReport {
            id: job.id,
            kind: job.kind,
            file_name,
            exit_code: exit.code,
            elapsed: exit.elapsed,
            status,
        }
    }

    async fn run_job(&self, template: &CommandTemplate, dir: &Path, job: &Job) -> JobReport {
        let indent = Indent::Single;
        self.channel
            .append_line(&format!("[Run] {}", job.file_base_name));

        let spec = CommandSpec::new(
            template.run_command(&job.file_base_name),
            dir.join(BUILD_DIR),
        )
        .with_shell(self.shell);

        // Simulator diagnostics on stderr are ordinary output.
        let mut ignored = CompileVerdict::default();
        let exit = self.follow_process(job, &spec, indent, &mut ignored).await;

        self.channel.append_line(&format!(
            "[Done] exit with code={} in {} seconds",
            exit.code_or_default(),
            format_seconds(exit.elapsed)
        ));
        self.channel.append_line("");

        let status = if !self.session.is_active(job.id) {
            JobStatus::Stopped
        } else if exit.success() {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
        JobReport {
            id: job.id,
            kind: job.kind,
            file_name: job.file_base_name.clone(),
            exit_code: exit.code,
            elapsed: exit.elapsed,
            status,
        }
    }

    /// Spawn the job's process, stream its output into the channel and wait
    /// for the close event.
    async fn follow_process(
        &self,
        job: &Job,
        spec: &CommandSpec,
        indent: Indent,
        verdict: &mut CompileVerdict,
    ) -> ProcessExit {
        let started = Instant::now();
        tracing::debug!(job = %job.id, command = %spec.command, cwd = %spec.working_dir.display(), "spawning");

        let mut process = match spawn_shell_command(spec).await {
            Ok(process) => process,
            Err(err) => {
                tracing::warn!(job = %job.id, error = %err, "spawn failed");
                self.channel.append_raw(&format!("{err:#}\n"), indent);
                verdict.fail();
                return ProcessExit {
                    code: None,
                    elapsed: started.elapsed(),
                };
            }
        };

        let handle = process.handle();
        if !self.session.attach_process(job.id, Arc::clone(&handle)) {
            handle.terminate();
        }

        let mut exit = None;
        while let Some(event) = process.next_event().await {
            match event {
                ProcessEvent::Output { stream, text } => {
                    verdict.observe(stream, &text);
                    self.channel.append_raw(&text, indent);
                }
                ProcessEvent::Closed(closed) => exit = Some(closed),
            }
        }
        let exit = exit.unwrap_or(ProcessExit {
            code: None,
            elapsed: started.elapsed(),
        });
        tracing::debug!(job = %job.id, code = ?exit.code, elapsed = ?exit.elapsed, "closed");
        exit
    }
}
