//! Run state of one controller: at most one active job at a time.
//!
//! [`RunState`] is a plain value with pure transitions so the lifecycle can be
//! exercised without spawning anything. [`RunSession`] wraps it together with
//! the live process handle behind a mutex.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hdlrun_process::ProcessHandle;
use parking_lot::Mutex;

/// Identifier of a job, unique within one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Compile,
    Run,
}

/// One compile or run invocation for a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub file_base_name: String,
    pub source_extension: String,
    /// Part of a compile-all batch.
    pub bulk: bool,
    pub started_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Compiling(Job),
    Running(Job),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// Another job is active.
    Busy,
    /// The job being advanced from is no longer the active one.
    Inactive(JobId),
}

impl RunState {
    fn enter(job: Job) -> RunState {
        match job.kind {
            JobKind::Compile => RunState::Compiling(job),
            JobKind::Run => RunState::Running(job),
        }
    }

    /// Idle to active. Rejected while another job is active.
    pub fn begin(&self, job: Job) -> Result<RunState, TransitionError> {
        match self {
            RunState::Idle => Ok(RunState::enter(job)),
            _ => Err(TransitionError::Busy),
        }
    }

    /// Hand the slot from the active job `from` straight to `next` without
    /// passing through `Idle`.
    pub fn advance(&self, from: JobId, next: Job) -> Result<RunState, TransitionError> {
        match self.active_job() {
            Some(job) if job.id == from => Ok(RunState::enter(next)),
            _ => Err(TransitionError::Inactive(from)),
        }
    }

    /// Active job `id` closed. A stale id leaves the state unchanged.
    pub fn finish(&self, id: JobId) -> RunState {
        match self.active_job() {
            Some(job) if job.id == id => RunState::Idle,
            _ => self.clone(),
        }
    }

    pub fn stop(&self) -> RunState {
        RunState::Idle
    }

    pub fn active_job(&self) -> Option<&Job> {
        match self {
            RunState::Idle => None,
            RunState::Compiling(job) | RunState::Running(job) => Some(job),
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, RunState::Idle)
    }

    pub fn is_compiling(&self) -> bool {
        matches!(self, RunState::Compiling(_))
    }
}

#[derive(Debug, Default)]
struct Slot {
    state: RunState,
    process: Option<Arc<ProcessHandle>>,
}

/// The single active-job slot shared by a controller's workflows and `stop()`.
///
/// The lock is only ever held for the duration of a transition.
#[derive(Debug, Default)]
pub struct RunSession {
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

impl RunSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_job(
        &self,
        kind: JobKind,
        file_base_name: impl Into<String>,
        source_extension: impl Into<String>,
        bulk: bool,
    ) -> Job {
        Job {
            id: JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
            kind,
            file_base_name: file_base_name.into(),
            source_extension: source_extension.into(),
            bulk,
            started_at: Instant::now(),
        }
    }

    pub fn begin(&self, job: Job) -> Result<(), TransitionError> {
        let mut slot = self.slot.lock();
        slot.state = slot.state.begin(job)?;
        slot.process = None;
        Ok(())
    }

    pub fn advance(&self, from: JobId, next: Job) -> Result<(), TransitionError> {
        let mut slot = self.slot.lock();
        slot.state = slot.state.advance(from, next)?;
        slot.process = None;
        Ok(())
    }

    /// Record the process of active job `id`. Returns `false` when the job
    /// was stopped in the meantime; the caller then owns the termination.
    pub fn attach_process(&self, id: JobId, handle: Arc<ProcessHandle>) -> bool {
        let mut slot = self.slot.lock();
        match slot.state.active_job() {
            Some(job) if job.id == id => {
                slot.process = Some(handle);
                true
            }
            _ => false,
        }
    }

    /// Returns `true` when `id` was still the active job.
    pub fn finish(&self, id: JobId) -> bool {
        let mut slot = self.slot.lock();
        let was_active = slot.state.active_job().is_some_and(|job| job.id == id);
        slot.state = slot.state.finish(id);
        if was_active {
            slot.process = None;
        }
        was_active
    }

    /// Reset to `Idle`, killing the active process group if there is one.
    /// Returns the job that was stopped.
    pub fn stop(&self) -> Option<Job> {
        let (job, process) = {
            let mut slot = self.slot.lock();
            let job = slot.state.active_job().cloned();
            slot.state = slot.state.stop();
            (job, slot.process.take())
        };
        if let Some(process) = process {
            tracing::debug!(pid = process.pid(), "terminating active job");
            process.terminate();
        }
        job
    }

    /// Claim the slot for `job`. The slot is released when the returned guard
    /// is finished or dropped.
    pub fn claim(&self, job: Job) -> Result<JobSlot<'_>, TransitionError> {
        let id = job.id;
        self.begin(job)?;
        Ok(JobSlot {
            session: self,
            id,
            finished: false,
        })
    }

    /// Like `stop()`, but only while `id` is still the active job.
    fn abandon(&self, id: JobId) {
        let process = {
            let mut slot = self.slot.lock();
            if !slot.state.active_job().is_some_and(|job| job.id == id) {
                return;
            }
            slot.state = slot.state.stop();
            slot.process.take()
        };
        tracing::debug!(job = %id, "job abandoned, releasing slot");
        if let Some(process) = process {
            process.terminate();
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().state.is_running()
    }

    pub fn is_compiling(&self) -> bool {
        self.slot.lock().state.is_compiling()
    }

    pub fn is_active(&self, id: JobId) -> bool {
        self.slot
            .lock()
            .state
            .active_job()
            .is_some_and(|job| job.id == id)
    }

    pub fn state(&self) -> RunState {
        self.slot.lock().state.clone()
    }
}

/// Ownership of the active-job slot.
///
/// Dropping the guard without calling [`JobSlot::finish`] (the workflow future
/// was cancelled, or it returned early) resets the slot to `Idle` and kills the
/// attached process group, unless another job has taken over in between.
#[derive(Debug)]
pub struct JobSlot<'a> {
    session: &'a RunSession,
    id: JobId,
    finished: bool,
}

impl JobSlot<'_> {
    /// The job currently held by this guard.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Hand the slot to `next`. Fails when the held job was stopped.
    pub fn advance(&mut self, next: Job) -> Result<(), TransitionError> {
        let next_id = next.id;
        self.session.advance(self.id, next)?;
        self.id = next_id;
        Ok(())
    }

    /// Release the slot after the held job closed on its own. Returns `true`
    /// when the job was still active.
    pub fn finish(mut self) -> bool {
        self.finished = true;
        self.session.finish(self.id)
    }
}

impl Drop for JobSlot<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.abandon(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(session: &RunSession, kind: JobKind) -> Job {
        session.new_job(kind, "top", ".v", false)
    }

    #[test]
    fn compile_then_run_then_idle() {
        let session = RunSession::new();
        let compile = job(&session, JobKind::Compile);
        let run = job(&session, JobKind::Run);

        let state = RunState::Idle.begin(compile.clone());
        assert_eq!(state, Ok(RunState::Compiling(compile.clone())));

        let state = RunState::Compiling(compile.clone()).advance(compile.id, run.clone());
        assert_eq!(state, Ok(RunState::Running(run.clone())));

        assert_eq!(RunState::Running(run.clone()).finish(run.id), RunState::Idle);
    }

    #[test]
    fn begin_while_active_is_rejected() {
        let session = RunSession::new();
        let first = job(&session, JobKind::Compile);
        let second = job(&session, JobKind::Compile);

        let state = RunState::Compiling(first);
        assert_eq!(state.begin(second), Err(TransitionError::Busy));
        assert!(state.is_running());
        assert!(state.is_compiling());
    }

    #[test]
    fn stale_finish_is_ignored() {
        let session = RunSession::new();
        let old = job(&session, JobKind::Compile);
        let current = job(&session, JobKind::Run);

        let state = RunState::Running(current.clone());
        assert_eq!(state.finish(old.id), RunState::Running(current));
        assert_eq!(RunState::Idle.finish(old.id), RunState::Idle);
    }

    #[test]
    fn advance_after_stop_fails() {
        let session = RunSession::new();
        let compile = job(&session, JobKind::Compile);
        let run = job(&session, JobKind::Run);

        let stopped = RunState::Compiling(compile.clone()).stop();
        assert_eq!(
            stopped.advance(compile.id, run),
            Err(TransitionError::Inactive(compile.id))
        );
    }

    #[test]
    fn session_stop_while_idle_is_noop() {
        let session = RunSession::new();
        assert_eq!(session.stop(), None);
        assert_eq!(session.state(), RunState::Idle);
    }

    #[test]
    fn session_tracks_active_job() {
        let session = RunSession::new();
        let compile = job(&session, JobKind::Compile);
        let id = compile.id;

        assert!(session.begin(compile).is_ok());
        assert!(session.is_running());
        assert!(session.is_compiling());
        assert!(session.is_active(id));
        assert_eq!(
            session.begin(job(&session, JobKind::Compile)),
            Err(TransitionError::Busy)
        );

        assert!(session.finish(id));
        assert!(!session.is_running());
        assert!(!session.finish(id));
    }

    #[test]
    fn stop_resets_and_reports_job() {
        let session = RunSession::new();
        let run = job(&session, JobKind::Run);
        let id = run.id;
        assert!(session.begin(run).is_ok());

        let stopped = session.stop();
        assert_eq!(stopped.map(|job| job.id), Some(id));
        assert!(!session.is_running());
        assert!(!session.finish(id));
    }

    #[test]
    fn dropped_slot_returns_to_idle() {
        let session = RunSession::new();
        let compile = job(&session, JobKind::Compile);
        {
            let slot = session.claim(compile);
            assert!(slot.is_ok());
            assert!(session.is_compiling());
        }
        assert_eq!(session.state(), RunState::Idle);
        assert!(session.claim(job(&session, JobKind::Compile)).is_ok());
    }

    #[test]
    fn slot_follows_advance_and_finish() -> Result<(), TransitionError> {
        let session = RunSession::new();
        let compile = job(&session, JobKind::Compile);
        let run = job(&session, JobKind::Run);
        let run_id = run.id;

        let mut slot = session.claim(compile)?;
        slot.advance(run)?;
        assert_eq!(slot.id(), run_id);
        assert!(session.is_active(run_id));
        assert!(!session.is_compiling());

        assert!(slot.finish());
        assert_eq!(session.state(), RunState::Idle);
        Ok(())
    }

    #[test]
    fn stale_slot_does_not_release_a_newer_job() {
        let session = RunSession::new();
        let first = job(&session, JobKind::Compile);
        let second = job(&session, JobKind::Run);
        let second_id = second.id;

        let slot = session.claim(first);
        assert!(slot.is_ok());
        session.stop();
        assert!(session.begin(second).is_ok());
        drop(slot);

        assert!(session.is_active(second_id));
    }

    #[test]
    fn job_ids_are_unique() {
        let session = RunSession::new();
        let a = job(&session, JobKind::Compile);
        let b = job(&session, JobKind::Compile);
        assert_ne!(a.id, b.id);
    }
}
