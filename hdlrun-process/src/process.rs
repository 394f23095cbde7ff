//! Process handle and event types shared by the spawn helpers.
//!
//! A spawned command is split in two halves:
//! - [`ProcessHandle`] owns the process group and can be shared (behind an
//!   `Arc`) with whoever needs to cancel the job.
//! - [`RunningProcess`] owns the event receiver and is consumed by the task
//!   that streams output and waits for the close event.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Trait for process termination strategies.
pub trait ChildTerminator: Send + Sync {
    /// Kill the child process and everything it spawned.
    fn kill(&mut self) -> io::Result<()>;
}

/// Which pipe a chunk of output arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Exit information delivered once, after both output streams are drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal or could not be reaped.
    pub code: Option<i32>,
    /// Time from spawn to the close event.
    pub elapsed: Duration,
}

impl ProcessExit {
    /// Exit code with `-1` standing in for "no code".
    pub fn code_or_default(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Events emitted by a running process, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output { stream: StreamKind, text: String },
    Closed(ProcessExit),
}

/// Everything a process produced, collected after it closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub stdout_chunks: Vec<String>,
    pub stderr_chunks: Vec<String>,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn stdout(&self) -> String {
        self.stdout_chunks.concat()
    }

    pub fn stderr(&self) -> String {
        self.stderr_chunks.concat()
    }
}

/// Ownership of a spawned OS process and its process group.
///
/// `terminate()` is idempotent; dropping the last reference terminates the
/// group as well.
pub struct ProcessHandle {
    pid: u32,
    killer: Mutex<Option<Box<dyn ChildTerminator>>>,
    writer_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl ProcessHandle {
    pub fn new(
        pid: u32,
        killer: Box<dyn ChildTerminator>,
        writer_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
        tasks: Vec<AbortHandle>,
    ) -> Self {
        Self {
            pid,
            killer: Mutex::new(Some(killer)),
            writer_tx,
            tasks: Mutex::new(tasks),
        }
    }

    /// Process id of the group leader (also the process group id on Unix).
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// True once `terminate()` has been called.
    pub fn is_terminated(&self) -> bool {
        self.killer.lock().is_none()
    }

    /// Kill the process group.
    ///
    /// The reader and wait tasks are left running so the close event is still
    /// delivered once the pipes shut. A group that already exited is not an
    /// error.
    pub fn terminate(&self) {
        let killer = self.killer.lock().take();
        if let Some(mut killer) = killer {
            if let Err(err) = killer.kill() {
                tracing::debug!(pid = self.pid, error = %err, "process group kill failed");
            }
        }
    }

    /// Queue bytes for the child's stdin. Returns `false` when stdin is not
    /// piped or the child stopped reading.
    pub fn write(&self, bytes: impl Into<Vec<u8>>) -> bool {
        match &self.writer_tx {
            Some(tx) => tx.send(bytes.into()).is_ok(),
            None => false,
        }
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
        self.abort_tasks();
    }
}

/// A spawned process together with its event stream.
#[derive(Debug)]
pub struct RunningProcess {
    handle: Arc<ProcessHandle>,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    closed: bool,
}

impl RunningProcess {
    pub fn new(handle: Arc<ProcessHandle>, events: mpsc::UnboundedReceiver<ProcessEvent>) -> Self {
        Self {
            handle,
            events,
            closed: false,
        }
    }

    /// Shared handle used to cancel the process from elsewhere.
    pub fn handle(&self) -> Arc<ProcessHandle> {
        Arc::clone(&self.handle)
    }

    /// Next output chunk or the close event. Returns `None` after `Closed` has
    /// been delivered, so the close event is observed exactly once.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.closed {
            return None;
        }
        let event = self.events.recv().await;
        match event {
            Some(ProcessEvent::Closed(_)) => self.closed = true,
            Some(ProcessEvent::Output { .. }) => {}
            None => self.closed = true,
        }
        event
    }

    /// Drain the process until it closes, collecting chunks per stream.
    pub async fn wait_with_output(mut self) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        while let Some(event) = self.next_event().await {
            match event {
                ProcessEvent::Output {
                    stream: StreamKind::Stdout,
                    text,
                } => outcome.stdout_chunks.push(text),
                ProcessEvent::Output {
                    stream: StreamKind::Stderr,
                    text,
                } => outcome.stderr_chunks.push(text),
                ProcessEvent::Closed(exit) => {
                    outcome.exit_code = exit.code;
                    outcome.elapsed = exit.elapsed;
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTerminator(Arc<AtomicUsize>);

    impl ChildTerminator for CountingTerminator {
        fn kill(&mut self) -> io::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let kills = Arc::new(AtomicUsize::new(0));
        let handle = ProcessHandle::new(
            42,
            Box::new(CountingTerminator(Arc::clone(&kills))),
            None,
            vec![tokio::spawn(async {}).abort_handle()],
        );

        assert!(!handle.is_terminated());
        handle.terminate();
        handle.terminate();
        drop(handle);

        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_event_is_observed_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(ProcessHandle::new(
            1,
            Box::new(CountingTerminator(Arc::new(AtomicUsize::new(0)))),
            None,
            Vec::new(),
        ));
        let exit = ProcessExit {
            code: Some(0),
            elapsed: Duration::from_millis(5),
        };
        tx.send(ProcessEvent::Output {
            stream: StreamKind::Stderr,
            text: "warning\n".into(),
        })
        .ok();
        tx.send(ProcessEvent::Closed(exit)).ok();
        tx.send(ProcessEvent::Closed(exit)).ok();

        let outcome = RunningProcess::new(handle, rx).wait_with_output().await;
        assert_eq!(outcome.stderr_chunks, vec!["warning\n".to_string()]);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[test]
    fn missing_code_maps_to_minus_one() {
        let exit = ProcessExit {
            code: None,
            elapsed: Duration::ZERO,
        };
        assert_eq!(exit.code_or_default(), -1);
        assert!(!exit.success());
    }
}
