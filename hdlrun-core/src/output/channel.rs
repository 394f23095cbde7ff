use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Indent, OutputSink, indent_chunk};

/// Line-oriented destination behind a [`ChannelSink`].
pub trait ChannelBackend: Send + Sync {
    fn write_line(&self, line: &str);

    fn clear(&self) {}

    fn reveal(&self, _preserve_focus: bool) {}
}

/// Writes the log to the process stdout.
#[derive(Debug, Default)]
pub struct ConsoleBackend;

impl ChannelBackend for ConsoleBackend {
    fn write_line(&self, line: &str) {
        let mut stdout = io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
            tracing::debug!(error = %err, "failed to write output line");
        }
    }
}

/// Keeps every line in memory, for hosts that render the log themselves.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    lines: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl ChannelBackend for MemoryBackend {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }

    fn clear(&self) {
        self.lines.lock().clear();
    }
}

/// Structured, append-only output panel.
///
/// Lines are forwarded to the backend and also recorded so the current
/// contents of the panel can be inspected. `clear()` empties both.
pub struct ChannelSink {
    backend: Arc<dyn ChannelBackend>,
    log: Mutex<Vec<String>>,
}

impl std::fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSink")
            .field("lines", &self.log.lock().len())
            .finish()
    }
}

impl ChannelSink {
    pub fn new(backend: Arc<dyn ChannelBackend>) -> Self {
        Self {
            backend,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the panel since the last clear.
    pub fn lines(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn push(&self, line: String) {
        self.backend.write_line(&line);
        self.log.lock().push(line);
    }
}

impl OutputSink for ChannelSink {
    fn show(&self, preserve_focus: bool) {
        self.backend.reveal(preserve_focus);
    }

    fn clear(&self) {
        self.log.lock().clear();
        self.backend.clear();
    }

    fn append_line(&self, line: &str) {
        self.push(line.to_string());
    }

    fn append_raw(&self, text: &str, indent: Indent) {
        if text.is_empty() {
            return;
        }
        for line in indent_chunk(text, indent) {
            self.push(line);
        }
    }

    fn observes_completion(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn raw_chunks_are_indented_line_by_line() {
        let backend = Arc::new(MemoryBackend::new());
        let sink = ChannelSink::new(backend.clone());

        sink.append_line("[Compile] top.v");
        sink.append_raw("line1\nline2\n", Indent::Single);
        sink.append_raw("bulk\n", Indent::Bulk);

        let expected = vec![
            "[Compile] top.v".to_string(),
            "  line1".to_string(),
            "  line2".to_string(),
            "    bulk".to_string(),
        ];
        assert_eq!(sink.lines(), expected);
        assert_eq!(backend.lines(), expected);
    }

    #[test]
    fn clear_empties_log_and_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let sink = ChannelSink::new(backend.clone());
        sink.append_line("stale");
        sink.clear();
        sink.append_line("fresh");

        assert_eq!(sink.lines(), vec!["fresh".to_string()]);
        assert_eq!(backend.lines(), vec!["fresh".to_string()]);
    }

    #[test]
    fn empty_chunk_is_skipped() {
        let sink = ChannelSink::new(Arc::new(MemoryBackend::new()));
        sink.append_raw("", Indent::Single);
        assert!(sink.lines().is_empty());
        assert!(sink.observes_completion());
    }
}
