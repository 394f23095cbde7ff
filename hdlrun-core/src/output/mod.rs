//! Where progress and tool output are written.
//!
//! Two sinks exist. [`ChannelSink`] is a structured, append-only log that the
//! controller can follow job by job. [`TerminalSink`] injects text into an
//! interactive shell and never learns whether a command succeeded.

mod channel;
mod terminal;

pub use channel::{ChannelBackend, ChannelSink, ConsoleBackend, MemoryBackend};
pub use terminal::{RecordingTerminal, ShellTerminal, TerminalAction, TerminalBackend, TerminalSink};

/// Indentation applied to output belonging to a single operation or to one
/// member of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indent {
    Single,
    Bulk,
}

impl Indent {
    pub fn for_bulk(bulk: bool) -> Self {
        if bulk { Indent::Bulk } else { Indent::Single }
    }

    /// Prefix for each line of tool output.
    pub fn chunk_prefix(self) -> &'static str {
        match self {
            Indent::Single => "  ",
            Indent::Bulk => "    ",
        }
    }

    /// Prefix for the `[Compile]` header and the summary line of a job.
    pub fn header_prefix(self) -> &'static str {
        match self {
            Indent::Single => "",
            Indent::Bulk => "  ",
        }
    }
}

/// Prefix every line of `text` with the indent, after dropping one trailing
/// newline so the chunk does not end in an empty line.
pub fn indent_chunk(text: &str, indent: Indent) -> Vec<String> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    let prefix = indent.chunk_prefix();
    body.split('\n')
        .map(|line| format!("{prefix}{}", line.strip_suffix('\r').unwrap_or(line)))
        .collect()
}

/// Common surface of the output panel implementations.
pub trait OutputSink: Send + Sync {
    /// Bring the panel to the front.
    fn show(&self, preserve_focus: bool);

    fn clear(&self);

    fn append_line(&self, line: &str);

    /// Append a chunk of tool output.
    fn append_raw(&self, text: &str, indent: Indent);

    /// Whether the controller may follow job completion through this sink.
    fn observes_completion(&self) -> bool;

    /// Release resources held by the sink.
    fn dispose(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_operation_uses_two_spaces() {
        assert_eq!(
            indent_chunk("line1\nline2\n", Indent::Single),
            vec!["  line1".to_string(), "  line2".to_string()]
        );
    }

    #[test]
    fn bulk_operation_uses_four_spaces() {
        assert_eq!(
            indent_chunk("line1\nline2\n", Indent::Bulk),
            vec!["    line1".to_string(), "    line2".to_string()]
        );
    }

    #[test]
    fn only_one_trailing_newline_is_dropped() {
        assert_eq!(
            indent_chunk("a\n\n", Indent::Single),
            vec!["  a".to_string(), "  ".to_string()]
        );
        assert_eq!(indent_chunk("partial", Indent::Single), vec!["  partial".to_string()]);
    }

    #[test]
    fn carriage_returns_are_not_kept() {
        assert_eq!(
            indent_chunk("warn\r\nnote\r\n", Indent::Single),
            vec!["  warn".to_string(), "  note".to_string()]
        );
    }

    #[test]
    fn header_prefix_only_for_bulk() {
        assert_eq!(Indent::for_bulk(false).header_prefix(), "");
        assert_eq!(Indent::for_bulk(true).header_prefix(), "  ");
    }
}
