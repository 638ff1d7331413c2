//! Output sinks for session transcripts
//!
//! A session prints what it sends, what the child writes, and its own
//! warnings and errors through an [`OutputSink`]. The sink decides how (or
//! whether) each channel is shown; the returned [`Output`](crate::Output) of
//! a call is independent of what the sink does.

use crossterm::style::Stylize;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Channel of a transcript event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkChannel {
    /// Input sent to the child, and session notices
    Input,
    /// Child stdout
    Stdout,
    /// Child stderr
    Stderr,
    /// Non-fatal problems
    Warn,
    /// Failures
    Error,
    /// Headers and banners
    Notice,
}

/// Destination of a session transcript.
///
/// Every method has a no-op default, so a sink only implements the channels
/// it cares about.
pub trait OutputSink: Send + Sync + fmt::Debug {
    /// Input echoed to the user (commands, keystrokes, notices).
    fn input(&self, _text: &str) {}
    /// Child stdout.
    fn stdout(&self, _text: &str) {}
    /// Child stderr.
    fn stderr(&self, _text: &str) {}
    /// Warning.
    fn warn(&self, _text: &str) {}
    /// Error report.
    fn error(&self, _text: &str) {}
    /// Header or banner line.
    fn notice(&self, text: &str) {
        self.input(text);
    }

    /// Dispatch on a channel.
    fn emit(&self, channel: SinkChannel, text: &str) {
        match channel {
            SinkChannel::Input => self.input(text),
            SinkChannel::Stdout => self.stdout(text),
            SinkChannel::Stderr => self.stderr(text),
            SinkChannel::Warn => self.warn(text),
            SinkChannel::Error => self.error(text),
            SinkChannel::Notice => self.notice(text),
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {}

/// Sink printing to the local console, one colour per channel.
///
/// Child output is written as is; warnings and errors go to stderr on their
/// own lines. While the console bridge holds the terminal in raw mode, line
/// feeds are expanded to CR LF.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    fn write_out(text: &str) {
        let text = crate::console::expand_newlines(text);
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn write_err(text: &str) {
        let text = crate::console::expand_newlines(text);
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(text.as_bytes());
        let _ = err.flush();
    }
}

impl OutputSink for ConsoleSink {
    fn input(&self, text: &str) {
        Self::write_out(&text.cyan().to_string());
    }

    fn stdout(&self, text: &str) {
        Self::write_out(text);
    }

    fn stderr(&self, text: &str) {
        Self::write_err(&text.magenta().to_string());
    }

    fn warn(&self, text: &str) {
        Self::write_err(&format!("{}\n", format!("WARNING: {}", text).yellow()));
    }

    fn error(&self, text: &str) {
        Self::write_err(&format!("{}\n", format!("ERROR: {}", text).red()));
    }

    fn notice(&self, text: &str) {
        Self::write_out(&format!("\n{}\n", text.green().bold()));
    }
}

/// Sink that records every event in order.
///
/// Used to buffer the transcript of a parallel job and replay it later in
/// one block, and to inspect transcripts in tests.
#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    events: Arc<Mutex<Vec<(SinkChannel, String)>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, channel: SinkChannel, text: &str) {
        if let Ok(mut events) = self.events.lock() {
            match events.last_mut() {
                Some((last, buffered)) if *last == channel => buffered.push_str(text),
                _ => events.push((channel, text.to_string())),
            }
        }
    }

    /// Recorded events, adjacent events of one channel merged.
    pub fn events(&self) -> Vec<(SinkChannel, String)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// All text recorded on one channel.
    pub fn text(&self, channel: SinkChannel) -> String {
        self.events()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, text)| text)
            .collect()
    }

    /// Send every recorded event to another sink, in order, and forget them.
    pub fn drain_into(&self, sink: &dyn OutputSink) {
        let events = match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => return,
        };
        for (channel, text) in events {
            sink.emit(channel, &text);
        }
    }
}

impl OutputSink for CaptureSink {
    fn input(&self, text: &str) {
        self.push(SinkChannel::Input, text);
    }

    fn stdout(&self, text: &str) {
        self.push(SinkChannel::Stdout, text);
    }

    fn stderr(&self, text: &str) {
        self.push(SinkChannel::Stderr, text);
    }

    fn warn(&self, text: &str) {
        self.push(SinkChannel::Warn, text);
    }

    fn error(&self, text: &str) {
        self.push(SinkChannel::Error, text);
    }

    fn notice(&self, text: &str) {
        self.push(SinkChannel::Notice, text);
    }
}

/// Sink view that hides child output but keeps everything else.
#[derive(Debug)]
pub(crate) struct HideOutput<'a>(pub &'a dyn OutputSink);

impl OutputSink for HideOutput<'_> {
    fn input(&self, text: &str) {
        self.0.input(text);
    }

    fn warn(&self, text: &str) {
        self.0.warn(text);
    }

    fn error(&self, text: &str) {
        self.0.error(text);
    }

    fn notice(&self, text: &str) {
        self.0.notice(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_merges_adjacent_events() {
        let sink = CaptureSink::new();
        sink.stdout("a");
        sink.stdout("b");
        sink.stderr("c");
        sink.stdout("d");

        assert_eq!(
            sink.events(),
            vec![
                (SinkChannel::Stdout, "ab".to_string()),
                (SinkChannel::Stderr, "c".to_string()),
                (SinkChannel::Stdout, "d".to_string()),
            ]
        );
        assert_eq!(sink.text(SinkChannel::Stdout), "abd");
    }

    #[test]
    fn test_drain_into_replays_in_order() {
        let job = CaptureSink::new();
        job.stdout("out");
        job.warn("careful");

        let parent = CaptureSink::new();
        job.drain_into(&parent);

        assert_eq!(parent.text(SinkChannel::Stdout), "out");
        assert_eq!(parent.text(SinkChannel::Warn), "careful");
        assert!(job.events().is_empty());
    }

    #[test]
    fn test_hide_output_filters_child_streams() {
        let inner = CaptureSink::new();
        let hidden = HideOutput(&inner);
        hidden.stdout("secret");
        hidden.stderr("noise");
        hidden.warn("shown");

        assert!(inner.text(SinkChannel::Stdout).is_empty());
        assert!(inner.text(SinkChannel::Stderr).is_empty());
        assert_eq!(inner.text(SinkChannel::Warn), "shown");
    }

    #[test]
    fn test_notice_defaults_to_input() {
        #[derive(Debug, Default)]
        struct InputOnly(Mutex<String>);
        impl OutputSink for InputOnly {
            fn input(&self, text: &str) {
                self.0.lock().unwrap().push_str(text);
            }
        }

        let sink = InputOnly::default();
        sink.notice("attached");
        assert_eq!(*sink.0.lock().unwrap(), "attached");
    }
}
