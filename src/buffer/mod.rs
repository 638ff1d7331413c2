//! Per-stream output bookkeeping across session calls

mod ansi;
mod idle;

pub use ansi::{strip_ansi, AnsiStripper};
pub use idle::IdleTracker;

use crate::pattern::{Match, Matcher};
use bytes::{Bytes, BytesMut};

/// Output buffers of one child stream.
///
/// Each call sees only its own output: bytes read past the previous match
/// boundary wait in `remaining` and, unless the call asks for continuous
/// output, are set aside instead of being merged into the new result.
/// Peeked output is handed to the next call exactly once.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    /// Text captured by the call in progress.
    accumulated: BytesMut,
    /// Bytes past the last match boundary, for the next call.
    remaining: BytesMut,
    /// Output inspected by a peek, queued for the next call.
    peeked: BytesMut,
    /// Leftovers the current call set aside.
    previous: BytesMut,
    stripper: Option<AnsiStripper>,
}

impl StreamBuffer {
    /// Create a stream buffer, optionally stripping ANSI sequences on input
    pub fn new(strip_ansi: bool) -> Self {
        Self {
            stripper: strip_ansi.then(AnsiStripper::new),
            ..Self::default()
        }
    }

    fn filter(&mut self, data: &[u8]) -> Bytes {
        match &mut self.stripper {
            Some(stripper) => Bytes::from(stripper.strip(data)),
            None => Bytes::copy_from_slice(data),
        }
    }

    /// Queue output read before the call sends its input.
    ///
    /// Returns the bytes as they were stored, for printing.
    pub fn push_leftover(&mut self, data: &[u8]) -> Bytes {
        let chunk = self.filter(data);
        self.remaining.extend_from_slice(&chunk);
        chunk
    }

    /// All leftover bytes currently queued.
    pub fn leftover(&self) -> &[u8] {
        &self.remaining
    }

    /// Seed the call's result from peeked output and leftovers.
    pub fn begin_call(&mut self, continuous: bool) {
        self.accumulated = std::mem::take(&mut self.peeked);
        self.previous.clear();
        if continuous {
            self.accumulated.extend_from_slice(&self.remaining);
            self.remaining.clear();
        } else {
            self.previous = std::mem::take(&mut self.remaining);
        }
    }

    /// Append output read during the call.
    ///
    /// Returns the bytes as they were stored, for printing.
    pub fn append(&mut self, data: &[u8]) -> Bytes {
        let chunk = self.filter(data);
        self.accumulated.extend_from_slice(&chunk);
        chunk
    }

    /// Search the whole accumulated text, not only the newest chunk.
    pub fn find(&self, matcher: &dyn Matcher) -> Option<Match> {
        matcher.find(&self.accumulated)
    }

    /// Keep the text up to `end` as the result; the rest waits for the next call.
    pub fn split_at_match(&mut self, end: usize) {
        let tail = self.accumulated.split_off(end.min(self.accumulated.len()));
        self.remaining.extend_from_slice(&tail);
    }

    /// Close the call and hand out `(result, set_aside_leftovers)`.
    ///
    /// With `peek`, the result is also queued for the next call.
    pub fn finish_call(&mut self, peek: bool) -> (Bytes, Bytes) {
        let result = std::mem::take(&mut self.accumulated).freeze();
        if peek {
            self.peeked.extend_from_slice(&result);
        }
        let previous = std::mem::take(&mut self.previous).freeze();
        (result, previous)
    }

    /// Drop everything, for a fresh connection.
    pub fn reset(&mut self) {
        self.accumulated.clear();
        self.remaining.clear();
        self.peeked.clear();
        self.previous.clear();
        if let Some(stripper) = &mut self.stripper {
            *stripper = AnsiStripper::new();
        }
    }
}

/// Append-only log of everything the session produced.
#[derive(Debug, Default)]
pub struct Scrollback {
    enabled: bool,
    text: String,
}

impl Scrollback {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            text: String::new(),
        }
    }

    /// Record one finished call in chronological order.
    pub fn record(&mut self, previous: &[u8], current: &[u8]) {
        if !self.enabled {
            return;
        }
        self.text.push_str(&String::from_utf8_lossy(previous));
        self.text.push_str(&String::from_utf8_lossy(current));
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    fn prompt() -> Box<dyn Matcher> {
        Pattern::exact("$ ").to_matcher().unwrap()
    }

    #[test]
    fn test_match_splits_result_and_remaining() {
        let mut buffer = StreamBuffer::new(false);
        buffer.begin_call(false);
        buffer.append(b"hi\r\n$ late");

        let m = buffer.find(prompt().as_ref()).unwrap();
        buffer.split_at_match(m.end);
        let (result, previous) = buffer.finish_call(false);

        assert_eq!(&result[..], b"hi\r\n$ ");
        assert!(previous.is_empty());
        assert_eq!(buffer.leftover(), b"late");
    }

    #[test]
    fn test_leftover_isolated_by_default() {
        let mut buffer = StreamBuffer::new(false);
        buffer.push_leftover(b"old output");
        buffer.begin_call(false);
        buffer.append(b"new");

        let (result, previous) = buffer.finish_call(false);
        assert_eq!(&result[..], b"new");
        assert_eq!(&previous[..], b"old output");
        assert!(buffer.leftover().is_empty());
    }

    #[test]
    fn test_leftover_merged_in_continuous_mode() {
        let mut buffer = StreamBuffer::new(false);
        buffer.push_leftover(b"old ");
        buffer.begin_call(true);
        buffer.append(b"new");

        let (result, previous) = buffer.finish_call(false);
        assert_eq!(&result[..], b"old new");
        assert!(previous.is_empty());
    }

    #[test]
    fn test_peek_is_returned_exactly_once() {
        let mut buffer = StreamBuffer::new(false);
        buffer.begin_call(false);
        buffer.append(b"banner\n");
        let (peeked, _) = buffer.finish_call(true);
        assert_eq!(&peeked[..], b"banner\n");

        buffer.begin_call(false);
        let (first, _) = buffer.finish_call(false);
        assert_eq!(&first[..], b"banner\n");

        buffer.begin_call(false);
        let (second, _) = buffer.finish_call(false);
        assert!(second.is_empty());
    }

    #[test]
    fn test_peek_comes_before_leftover() {
        let mut buffer = StreamBuffer::new(false);
        buffer.begin_call(false);
        buffer.append(b"peeked ");
        buffer.finish_call(true);

        buffer.push_leftover(b"later");
        buffer.begin_call(true);
        let (result, _) = buffer.finish_call(false);
        assert_eq!(&result[..], b"peeked later");
    }

    #[test]
    fn test_strip_ansi_on_append() {
        let mut buffer = StreamBuffer::new(true);
        buffer.begin_call(false);
        let printed = buffer.append(b"\x1b[32mok\x1b[0m $ ");
        assert_eq!(&printed[..], b"ok $ ");
        assert!(buffer.find(prompt().as_ref()).is_some());
    }

    #[test]
    fn test_reset() {
        let mut buffer = StreamBuffer::new(false);
        buffer.push_leftover(b"x");
        buffer.begin_call(false);
        buffer.append(b"y");
        buffer.finish_call(true);
        buffer.reset();

        buffer.begin_call(true);
        let (result, previous) = buffer.finish_call(false);
        assert!(result.is_empty());
        assert!(previous.is_empty());
    }

    #[test]
    fn test_scrollback_keeps_order() {
        let mut scrollback = Scrollback::new(true);
        scrollback.record(b"leftover ", b"first ");
        scrollback.record(b"", b"second");
        assert_eq!(scrollback.as_str(), "leftover first second");

        scrollback.clear();
        assert!(scrollback.as_str().is_empty());
    }

    #[test]
    fn test_scrollback_disabled() {
        let mut scrollback = Scrollback::new(false);
        scrollback.record(b"a", b"b");
        assert!(scrollback.as_str().is_empty());
    }
}
