//! Interactive console bridge
//!
//! Hands the local terminal to a session: the terminal is put into raw,
//! non-blocking mode, every keystroke is pumped into a [`KeyFeed`], and the
//! session forwards it to the child through its interception path.

#[cfg(unix)]
mod raw;

#[cfg(unix)]
pub use raw::TerminalMode;

use crate::result::Output;
use bytes::Bytes;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// Interrupt (Ctrl-C).
pub const CTRL_C: u8 = 0x03;
/// End of transmission (Ctrl-D).
pub const CTRL_D: u8 = 0x04;
/// Detach from an interactive call (Ctrl-]).
pub const CTRL_SQUARE: u8 = 0x1D;

static RAW_MODE: AtomicBool = AtomicBool::new(false);

/// True while a [`TerminalMode`] guard holds the local terminal in raw mode.
pub fn raw_mode_active() -> bool {
    RAW_MODE.load(Ordering::SeqCst)
}

pub(crate) fn set_raw_mode_active(active: bool) {
    RAW_MODE.store(active, Ordering::SeqCst);
}

/// Expand `\n` to `\r\n` while the terminal is in raw mode.
///
/// Existing `\r\n` pairs are left alone.
pub fn expand_newlines(text: &str) -> Cow<'_, str> {
    if !raw_mode_active() || !text.contains('\n') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev = '\0';
    for c in text.chars() {
        if c == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(c);
        prev = c;
    }
    Cow::Owned(out)
}

/// Stream of keystrokes to intercept into a session call.
///
/// Built either from the local terminal ([`KeyFeed::from_terminal`]) or from
/// a channel ([`KeyFeed::channel`]) for scripted input.
#[derive(Debug)]
pub struct KeyFeed {
    rx: UnboundedReceiver<Bytes>,
    closed: bool,
    stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl KeyFeed {
    /// A feed driven by the returned sender.
    pub fn channel() -> (UnboundedSender<Bytes>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx,
                closed: false,
                stop: Arc::new(AtomicBool::new(false)),
                pump: None,
            },
        )
    }

    /// A feed reading keystrokes from the terminal held by `mode`.
    #[cfg(unix)]
    pub fn from_terminal(mode: &TerminalMode) -> std::io::Result<Self> {
        let tty = mode.try_clone_tty()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let pump = raw::spawn_key_pump(tty, tx, Arc::clone(&stop))?;
        Ok(Self {
            rx,
            closed: false,
            stop,
            pump: Some(pump),
        })
    }

    /// False once every sender is gone and the queue is empty.
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Wait for the next keystrokes.
    pub(crate) async fn recv(&mut self) -> Option<Bytes> {
        let chunk = self.rx.recv().await;
        if chunk.is_none() {
            self.closed = true;
        }
        chunk
    }

    /// Keystrokes already queued, without waiting.
    pub(crate) fn try_take(&mut self) -> Option<Bytes> {
        match self.rx.try_recv() {
            Ok(bytes) => Some(bytes),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }
}

impl Drop for KeyFeed {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.rx.close();
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

/// Result of [`Session::console`](crate::Session::console).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleOutcome {
    /// Output captured while attached.
    pub output: Output,
    /// Lines typed by the user, set when the console was detached with Ctrl-].
    pub steps: Option<Vec<String>>,
}

impl ConsoleOutcome {
    pub(crate) fn new(output: Output) -> Self {
        let steps = output.intercepted.as_deref().map(split_steps);
        Self { output, steps }
    }

    /// True when the user detached with Ctrl-].
    pub fn detached(&self) -> bool {
        self.steps.is_some()
    }
}

/// Split typed keys into lines, treating `\r`, `\n` and `\r\n` alike.
fn split_steps(keys: &str) -> Vec<String> {
    let keys = keys.replace("\r\n", "\n");
    let mut steps: Vec<String> = keys.split(['\r', '\n']).map(str::to_string).collect();
    if steps.last().is_some_and(|s| s.is_empty()) {
        steps.pop();
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::EndReason;

    #[test]
    fn test_expand_newlines_only_in_raw_mode() {
        set_raw_mode_active(false);
        assert_eq!(expand_newlines("a\nb"), "a\nb");

        set_raw_mode_active(true);
        assert_eq!(expand_newlines("a\nb\r\nc"), "a\r\nb\r\nc");
        set_raw_mode_active(false);
    }

    #[test]
    fn test_channel_feed() {
        let (tx, mut feed) = KeyFeed::channel();
        assert!(feed.try_take().is_none());
        tx.send(Bytes::from_static(b"ls\r")).unwrap();
        assert_eq!(feed.try_take().unwrap(), Bytes::from_static(b"ls\r"));

        drop(tx);
        assert!(feed.is_open());
        assert!(feed.try_take().is_none());
        assert!(!feed.is_open());
    }

    #[test]
    fn test_outcome_splits_steps() {
        let mut output = Output::empty(EndReason::Detached);
        output.intercepted = Some("ls -l\rcd /tmp\r\nexit\r".to_string());
        let outcome = ConsoleOutcome::new(output);
        assert!(outcome.detached());
        assert_eq!(outcome.steps.unwrap(), vec!["ls -l", "cd /tmp", "exit"]);
    }

    #[test]
    fn test_outcome_without_detach() {
        let outcome = ConsoleOutcome::new(Output::empty(EndReason::Matched));
        assert!(!outcome.detached());
    }
}
