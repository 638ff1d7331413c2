//! Result types for session calls

mod error;

pub use error::{PatternError, SessionError};

/// One of the child's output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Standard output (the terminal stream on a pseudo-terminal session)
    Stdout,
    /// Standard error
    Stderr,
}

/// Why a session call stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The expected pattern was found.
    Matched,
    /// The absolute timeout expired.
    Timeout,
    /// No output arrived for the idle timeout.
    IdleTimeout,
    /// The process exited.
    ProcessExited,
    /// The user pressed the detach key (Ctrl-]) in an interactive call.
    Detached,
    /// The call returned right after writing its input.
    NoWait,
}

/// Result of a session call.
///
/// Every session call returns this one type. `stdout` and `stderr` hold the
/// text captured since the call began, up to and including the match.
/// Bytes read past the match stay queued in the session for the next call.
///
/// # Examples
///
/// ```no_run
/// use interactrust::{Pattern, SendOptions, Session, Stream};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder()
///     .prompt(Pattern::regex(r"\$ $")?)
///     .pty(true)
///     .spawn("sh -i")
///     .await?;
///
/// let output = session.cmd("uname -s", SendOptions::default()).await?;
/// if output.matched == Some(Stream::Stdout) {
///     println!("kernel: {}", output.stdout.lines().nth(1).unwrap_or(""));
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Captured stdout text.
    pub stdout: String,

    /// Captured stderr text.
    pub stderr: String,

    /// Which stream the expected pattern was found in, if any.
    ///
    /// When the pattern shows up on both streams in the same read, stdout wins.
    pub matched: Option<Stream>,

    /// Capture groups of the match.
    ///
    /// Index 0 is the whole match for regex patterns, followed by each group.
    /// Empty for exact and glob patterns or when nothing matched.
    pub captures: Vec<String>,

    /// Keystrokes intercepted from the keyboard feed.
    ///
    /// Only set when an interactive call ended with the detach key.
    pub intercepted: Option<String>,

    /// Why the call stopped waiting.
    pub ended: EndReason,
}

impl Output {
    pub(crate) fn empty(ended: EndReason) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            matched: None,
            captures: Vec::new(),
            intercepted: None,
            ended,
        }
    }

    /// True when the expected pattern was found.
    pub fn is_match(&self) -> bool {
        self.ended == EndReason::Matched
    }

    /// Stdout and stderr concatenated.
    pub fn combined(&self) -> String {
        let mut all = String::with_capacity(self.stdout.len() + self.stderr.len());
        all.push_str(&self.stdout);
        all.push_str(&self.stderr);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_output() {
        let output = Output::empty(EndReason::NoWait);
        assert!(output.stdout.is_empty());
        assert!(output.stderr.is_empty());
        assert!(!output.is_match());
        assert_eq!(output.ended, EndReason::NoWait);
    }

    #[test]
    fn test_combined() {
        let mut output = Output::empty(EndReason::Matched);
        output.stdout.push_str("out\n");
        output.stderr.push_str("err\n");
        assert_eq!(output.combined(), "out\nerr\n");
        assert!(output.is_match());
    }
}
