//! Per-call options

use crate::pattern::Pattern;
use std::time::Duration;

/// How long a call waits for its expected output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Give up after this long.
    After(Duration),
    /// Never give up; only a match, the idle timeout, process exit or a
    /// detach ends the call.
    ///
    /// With no pattern and no idle timeout the call waits until the process
    /// exits.
    Forever,
    /// Return right after writing the input. Output produced in response
    /// surfaces in a later call.
    NoWait,
}

impl Timeout {
    /// Timeout in (fractional) seconds.
    ///
    /// Negative and NaN values mean zero; values too large for a
    /// [`Duration`], infinity included, mean [`Timeout::Forever`].
    pub fn secs(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Timeout::After(Duration::ZERO);
        }
        match Duration::try_from_secs_f64(secs) {
            Ok(duration) => Timeout::After(duration),
            Err(_) => Timeout::Forever,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

/// What a call waits for.
#[derive(Debug, Clone, Default)]
pub enum Expect {
    /// The session prompt; wait for the timeout when the session has none.
    #[default]
    Prompt,
    /// A specific pattern.
    Pattern(Pattern),
    /// Nothing; the call ends on timeout, idle timeout or process exit.
    Nothing,
}

impl From<Pattern> for Expect {
    fn from(pattern: Pattern) -> Self {
        Expect::Pattern(pattern)
    }
}

/// Options of one session call.
///
/// Unset values fall back to the session defaults.
///
/// # Examples
///
/// ```
/// use interactrust::{Pattern, SendOptions, Timeout};
/// use std::time::Duration;
///
/// let opts = SendOptions::new()
///     .expect(Pattern::exact("done"))
///     .timeout(Timeout::secs(30.0))
///     .idle_timeout(Duration::from_secs(2))
///     .continuous();
/// ```
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub expect: Expect,
    pub timeout: Option<Timeout>,
    pub delay: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    /// Replace the session prompt before the call.
    pub new_prompt: Option<Pattern>,
    pub hide_input: bool,
    pub hide_output: bool,
    /// Merge output left over from the previous call into this call's result.
    pub continuous_output: bool,
    /// Do not warn when a pattern was expected but nothing came out.
    pub ignore_no_output: bool,
    /// Print a line feed after a result that does not end with one.
    pub end_with_newline: bool,
    /// Keep the result queued for the next call as well.
    pub peek: bool,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(mut self, expect: impl Into<Expect>) -> Self {
        self.expect = expect.into();
        self
    }

    /// Wait for nothing in particular.
    pub fn no_expect(mut self) -> Self {
        self.expect = Expect::Nothing;
        self
    }

    pub fn timeout(mut self, timeout: impl Into<Timeout>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Longest single wait between checks.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// End the call once output has been idle this long.
    pub fn idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = Some(idle);
        self
    }

    pub fn new_prompt(mut self, prompt: Pattern) -> Self {
        self.new_prompt = Some(prompt);
        self
    }

    /// Do not echo the input, e.g. for passwords.
    pub fn hide_input(mut self) -> Self {
        self.hide_input = true;
        self
    }

    /// Do not print the child's output for this call.
    pub fn hide_output(mut self) -> Self {
        self.hide_output = true;
        self
    }

    pub fn continuous(mut self) -> Self {
        self.continuous_output = true;
        self
    }

    pub fn ignore_no_output(mut self) -> Self {
        self.ignore_no_output = true;
        self
    }

    pub fn end_with_newline(mut self) -> Self {
        self.end_with_newline = true;
        self
    }

    pub fn peek(mut self) -> Self {
        self.peek = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fall_back_to_session() {
        let opts = SendOptions::new();
        assert!(matches!(opts.expect, Expect::Prompt));
        assert!(opts.timeout.is_none());
        assert!(opts.idle_timeout.is_none());
        assert!(!opts.continuous_output);
    }

    #[test]
    fn test_timeout_secs() {
        assert_eq!(Timeout::secs(1.5), Timeout::After(Duration::from_millis(1500)));
        assert_eq!(Timeout::secs(-1.0), Timeout::After(Duration::ZERO));
        assert_eq!(Timeout::secs(f64::NAN), Timeout::After(Duration::ZERO));
        assert_eq!(Timeout::secs(f64::INFINITY), Timeout::Forever);
        assert_eq!(Timeout::secs(1e300), Timeout::Forever);
    }

    #[test]
    fn test_fluent_options() {
        let opts = SendOptions::new()
            .expect(Pattern::exact("ok"))
            .timeout(Duration::from_secs(3))
            .hide_output()
            .peek();
        assert!(matches!(opts.expect, Expect::Pattern(Pattern::Exact(ref s)) if s == "ok"));
        assert_eq!(opts.timeout, Some(Timeout::After(Duration::from_secs(3))));
        assert!(opts.hide_output);
        assert!(opts.peek);
    }
}
