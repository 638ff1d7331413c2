//! Command searches, polling and batches
//!
//! Higher level helpers built from [`Session::cmd`]: test a command's output
//! against a regex, repeat a command until its output changes, and run a
//! list of commands with optional pass patterns.

use crate::config::StepConfig;
use crate::result::{EndReason, Output, PatternError, SessionError};
use crate::session::{SendOptions, Session, Timeout};
use regex::Regex;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Options of [`Session::cmd_search`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Succeed when the pattern is *not* found.
    pub reverse: bool,
    /// Succeed when the numbers captured by the pattern add up to this value.
    pub sum_value: Option<i64>,
    /// Print the command and its output.
    pub verbose: bool,
    /// Options of the underlying command call.
    pub send: SendOptions,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            reverse: false,
            sum_value: None,
            verbose: true,
            send: SendOptions::default(),
        }
    }
}

/// Result of [`Session::cmd_search`].
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub output: Output,
    pub found: bool,
}

/// How much [`Session::cmd_poll`] prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Nothing, except the last output of a failed poll.
    Quiet,
    /// A summary and the output of the last attempt.
    #[default]
    Last,
    /// Every attempt.
    All,
}

/// Options of [`Session::cmd_poll`].
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub reverse: bool,
    pub sum_value: Option<i64>,
    /// Attempts after the first one.
    pub max_times: u32,
    /// Pause between attempts.
    pub interval: Duration,
    /// Pause before the first attempt.
    pub initial_delay: Duration,
    pub verbosity: Verbosity,
    pub send: SendOptions,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            reverse: false,
            sum_value: None,
            max_times: 10,
            interval: Duration::from_millis(100),
            initial_delay: Duration::ZERO,
            verbosity: Verbosity::default(),
            send: SendOptions::default(),
        }
    }
}

/// Result of [`Session::cmd_poll`].
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Output of the last attempt.
    pub output: Output,
    pub found: bool,
    /// Number of times the command ran.
    pub attempts: u32,
}

/// One step of a batch.
#[derive(Debug, Clone)]
pub enum BatchStep {
    /// Printed, never sent.
    Comment(String),
    /// A command, optionally checked against a pass pattern.
    Command {
        cmd: String,
        pass: Option<String>,
        /// Replaces the batch-wide call options for this step.
        opts: Option<SendOptions>,
    },
}

impl BatchStep {
    pub fn command(cmd: impl Into<String>) -> Self {
        BatchStep::Command {
            cmd: cmd.into(),
            pass: None,
            opts: None,
        }
    }

    /// A command that passes when `pass` is found in its stdout.
    pub fn checked(cmd: impl Into<String>, pass: impl Into<String>) -> Self {
        BatchStep::Command {
            cmd: cmd.into(),
            pass: Some(pass.into()),
            opts: None,
        }
    }

    /// Give a command step its own call options.
    pub fn with_options(self, options: SendOptions) -> Self {
        match self {
            BatchStep::Command { cmd, pass, .. } => BatchStep::Command {
                cmd,
                pass,
                opts: Some(options),
            },
            comment => comment,
        }
    }
}

impl From<&str> for BatchStep {
    /// Lines starting with `#` are comments.
    fn from(line: &str) -> Self {
        if line.starts_with('#') {
            BatchStep::Comment(line.to_string())
        } else {
            BatchStep::command(line)
        }
    }
}

impl From<(&str, &str)> for BatchStep {
    fn from((cmd, pass): (&str, &str)) -> Self {
        BatchStep::checked(cmd, pass)
    }
}

impl From<&StepConfig> for BatchStep {
    fn from(step: &StepConfig) -> Self {
        if step.cmd.starts_with('#') {
            return BatchStep::Comment(step.cmd.clone());
        }
        BatchStep::Command {
            cmd: step.cmd.clone(),
            pass: step.pass.clone(),
            opts: step
                .timeout
                .map(|secs| SendOptions::new().timeout(Timeout::secs(secs))),
        }
    }
}

/// Outcome of one batch step.
#[derive(Debug, Clone)]
pub struct BatchRecord {
    /// Command or comment text.
    pub cmd: String,
    /// Output of the command; `None` for comments, skipped steps and errors.
    pub output: Option<Output>,
    /// Pass pattern result; `None` when the step had no pass pattern.
    pub result: Option<bool>,
    /// Error of the session call, if it failed.
    pub error: Option<String>,
}

impl BatchRecord {
    fn bare(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            output: None,
            result: None,
            error: None,
        }
    }

    /// False when the call failed or the pass pattern was not found.
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.result != Some(false)
    }
}

/// True when every step of a batch passed.
pub fn batch_passed(records: &[BatchRecord]) -> bool {
    records.iter().all(BatchRecord::passed)
}

type Precall<'a> = Box<dyn FnMut(&str, &[BatchRecord]) -> bool + Send + 'a>;
type Postcall<'a> = Box<dyn FnMut(&BatchRecord) + Send + 'a>;

/// Options of [`Session::cmd_batch`].
#[derive(Default)]
pub struct BatchOptions<'a> {
    /// Stop at the first failed step.
    pub stop_on_error: bool,
    /// Do not print passing pattern checks.
    pub hide_pass: bool,
    /// Call options of steps without their own.
    pub send: SendOptions,
    precall: Option<Precall<'a>>,
    postcall: Option<Postcall<'a>>,
}

impl fmt::Debug for BatchOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("stop_on_error", &self.stop_on_error)
            .field("hide_pass", &self.hide_pass)
            .field("send", &self.send)
            .field("precall", &self.precall.is_some())
            .field("postcall", &self.postcall.is_some())
            .finish()
    }
}

impl<'a> BatchOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn hide_pass(mut self, hide: bool) -> Self {
        self.hide_pass = hide;
        self
    }

    pub fn send(mut self, opts: SendOptions) -> Self {
        self.send = opts;
        self
    }

    /// Called before each command with the records so far; returning false
    /// skips the command.
    pub fn precall(
        mut self,
        precall: impl FnMut(&str, &[BatchRecord]) -> bool + Send + 'a,
    ) -> Self {
        self.precall = Some(Box::new(precall));
        self
    }

    /// Called after each executed command.
    pub fn postcall(mut self, postcall: impl FnMut(&BatchRecord) + Send + 'a) -> Self {
        self.postcall = Some(Box::new(postcall));
        self
    }
}

fn compile(pattern: &str) -> Result<Regex, SessionError> {
    Ok(Regex::new(pattern).map_err(PatternError::from)?)
}

/// Sum of the numbers captured by `re` (first group, or the whole match).
fn sum_captures(re: &Regex, text: &str) -> i64 {
    re.captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(0)))
        .filter_map(|m| m.as_str().trim().parse::<i64>().ok())
        .sum()
}

impl Session {
    /// Run `cmd` and check whether `pattern` appears in its stdout.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] when both `reverse` and `sum_value`
    /// are set, plus the errors of [`cmd`](Self::cmd).
    pub async fn cmd_search(
        &mut self,
        cmd: &str,
        pattern: &str,
        opts: SearchOptions,
    ) -> Result<SearchOutcome, SessionError> {
        if opts.reverse && opts.sum_value.is_some() {
            return Err(SessionError::InvalidArgument(
                "using both sum_value and reverse is not supported".to_string(),
            ));
        }
        let re = compile(pattern)?;

        let output = if opts.verbose {
            self.cmd(cmd, opts.send).await?
        } else {
            self.cmd_hide(cmd, opts.send).await?
        };
        let hit = match opts.sum_value {
            Some(expected) => sum_captures(&re, &output.stdout) == expected,
            None => re.is_match(&output.stdout),
        };
        Ok(SearchOutcome {
            output,
            found: hit != opts.reverse,
        })
    }

    /// Run `cmd` repeatedly until `pattern` shows up (or disappears, with
    /// `reverse`).
    ///
    /// Runs at most `max_times + 1` times. Stops early, reporting an error,
    /// when the session dies in between.
    pub async fn cmd_poll(
        &mut self,
        cmd: &str,
        pattern: &str,
        opts: PollOptions,
    ) -> Result<PollOutcome, SessionError> {
        self.ensure_connected().await?;
        let mut last: Option<Output> = None;
        let mut found = false;
        let mut attempts = 0u32;

        let waited = |attempts: u32| {
            (opts.initial_delay + opts.interval * attempts.saturating_sub(1)).as_secs_f64()
        };

        for i in 0..=opts.max_times {
            if !self.is_alive() {
                self.sink().error(&format!(
                    "{} not alive, cmd_poll \"{}\" returned, polled {} times",
                    self.name(),
                    cmd,
                    i
                ));
                return Ok(PollOutcome {
                    output: last.unwrap_or_else(|| Output::empty(EndReason::ProcessExited)),
                    found: false,
                    attempts,
                });
            }
            tokio::time::sleep(if i == 0 { opts.initial_delay } else { opts.interval }).await;

            let search = SearchOptions {
                reverse: opts.reverse,
                sum_value: opts.sum_value,
                verbose: opts.verbosity == Verbosity::All,
                send: opts.send.clone(),
            };
            let outcome = self.cmd_search(cmd, pattern, search).await?;
            attempts += 1;
            found = outcome.found;
            last = Some(outcome.output);
            if found {
                break;
            }

            let progress = format!(
                "cmd_poll: time spent {:.2} seconds, (delay {:.2}, interval {:.2}, {} times), result {}",
                waited(attempts),
                opts.initial_delay.as_secs_f64(),
                opts.interval.as_secs_f64(),
                attempts,
                found
            );
            match opts.verbosity {
                Verbosity::All => self.sink().input(&format!("{}\n", progress)),
                _ => debug!(name = %self.name(), "{}", progress),
            }
        }

        let output = last.unwrap_or_else(|| Output::empty(EndReason::Timeout));
        if opts.verbosity != Verbosity::Quiet {
            self.sink().input(&format!(
                "{} cmd_poll \"{}\": waited {:.2} seconds, result {}\n",
                self.name(),
                cmd,
                waited(attempts),
                found
            ));
        }
        if !found {
            self.sink().error(&format!(
                "{} cmd_poll failed {}to get \"{}\", waited {:.2} seconds",
                self.name(),
                if opts.reverse { "NOT " } else { "" },
                pattern,
                waited(attempts)
            ));
        }
        if opts.verbosity == Verbosity::Last || (opts.verbosity == Verbosity::Quiet && !found) {
            self.sink().stdout(&format!("\n{}\n", output.stdout));
            self.sink().stderr(&format!("{}\n", output.stderr));
        }

        Ok(PollOutcome {
            output,
            found,
            attempts,
        })
    }

    /// Run a list of steps in order.
    ///
    /// Comments are printed. A step with a pass pattern passes when the
    /// pattern is found in its stdout. A failing session call is recorded in
    /// [`BatchRecord::error`] instead of aborting the batch.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use interactrust::{batch_passed, BatchOptions, BatchStep, Session};
    ///
    /// # async fn example(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    /// let steps = vec![
    ///     BatchStep::from("# build"),
    ///     BatchStep::checked("make", "Nothing to be done|Built"),
    ///     BatchStep::command("ls -l"),
    /// ];
    /// let records = session
    ///     .cmd_batch(steps, BatchOptions::new().stop_on_error(true))
    ///     .await?;
    /// assert!(batch_passed(&records));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cmd_batch(
        &mut self,
        steps: impl IntoIterator<Item = BatchStep>,
        mut opts: BatchOptions<'_>,
    ) -> Result<Vec<BatchRecord>, SessionError> {
        let mut records: Vec<BatchRecord> = Vec::new();

        for step in steps {
            let (cmd, pass, step_opts) = match step {
                BatchStep::Comment(text) => {
                    self.sink().notice(&text);
                    records.push(BatchRecord::bare(&text));
                    continue;
                }
                BatchStep::Command { cmd, pass, opts } => (cmd, pass, opts),
            };

            if let Some(precall) = opts.precall.as_mut() {
                if !precall(&cmd, &records) {
                    debug!(%cmd, "batch step skipped");
                    records.push(BatchRecord::bare(&cmd));
                    continue;
                }
            }

            // Compile before running so a bad pattern does not run the step.
            let pass = pass
                .filter(|p| !p.is_empty())
                .map(|p| compile(&p).map(|re| (p, re)))
                .transpose()?;

            let send = step_opts.unwrap_or_else(|| opts.send.clone());
            let mut record = BatchRecord::bare(&cmd);
            match self.cmd(&cmd, send).await {
                Ok(output) => {
                    if let Some((source, re)) = &pass {
                        let hit = re.is_match(&output.stdout);
                        if !hit {
                            self.sink().error(&format!(
                                "FAIL: pattern \"{}\" NOT found in \"{}\" output",
                                source, cmd
                            ));
                        } else if !opts.hide_pass {
                            self.sink().notice(&format!(
                                "PASS: pattern \"{}\" found in \"{}\" output",
                                source, cmd
                            ));
                        }
                        record.result = Some(hit);
                    }
                    record.output = Some(output);
                }
                Err(e) => {
                    debug!(%cmd, error = %e, "batch step failed");
                    record.error = Some(e.to_string());
                }
            }

            let passed = record.passed();
            records.push(record);
            if !passed && opts.stop_on_error {
                break;
            }
            if let (Some(postcall), Some(record)) = (opts.postcall.as_mut(), records.last()) {
                postcall(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_captures_first_group() {
        let re = Regex::new(r"Rx +(\d+)").unwrap();
        assert_eq!(sum_captures(&re, "CPU1 Rx 10  Tx 34\nCPU2 Rx 20  Tx 9"), 30);
    }

    #[test]
    fn test_sum_captures_whole_match() {
        let re = Regex::new(r"\d+").unwrap();
        assert_eq!(sum_captures(&re, "1 2 3"), 6);
        assert_eq!(sum_captures(&re, "none"), 0);
    }

    #[test]
    fn test_step_from_line() {
        assert!(matches!(BatchStep::from("# note"), BatchStep::Comment(ref t) if t == "# note"));
        assert!(matches!(
            BatchStep::from("ls"),
            BatchStep::Command { ref cmd, pass: None, opts: None } if cmd == "ls"
        ));
        assert!(matches!(
            BatchStep::from(("uname", "Linux")),
            BatchStep::Command { ref cmd, pass: Some(ref p), .. } if cmd == "uname" && p == "Linux"
        ));
    }

    #[test]
    fn test_step_from_config_keeps_timeout() {
        let config = StepConfig {
            cmd: "make".to_string(),
            pass: Some("done".to_string()),
            timeout: Some(60.0),
        };
        match BatchStep::from(&config) {
            BatchStep::Command { opts: Some(opts), pass, .. } => {
                assert_eq!(opts.timeout, Some(Timeout::After(Duration::from_secs(60))));
                assert_eq!(pass.as_deref(), Some("done"));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_step_from_config_infinite_timeout_waits_forever() {
        let config = StepConfig {
            cmd: "tail -f log".to_string(),
            pass: None,
            timeout: Some(f64::INFINITY),
        };
        match BatchStep::from(&config) {
            BatchStep::Command { opts: Some(opts), .. } => {
                assert_eq!(opts.timeout, Some(Timeout::Forever));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_record_passed() {
        let mut record = BatchRecord::bare("ls");
        assert!(record.passed());
        record.result = Some(false);
        assert!(!record.passed());
        record.result = Some(true);
        record.error = Some("dropped".to_string());
        assert!(!record.passed());
        assert!(!batch_passed(&[BatchRecord::bare("a"), record]));
    }
}
