//! Session builder for configuration

use crate::config::SessionConfig;
use crate::pattern::Pattern;
use crate::process::{LaunchSpec, Launcher, NativeLauncher};
use crate::result::SessionError;
use crate::session::Session;
use crate::sink::{NullSink, OutputSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout of a session call (in seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default longest single wait of the polling loop (in milliseconds)
const DEFAULT_DELAY_MS: u64 = 100;

/// Default pause between connection attempts (in seconds)
const DEFAULT_RETRY_DELAY_SECS: u64 = 1;

/// Default PTY rows
const DEFAULT_PTY_ROWS: u16 = 24;

/// Default PTY columns
const DEFAULT_PTY_COLS: u16 = 80;

/// Builder for configuring and spawning sessions.
///
/// Provides a fluent interface for configuring session options before spawning a process.
///
/// # Defaults
///
/// - Timeout: 5 seconds
/// - Poll delay: 0.1 seconds
/// - Idle timeout: none
/// - Pipes for stdin, stdout and stderr (no pseudo-terminal)
/// - No prompt, no retries, connect eagerly
/// - Output sink: [`NullSink`]
/// - PTY size: 24 rows × 80 columns
///
/// # Examples
///
/// ```no_run
/// use interactrust::{ConsoleSink, Pattern, Session};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder()
///     .name("local shell")
///     .prompt(Pattern::regex(r"\$ $")?)
///     .timeout(Duration::from_secs(10))
///     .idle_timeout(Duration::from_secs(2))
///     .pty(true)
///     .scrollback(true)
///     .sink(Arc::new(ConsoleSink))
///     .spawn("sh -i")
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    pub(crate) name: Option<String>,
    pub(crate) prompt: Option<Pattern>,
    pub(crate) timeout: Duration,
    pub(crate) delay: Duration,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) use_pty_stdin: bool,
    pub(crate) use_pty_stdout: bool,
    pub(crate) use_shell: bool,
    pub(crate) hide_output: bool,
    pub(crate) flush_on_connect: bool,
    pub(crate) scrollback: bool,
    pub(crate) retry: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) lazy: bool,
    pub(crate) disable_echo: bool,
    pub(crate) auto_reconnect: bool,
    pub(crate) strip_ansi: bool,
    pub(crate) pty_size: (u16, u16),
    pub(crate) env: Vec<(String, String)>,
    pub(crate) cwd: Option<PathBuf>,
    pub(crate) sink: Arc<dyn OutputSink>,
    pub(crate) launcher: Arc<dyn Launcher>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Create a new session builder with default configuration.
    ///
    /// See the [`SessionBuilder`] documentation for default values.
    pub fn new() -> Self {
        Self {
            name: None,
            prompt: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            idle_timeout: None,
            use_pty_stdin: false,
            use_pty_stdout: false,
            use_shell: false,
            hide_output: false,
            flush_on_connect: false,
            scrollback: false,
            retry: 0,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            lazy: false,
            disable_echo: false,
            auto_reconnect: false,
            strip_ansi: false,
            pty_size: (DEFAULT_PTY_ROWS, DEFAULT_PTY_COLS),
            env: Vec::new(),
            cwd: None,
            sink: Arc::new(NullSink),
            launcher: Arc::new(NativeLauncher),
        }
    }

    /// Create a builder from a configuration file section.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConfigError`] for durations that are negative
    /// or not finite, and [`SessionError::PatternError`] if the configured
    /// prompt is not a valid regex.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let mut builder = Self::new()
            .timeout(Duration::from_secs_f64(config.timeout.max(0.0)))
            .delay(Duration::from_secs_f64(config.delay.max(0.0)))
            .pty_stdin(config.pty_stdin)
            .pty_stdout(config.pty_stdout)
            .shell(config.shell)
            .hide_output(config.hide_output)
            .flush_on_connect(config.flush)
            .scrollback(config.scrollback)
            .retry(config.retry)
            .retry_delay(Duration::from_secs_f64(config.retry_delay.max(0.0)))
            .lazy(config.lazy)
            .disable_echo(config.disable_echo)
            .auto_reconnect(config.auto_reconnect)
            .strip_ansi(config.strip_ansi)
            .pty_size(config.pty_rows, config.pty_cols);

        if let Some(name) = &config.name {
            builder = builder.name(name.clone());
        }
        if let Some(prompt) = &config.prompt {
            builder = builder.prompt(Pattern::regex(prompt).map_err(crate::result::PatternError::from)?);
        }
        if let Some(idle) = config.idle_timeout {
            builder = builder.idle_timeout(Duration::from_secs_f64(idle.max(0.0)));
        }
        if let Some(dir) = &config.cwd {
            builder = builder.cwd(dir.clone());
        }
        for (key, value) in &config.env {
            builder = builder.env(key.clone(), value.clone());
        }
        Ok(builder)
    }

    /// Display name used in messages; defaults to the command line.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Pattern marking the end of a command's output.
    pub fn prompt(mut self, prompt: Pattern) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Default timeout of a call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Longest single wait of the polling loop.
    ///
    /// Bounds how late a timeout can be noticed.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Default idle timeout, measured from the last output received.
    pub fn idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = Some(idle);
        self
    }

    /// Give the child a pseudo-terminal as stdin.
    ///
    /// Either pseudo-terminal flag makes the whole session run on a
    /// pseudo-terminal; stderr is then part of the terminal stream.
    pub fn pty_stdin(mut self, enable: bool) -> Self {
        self.use_pty_stdin = enable;
        self
    }

    /// Give the child a pseudo-terminal as stdout.
    pub fn pty_stdout(mut self, enable: bool) -> Self {
        self.use_pty_stdout = enable;
        self
    }

    /// Run the child on a pseudo-terminal.
    pub fn pty(self, enable: bool) -> Self {
        self.pty_stdin(enable).pty_stdout(enable)
    }

    /// Run the command line through the system shell.
    pub fn shell(mut self, enable: bool) -> Self {
        self.use_shell = enable;
        self
    }

    /// Hide the output printed while connecting.
    pub fn hide_output(mut self, enable: bool) -> Self {
        self.hide_output = enable;
        self
    }

    /// Flush the startup output up to the prompt after connecting.
    pub fn flush_on_connect(mut self, enable: bool) -> Self {
        self.flush_on_connect = enable;
        self
    }

    /// Keep a log of all output, see [`Session::scrollback`].
    pub fn scrollback(mut self, enable: bool) -> Self {
        self.scrollback = enable;
        self
    }

    /// Number of extra connection attempts.
    pub fn retry(mut self, retries: u32) -> Self {
        self.retry = retries;
        self
    }

    /// Pause between connection attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Defer the spawn to the first use of the session.
    pub fn lazy(mut self, enable: bool) -> Self {
        self.lazy = enable;
        self
    }

    /// Turn off terminal echo of the input (pseudo-terminal only).
    pub fn disable_echo(mut self, enable: bool) -> Self {
        self.disable_echo = enable;
        self
    }

    /// Reconnect a dropped session at its next use.
    pub fn auto_reconnect(mut self, enable: bool) -> Self {
        self.auto_reconnect = enable;
        self
    }

    /// Enable or disable ANSI escape sequence stripping.
    ///
    /// When enabled, ANSI escape sequences (colors, cursor movements, etc.) are
    /// removed from the output before pattern matching.
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    /// Set PTY (terminal) size.
    pub fn pty_size(mut self, rows: u16, cols: u16) -> Self {
        self.pty_size = (rows, cols);
        self
    }

    /// Add an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Working directory of the child.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Where the transcript is printed.
    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// What starts the child process.
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub(crate) fn launch_spec(&self, command: &str) -> LaunchSpec {
        LaunchSpec {
            command: command.to_string(),
            use_pty_stdin: self.use_pty_stdin,
            use_pty_stdout: self.use_pty_stdout,
            use_shell: self.use_shell,
            disable_echo: self.disable_echo,
            pty_size: self.pty_size,
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }

    /// Create the session without starting the process.
    ///
    /// The process starts at [`Session::connect`] or at the first call.
    pub fn build(self, command: &str) -> Session {
        Session::new(self, command)
    }

    /// Create the session and start the process, unless it is lazy.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SpawnFailure`] when the process could not be
    /// started within the configured retries.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use interactrust::Session;
    /// use std::time::Duration;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let session = Session::builder()
    ///     .retry(2)
    ///     .retry_delay(Duration::from_millis(500))
    ///     .spawn("telnet 192.0.2.10")
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn spawn(self, command: &str) -> Result<Session, SessionError> {
        let lazy = self.lazy;
        let mut session = self.build(command);
        if !lazy {
            session.connect().await?;
        }
        Ok(session)
    }
}
