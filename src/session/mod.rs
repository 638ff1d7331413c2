//! Interactive sessions
//!
//! A [`Session`] owns one child process, its streams and the output left over
//! between calls. Every operation is a composition of [`Session::send`].

mod builder;
mod engine;
mod options;

pub use builder::SessionBuilder;
pub use options::{Expect, SendOptions, Timeout};

use crate::buffer::{IdleTracker, Scrollback, StreamBuffer};
use crate::console::{ConsoleOutcome, KeyFeed, CTRL_C, CTRL_D, CTRL_SQUARE};
use crate::mux::{spawn_reader, Multiplexer};
use crate::pattern::Pattern;
use crate::process::{LaunchSpec, Launcher, ProcessHandle, Spawned};
use crate::result::{Output, SessionError};
use crate::sink::OutputSink;
use portable_pty::MasterPty;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built but never started (lazy sessions).
    Unconnected,
    /// Starting the process, possibly retrying.
    Connecting,
    /// The process is running.
    Alive,
    /// The process exited or could not be started.
    Dropped,
    /// Closed explicitly; cannot be reconnected.
    Closed,
}

/// Live resources of one started process.
struct Connection {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    mux: Multiplexer,
    process: Box<dyn ProcessHandle>,
    terminal: Option<Box<dyn MasterPty + Send>>,
}

impl Connection {
    fn open(spawned: Spawned) -> std::io::Result<Self> {
        let Spawned {
            stdin,
            stdout,
            stderr,
            mut process,
            terminal,
        } = spawned;

        let readers = spawn_reader("stdout", stdout).and_then(|out| {
            let err = stderr.map(|err| spawn_reader("stderr", err)).transpose()?;
            Ok((out, err))
        });
        let (out, err) = match readers {
            Ok(readers) => readers,
            Err(e) => {
                let _ = process.terminate();
                return Err(e);
            }
        };

        Ok(Self {
            writer: Arc::new(Mutex::new(stdin)),
            mux: Multiplexer::new(out, err),
            process,
            terminal,
        })
    }

    fn exit_code(&mut self) -> Option<i32> {
        match self.process.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("failed to query process status: {}", e);
                Some(-1)
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if matches!(self.process.try_wait(), Ok(None)) {
            debug!(pid = ?self.process.pid(), "terminating child");
            if let Err(e) = self.process.terminate() {
                warn!("failed to terminate child: {}", e);
            }
        }
    }
}

/// An interactive subprocess driven by expect-style calls.
///
/// Calls are sequential: each takes `&mut self`, writes its input, and
/// waits until the expected pattern shows up, the timeout or idle timeout
/// expires, or the process exits. Output read past a match stays queued for
/// the next call, so every command sees only its own output.
///
/// Dropping a session terminates a child that is still running.
///
/// # Examples
///
/// ```no_run
/// use interactrust::{Pattern, SendOptions, Session};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder()
///     .prompt(Pattern::regex(r"\$ $")?)
///     .pty(true)
///     .env("PS1", "$ ")
///     .spawn("sh -i")
///     .await?;
///
/// let output = session.cmd("echo hi", SendOptions::default()).await?;
/// assert!(output.stdout.contains("hi"));
/// # Ok(())
/// # }
/// ```
pub struct Session {
    name: String,
    launch: LaunchSpec,
    launcher: Arc<dyn Launcher>,
    sink: Arc<dyn OutputSink>,
    prompt: Option<Pattern>,
    timeout: Duration,
    delay: Duration,
    idle_timeout: Option<Duration>,
    retry: u32,
    retry_delay: Duration,
    hide_output: bool,
    flush_on_connect: bool,
    auto_reconnect: bool,
    replace_interrupt: bool,
    state: ConnectionState,
    had_connect: bool,
    conn: Option<Connection>,
    stdout: StreamBuffer,
    stderr: StreamBuffer,
    idle: IdleTracker,
    scrollback: Scrollback,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("command", &self.launch.command)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .finish()
    }
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Spawn a command with default settings.
    ///
    /// This is a shorthand for `Session::builder().spawn(command)`.
    pub async fn spawn(command: &str) -> Result<Self, SessionError> {
        SessionBuilder::new().spawn(command).await
    }

    pub(crate) fn new(builder: SessionBuilder, command: &str) -> Self {
        let launch = builder.launch_spec(command);
        let name = builder
            .name
            .clone()
            .unwrap_or_else(|| command.trim().to_string());
        Self {
            name,
            launch,
            launcher: builder.launcher,
            sink: builder.sink,
            prompt: builder.prompt,
            timeout: builder.timeout,
            delay: builder.delay,
            idle_timeout: builder.idle_timeout,
            retry: builder.retry,
            retry_delay: builder.retry_delay,
            hide_output: builder.hide_output,
            flush_on_connect: builder.flush_on_connect,
            auto_reconnect: builder.auto_reconnect,
            replace_interrupt: false,
            state: ConnectionState::Unconnected,
            had_connect: false,
            conn: None,
            stdout: StreamBuffer::new(builder.strip_ansi),
            stderr: StreamBuffer::new(builder.strip_ansi),
            idle: IdleTracker::new(),
            scrollback: Scrollback::new(builder.scrollback),
        }
    }

    // ---- lifecycle -------------------------------------------------------

    /// Start the process, retrying as configured.
    ///
    /// After each start the session peeks at the startup output, so the next
    /// call sees it; a process that is already gone by then counts as a
    /// failed attempt. With flush-on-connect the startup output is then
    /// consumed up to the prompt.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Closed`] after [`close`](Self::close)
    /// - [`SessionError::NoCommand`] when the command line is empty
    /// - [`SessionError::SpawnFailure`] when every attempt failed; also
    ///   reported on the error sink, and the session is left dropped
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Closed {
            return Err(SessionError::Closed {
                name: self.name.clone(),
            });
        }
        if self.launch.command.trim().is_empty() {
            return Err(SessionError::NoCommand {
                name: self.name.clone(),
            });
        }

        self.sink.input(&format!(
            "Starting interactive-process {}: {}\n",
            self.name, self.launch.command
        ));

        let mut reason = String::from("process exited during startup");
        let mut connected = false;
        for attempt in 0..=self.retry {
            self.state = ConnectionState::Connecting;
            self.conn = None;
            self.reset_buffers();

            match self.launcher.spawn(&self.launch).and_then(Connection::open) {
                Ok(conn) => {
                    debug!(name = %self.name, attempt, pid = ?conn.process.pid(), "process started");
                    self.conn = Some(conn);
                    self.state = ConnectionState::Alive;
                    if self.is_alive() {
                        if let Err(e) = self.peek_inner().await {
                            debug!(name = %self.name, error = %e, "startup peek failed");
                        }
                    }
                    if self.is_alive() {
                        connected = true;
                        break;
                    }
                    if let Some(code) = self.exit_status() {
                        reason = format!("process exited with code {}", code);
                    }
                }
                Err(e) => {
                    debug!(name = %self.name, attempt, error = %e, "spawn failed");
                    self.sink.warn(&format!(
                        "fail to open {} process, \"{}\": {}",
                        self.name, self.launch.command, e
                    ));
                    reason = e.to_string();
                }
            }

            if attempt < self.retry {
                self.sink.input(&format!(
                    "Will retry \"{}\" in {:.1} sec, {} attempt ...\n",
                    self.launch.command,
                    self.retry_delay.as_secs_f64(),
                    attempt + 1
                ));
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        self.sink.input("\n");
        if !connected {
            self.state = ConnectionState::Dropped;
            let err = SessionError::SpawnFailure {
                name: self.name.clone(),
                command: self.launch.command.clone(),
                retries: self.retry,
                reason,
            };
            self.sink.error(&err.to_string());
            return Err(err);
        }

        if self.flush_on_connect {
            let mut opts = SendOptions::new().continuous();
            opts.hide_output = self.hide_output;
            self.send_inner(b"", &opts, None).await?;
        }

        self.had_connect = true;
        Ok(())
    }

    /// Connect a lazy session on first use.
    pub async fn ensure_connected(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Unconnected {
            self.connect().await?;
        }
        Ok(())
    }

    /// Start over after the connection dropped.
    ///
    /// Does nothing when the session is alive or was never connected
    /// successfully.
    pub async fn reconnect(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Closed {
            return Err(SessionError::Closed {
                name: self.name.clone(),
            });
        }
        if self.had_connect && !self.is_alive() {
            debug!(name = %self.name, "reconnecting");
            self.connect().await?;
        }
        Ok(())
    }

    /// Terminate the process. The session cannot be reconnected afterwards.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!(name = %self.name, "closing session");
            drop(conn);
        }
        self.state = ConnectionState::Closed;
    }

    /// Lazy connect and auto-reconnect before a call.
    async fn prepare_call(&mut self) -> Result<(), SessionError> {
        self.ensure_connected().await?;
        if self.auto_reconnect && self.had_connect && !self.is_alive() {
            self.sink
                .warn(&format!("Connection {} dropped, reconnecting", self.name));
            self.connect().await?;
        }
        Ok(())
    }

    fn reset_buffers(&mut self) {
        self.stdout.reset();
        self.stderr.reset();
        self.idle = IdleTracker::new();
    }

    /// Report and build the error for a call on a dead session.
    fn dropped_error(&self) -> SessionError {
        let err = SessionError::ConnectionDropped {
            name: self.name.clone(),
        };
        self.sink.error(&err.to_string());
        err
    }

    // ---- state -----------------------------------------------------------

    /// True while the process is running.
    ///
    /// Liveness is queried from the process, never cached.
    pub fn is_alive(&mut self) -> bool {
        let alive = match self.conn.as_mut() {
            Some(conn) => conn.exit_code().is_none(),
            None => false,
        };
        if !alive && self.state == ConnectionState::Alive {
            debug!(name = %self.name, "connection dropped");
            self.state = ConnectionState::Dropped;
        }
        alive
    }

    /// Current connection state.
    pub fn state(&mut self) -> ConnectionState {
        self.is_alive();
        self.state
    }

    /// Exit code of the process, once it has exited.
    pub fn exit_status(&mut self) -> Option<i32> {
        self.conn.as_mut().and_then(Connection::exit_code)
    }

    /// OS process id of the child.
    pub fn pid(&self) -> Option<u32> {
        self.conn.as_ref().and_then(|conn| conn.process.pid())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command_line(&self) -> &str {
        &self.launch.command
    }

    pub fn prompt(&self) -> Option<&Pattern> {
        self.prompt.as_ref()
    }

    pub(crate) fn sink(&self) -> &dyn OutputSink {
        self.sink.as_ref()
    }

    /// True when the child runs on a pseudo-terminal.
    pub fn on_terminal(&self) -> bool {
        self.conn
            .as_ref()
            .map(|conn| conn.terminal.is_some())
            .unwrap_or_else(|| self.launch.uses_pty())
    }

    /// Replace the default prompt.
    pub fn change_prompt(&mut self, prompt: Pattern) {
        self.prompt = Some(prompt);
    }

    /// Replace the default timeout.
    pub fn change_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Turn Ctrl-C typed in an interactive call into [`interrupt`](Self::interrupt).
    pub fn set_replace_interrupt(&mut self, enable: bool) {
        self.replace_interrupt = enable;
    }

    /// Everything the session produced, when scrollback is enabled.
    pub fn scrollback(&self) -> &str {
        self.scrollback.as_str()
    }

    pub fn clear_scrollback(&mut self) {
        self.scrollback.clear();
    }

    /// Largest gap between two reads seen so far.
    pub fn max_idle_gap(&self) -> Duration {
        self.idle.max_idle_gap()
    }

    // ---- calls -----------------------------------------------------------

    /// Write `input` and wait for the expected output.
    ///
    /// Connects a lazy session first, and reconnects a dropped one when
    /// auto-reconnect is enabled.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectionDropped`] when the process is not running;
    ///   also reported on the error sink
    /// - [`SessionError::PatternError`] for a pattern that cannot be compiled
    /// - [`SessionError::IoError`] when writing the input fails
    ///
    /// Not finding the pattern is not an error: see [`Output::ended`].
    pub async fn send(
        &mut self,
        input: impl AsRef<[u8]>,
        opts: SendOptions,
    ) -> Result<Output, SessionError> {
        self.prepare_call().await?;
        self.send_inner(input.as_ref(), &opts, None).await
    }

    /// Run a command line.
    ///
    /// The command is trimmed and terminated with exactly one line feed, and
    /// a line feed is printed after a result that does not end with one.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use interactrust::{Pattern, SendOptions, Session, Timeout};
    ///
    /// # async fn example(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    /// session.cmd("make", SendOptions::new().timeout(Timeout::secs(600.0))).await?;
    /// let output = session
    ///     .cmd("cd /tmp", SendOptions::new().new_prompt(Pattern::regex(r"tmp\$ $")?))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cmd(&mut self, command: &str, mut opts: SendOptions) -> Result<Output, SessionError> {
        let input = format!("{}\n", command.trim());
        opts.end_with_newline = true;
        self.send(input, opts).await
    }

    /// Run a command without printing its input or output.
    ///
    /// Warnings and errors are still reported.
    pub async fn cmd_hide(&mut self, command: &str, opts: SendOptions) -> Result<Output, SessionError> {
        self.cmd(command, opts.hide_input().hide_output()).await
    }

    /// Wait for output without sending anything.
    pub async fn expect(
        &mut self,
        expect: impl Into<Expect>,
        timeout: impl Into<Option<Timeout>>,
    ) -> Result<Output, SessionError> {
        let mut opts = SendOptions::new().expect(expect);
        opts.timeout = timeout.into();
        self.send(b"", opts).await
    }

    /// Collect the output produced so far, without waiting.
    pub async fn poll(&mut self) -> Result<Output, SessionError> {
        let opts = SendOptions::new().no_expect().timeout(Duration::ZERO);
        self.send(b"", opts).await
    }

    /// Consume buffered output, by default up to the prompt.
    ///
    /// Output left over from earlier calls is part of the result.
    pub async fn flush(&mut self, opts: SendOptions) -> Result<Output, SessionError> {
        self.send(b"", opts.continuous()).await
    }

    /// Output produced since the last check, leftovers included.
    ///
    /// Useful for a process left running in the background.
    pub async fn check_outputs(&mut self) -> Result<Output, SessionError> {
        let opts = SendOptions::new()
            .no_expect()
            .timeout(Duration::ZERO)
            .continuous();
        self.send(b"", opts).await
    }

    /// Look at the output without consuming it.
    ///
    /// Output left over from earlier calls is included. The next call
    /// returns the same text again, followed by anything new.
    pub async fn peek(&mut self) -> Result<Output, SessionError> {
        self.prepare_call().await?;
        self.peek_inner().await
    }

    async fn peek_inner(&mut self) -> Result<Output, SessionError> {
        let opts = SendOptions::new()
            .no_expect()
            .timeout(Duration::from_millis(100))
            .hide_output()
            .continuous()
            .peek();
        self.send_inner(b"", &opts, None).await
    }

    async fn send_special(
        &mut self,
        key: u8,
        key_name: &str,
        opts: SendOptions,
    ) -> Result<Output, SessionError> {
        self.prepare_call().await?;
        if !self.is_alive() {
            return Err(self.dropped_error());
        }
        self.sink
            .input(&format!("Send {} to {}.\n", key_name, self.name));
        self.write_input(&[key]).await?;
        self.send_inner(b"", &opts.continuous().end_with_newline(), None)
            .await
    }

    /// Send Ctrl-C and flush up to the prompt.
    pub async fn ctrl_c(&mut self, opts: SendOptions) -> Result<Output, SessionError> {
        self.send_special(CTRL_C, "Ctrl-C SIGINT", opts).await
    }

    /// Send Ctrl-D and flush up to the prompt.
    pub async fn ctrl_d(&mut self, opts: SendOptions) -> Result<Output, SessionError> {
        self.send_special(CTRL_D, "Ctrl-D EOT", opts).await
    }

    /// Send Ctrl-] and flush up to the prompt.
    pub async fn ctrl_square(&mut self, opts: SendOptions) -> Result<Output, SessionError> {
        self.send_special(CTRL_SQUARE, "Ctrl-]", opts).await
    }

    /// Interrupt the foreground job of the child.
    ///
    /// On a pseudo-terminal this writes Ctrl-C and lets the line discipline
    /// raise SIGINT; on plain pipes SIGINT is sent to the child process.
    pub async fn interrupt(&mut self) -> Result<(), SessionError> {
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Err(self.dropped_error()),
        };
        if conn.terminal.is_some() {
            self.write_input(&[CTRL_C]).await
        } else {
            conn.process.interrupt().map_err(SessionError::from)
        }
    }

    /// Run `command` while forwarding the keystrokes of `keys` to the child.
    ///
    /// Ctrl-] in the feed ends the call with [`EndReason::Detached`] and the
    /// typed keys in [`Output::intercepted`].
    ///
    /// [`EndReason::Detached`]: crate::EndReason::Detached
    pub async fn interact(
        &mut self,
        command: Option<&str>,
        opts: SendOptions,
        keys: &mut KeyFeed,
    ) -> Result<Output, SessionError> {
        self.prepare_call().await?;
        let input = command
            .map(|c| format!("{}\n", c.trim()))
            .unwrap_or_default();
        self.send_inner(input.as_bytes(), &opts, Some(keys)).await
    }

    /// Attach the local terminal to the child until Ctrl-] or `expect`.
    ///
    /// The terminal is held in raw mode for the duration of the call and
    /// restored on every exit path. A dropped session is reconnected first.
    /// On detach, the typed lines are printed and returned.
    pub async fn console(
        &mut self,
        command: Option<&str>,
        expect: Expect,
    ) -> Result<ConsoleOutcome, SessionError> {
        if !self.is_alive() {
            self.sink
                .warn(&format!("Connection {} dropped, reconnecting", self.name));
            self.connect().await?;
        }
        self.sink.notice(&format!(
            "Console attached to '{}'. Escape character is '^]'",
            self.name
        ));

        let input = command
            .map(|c| format!("{}\n", c.trim()))
            .unwrap_or_default();
        let opts = SendOptions::new().expect(expect).timeout(Timeout::Forever);
        let output = self.attached(input.as_bytes(), &opts).await?;
        let outcome = ConsoleOutcome::new(output);

        match &outcome.steps {
            Some(steps) => {
                self.sink.notice(&format!(
                    "Console detached from \"{}\", by Ctrl-]",
                    self.name
                ));
                self.sink.notice(&format!(
                    "Here are the manual steps done in interactive console of {}:",
                    self.name
                ));
                for step in steps {
                    self.sink.input(&format!("    {:?}\n", step));
                }
                self.sink.input("\n");
            }
            None => {
                self.sink
                    .notice(&format!("Console detached from \"{}\"", self.name));
            }
        }
        Ok(outcome)
    }

    #[cfg(unix)]
    async fn attached(&mut self, input: &[u8], opts: &SendOptions) -> Result<Output, SessionError> {
        let mode = crate::console::TerminalMode::acquire()?;
        let mut keys = KeyFeed::from_terminal(&mode)?;
        let output = self.send_inner(input, opts, Some(&mut keys)).await;
        drop(keys);
        drop(mode);
        output
    }

    #[cfg(not(unix))]
    async fn attached(&mut self, _input: &[u8], _opts: &SendOptions) -> Result<Output, SessionError> {
        Err(SessionError::IoError(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "the interactive console needs a unix terminal",
        )))
    }

    /// Write to the child's input and flush.
    async fn write_input(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let writer = match &self.conn {
            Some(conn) => Arc::clone(&conn.writer),
            None => return Err(self.dropped_error()),
        };
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut writer = writer.blocking_lock();
            writer.write_all(&data)?;
            writer.flush()
        })
        .await
        .map_err(|e| SessionError::IoError(std::io::Error::other(e)))??;

        Ok(())
    }
}
