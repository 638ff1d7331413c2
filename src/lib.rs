//! interactrust: expect-style control of interactive subprocesses
//!
//! interactrust drives a long-lived child process (a shell, a REPL, a telnet
//! or ssh client) one call at a time: write some input, then wait until the
//! output matches a pattern, a timeout or idle timeout expires, or the
//! process exits. Each call returns only the output that belongs to it;
//! anything read past the match waits for the next call.
//!
//! # Features
//!
//! - **Pipes or pseudo-terminals**: separate stdout/stderr on pipes, or a
//!   full pty for programs that insist on a terminal
//! - **Async/await**: calls are `async fn`s on tokio
//! - **Pattern matching**: exact strings, regex (with captures) and globs
//! - **Idle timeouts**: end a call once the output goes quiet
//! - **Interactive console**: hand the local terminal to the child, detach
//!   with Ctrl-]
//! - **Compositions**: background jobs, polling, command batches, a session
//!   registry and parallel jobs with buffered transcripts
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use interactrust::{ConsoleSink, Pattern, SendOptions, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::builder()
//!         .prompt(Pattern::regex(r"\$ $")?)
//!         .pty(true)
//!         .env("PS1", "$ ")
//!         .flush_on_connect(true)
//!         .sink(Arc::new(ConsoleSink))
//!         .spawn("sh -i")
//!         .await?;
//!
//!     let output = session.cmd("uname -s", SendOptions::default()).await?;
//!     println!("matched: {}", output.is_match());
//!     Ok(())
//! }
//! ```
//!
//! # Separate streams
//!
//! Without a pseudo-terminal the child's stdout and stderr are kept apart,
//! and a pattern may be found on either one:
//!
//! ```rust,no_run
//! use interactrust::{Pattern, SendOptions, Session, Stream, Timeout};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::builder().spawn("sh").await?;
//! let output = session
//!     .send(
//!         "ls /nonexistent\n",
//!         SendOptions::new()
//!             .expect(Pattern::regex("No such file")?)
//!             .timeout(Timeout::secs(2.0)),
//!     )
//!     .await?;
//! assert_eq!(output.matched, Some(Stream::Stderr));
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! A pattern that never shows up is not an error: the call returns what it
//! captured with [`EndReason::Timeout`]. Errors are reserved for sessions
//! that are not alive, patterns that do not compile and I/O failures, see
//! [`SessionError`].

pub mod batch;
mod buffer;
pub mod config;
pub mod console;
pub mod job;
mod mux;
mod pattern;
pub mod parallel;
pub mod process;
pub mod registry;
mod result;
mod session;
pub mod sink;

pub use batch::{
    batch_passed, BatchOptions, BatchRecord, BatchStep, PollOptions, PollOutcome, SearchOptions,
    SearchOutcome, Verbosity,
};
pub use buffer::strip_ansi;
pub use config::{Config, SessionConfig};
pub use console::{ConsoleOutcome, KeyFeed};
pub use job::{BackgroundJob, JobTranscript};
pub use parallel::{run_parallel, ParallelOutcome, ParallelTask};
pub use pattern::{Match, Matcher, Pattern};
pub use process::{LaunchSpec, Launcher, NativeLauncher, ProcessHandle, Spawned};
pub use registry::{SessionRegistry, SharedSession};
pub use result::{EndReason, Output, PatternError, SessionError, Stream};
pub use session::{ConnectionState, Expect, SendOptions, Session, SessionBuilder, Timeout};
pub use sink::{CaptureSink, ConsoleSink, NullSink, OutputSink, SinkChannel};
