//! Error types for interactrust

use thiserror::Error;

/// Errors that can occur while driving an interactive session.
///
/// Transient conditions of non-blocking I/O (a read that would block, a wait
/// interrupted by a signal) never show up here: the engine absorbs them.
/// A pattern that is not found before the timeout is not an error either;
/// the call returns what it captured with [`EndReason::Timeout`] and a
/// warning on the session's sink.
///
/// [`EndReason::Timeout`]: crate::EndReason::Timeout
///
/// # Examples
///
/// ```no_run
/// use interactrust::{SendOptions, Session, SessionError};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder().spawn("sh").await?;
///
/// match session.cmd("echo hello", SendOptions::default()).await {
///     Ok(output) => println!("{}", output.stdout),
///     Err(SessionError::ConnectionDropped { name }) => {
///         eprintln!("{} went away", name);
///         session.reconnect().await?;
///     }
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session is not alive when a call that needs it is made.
    ///
    /// The error is also reported on the session's error sink. Call
    /// [`Session::reconnect`](crate::Session::reconnect) to start over, or
    /// enable auto-reconnect on the builder.
    #[error("Connection \"{name}\" not alive")]
    ConnectionDropped {
        /// Display name of the session
        name: String,
    },

    /// The launcher could not start the process within the configured retries.
    #[error("Failed to connect to {name}, \"{command}\", with {retries} retries: {reason}")]
    SpawnFailure {
        /// Display name of the session
        name: String,
        /// Command line that was launched
        command: String,
        /// Number of retries after the first attempt
        retries: u32,
        /// Last launcher error, or why the process was not alive
        reason: String,
    },

    /// The session was closed explicitly and cannot be reconnected.
    #[error("Session \"{name}\" is closed")]
    Closed {
        /// Display name of the session
        name: String,
    },

    /// The session has no command line to launch.
    #[error("No command line configured for session \"{name}\"")]
    NoCommand {
        /// Display name of the session
        name: String,
    },

    /// Invalid pattern.
    #[error("Invalid pattern: {0}")]
    PatternError(#[from] PatternError),

    /// A combination of arguments that cannot be honoured.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration file.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// I/O error.
    ///
    /// Returned when writing to the process input fails, or when the local
    /// terminal cannot be switched into raw mode.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A background task (writer, parallel job) panicked or was cancelled.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

/// Errors related to pattern creation.
#[derive(Error, Debug)]
pub enum PatternError {
    /// Invalid regex pattern.
    #[error("Invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// Invalid glob pattern.
    #[error("Invalid glob: {0}")]
    InvalidGlob(String),

    /// Empty pattern.
    #[error("Pattern cannot be empty")]
    EmptyPattern,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_dropped_message() {
        let err = SessionError::ConnectionDropped {
            name: "bash@host".to_string(),
        };
        assert_eq!(err.to_string(), "Connection \"bash@host\" not alive");
    }

    #[test]
    fn test_spawn_failure_message() {
        let err = SessionError::SpawnFailure {
            name: "box".to_string(),
            command: "telnet box".to_string(),
            retries: 2,
            reason: "process exited".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("telnet box"));
        assert!(msg.contains("2 retries"));
    }

    #[test]
    fn test_pattern_error_converts() {
        let regex_err = regex::Regex::new("(").unwrap_err();
        let err: SessionError = PatternError::from(regex_err).into();
        assert!(matches!(err, SessionError::PatternError(PatternError::InvalidRegex(_))));
    }
}
