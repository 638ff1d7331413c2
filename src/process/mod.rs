//! Process launching
//!
//! The session engine does not spawn processes itself. It asks a
//! [`Launcher`] for byte streams and a [`ProcessHandle`], so tests and
//! embedders can plug in their own transport.

mod native;
#[cfg(unix)]
mod terminal;

pub use native::NativeLauncher;

use portable_pty::MasterPty;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// What to launch and how.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Command line, split with shell quoting rules unless `use_shell` is set.
    pub command: String,
    /// Give the child a pseudo-terminal as stdin.
    pub use_pty_stdin: bool,
    /// Give the child a pseudo-terminal as stdout.
    pub use_pty_stdout: bool,
    /// Run the command line through the system shell.
    pub use_shell: bool,
    /// Turn off terminal echo of the input (pseudo-terminal only).
    pub disable_echo: bool,
    /// Terminal rows and columns.
    pub pty_size: (u16, u16),
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            use_pty_stdin: false,
            use_pty_stdout: false,
            use_shell: false,
            disable_echo: false,
            pty_size: (24, 80),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// True when the child gets a pseudo-terminal.
    pub fn uses_pty(&self) -> bool {
        self.use_pty_stdin || self.use_pty_stdout
    }

    /// Program and arguments to execute.
    ///
    /// Quotes and backslash escapes group words the way a POSIX shell does,
    /// without expanding anything.
    ///
    /// # Errors
    ///
    /// [`io::ErrorKind::InvalidInput`] for an unterminated quote or a
    /// trailing backslash.
    pub fn argv(&self) -> io::Result<Vec<String>> {
        if self.use_shell {
            let (shell, flag) = if cfg!(windows) {
                ("cmd", "/C")
            } else {
                ("sh", "-c")
            };
            return Ok(vec![shell.to_string(), flag.to_string(), self.command.clone()]);
        }
        shell_words::split(&self.command).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot split {:?}: {}", self.command, e),
            )
        })
    }
}

/// Liveness and control of a launched process.
pub trait ProcessHandle: Send + fmt::Debug {
    /// Exit code if the process has exited, without blocking.
    fn try_wait(&mut self) -> io::Result<Option<i32>>;

    /// Terminate the process.
    fn terminate(&mut self) -> io::Result<()>;

    /// Deliver an interrupt (SIGINT) to the process.
    fn interrupt(&mut self) -> io::Result<()>;

    /// OS process id.
    fn pid(&self) -> Option<u32>;
}

/// Streams and handle of a launched process.
pub struct Spawned {
    /// Child input.
    pub stdin: Box<dyn Write + Send>,
    /// Child stdout, or the terminal stream on a pseudo-terminal.
    pub stdout: Box<dyn Read + Send>,
    /// Child stderr; `None` when it is merged into the terminal stream.
    pub stderr: Option<Box<dyn Read + Send>>,
    /// The process.
    pub process: Box<dyn ProcessHandle>,
    /// Master side of the pseudo-terminal, kept open for the session's lifetime.
    pub terminal: Option<Box<dyn MasterPty + Send>>,
}

impl fmt::Debug for Spawned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawned")
            .field("process", &self.process)
            .field("has_stderr", &self.stderr.is_some())
            .field("has_terminal", &self.terminal.is_some())
            .finish()
    }
}

/// Something that can start processes for sessions.
pub trait Launcher: Send + Sync + fmt::Debug {
    /// Start the process described by `spec`.
    fn spawn(&self, spec: &LaunchSpec) -> io::Result<Spawned>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_splits_on_whitespace() {
        let spec = LaunchSpec::new("ssh  -t user@host");
        assert_eq!(spec.argv().unwrap(), vec!["ssh", "-t", "user@host"]);
    }

    #[test]
    fn test_argv_keeps_quoted_words() {
        let spec = LaunchSpec::new(r#"grep 'a b' file "x \"y\"" c\ d"#);
        assert_eq!(
            spec.argv().unwrap(),
            vec!["grep", "a b", "file", r#"x "y""#, "c d"]
        );
    }

    #[test]
    fn test_argv_rejects_unbalanced_quote() {
        let err = LaunchSpec::new("ssh 'host").argv().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[cfg(unix)]
    #[test]
    fn test_argv_shell() {
        let mut spec = LaunchSpec::new("echo a && echo b");
        spec.use_shell = true;
        assert_eq!(spec.argv().unwrap(), vec!["sh", "-c", "echo a && echo b"]);
    }

    #[test]
    fn test_uses_pty() {
        let mut spec = LaunchSpec::new("cat");
        assert!(!spec.uses_pty());
        spec.use_pty_stdout = true;
        assert!(spec.uses_pty());
    }
}
