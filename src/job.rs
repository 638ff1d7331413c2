//! Background jobs in a shell session
//!
//! [`Session::background_job`] starts `command &` in the session's shell and
//! hands back a [`BackgroundJob`] that borrows the session. The job keeps
//! running while the session is driven through [`BackgroundJob::session`];
//! [`BackgroundJob::stop`] brings it back to the foreground, interrupts it,
//! and returns everything the job printed.

use crate::pattern::Pattern;
use crate::result::{Output, PatternError, SessionError};
use crate::session::{Expect, SendOptions, Session, Timeout};
use regex::Regex;
use tracing::{debug, warn};

const JOB_PID: &str = r"\[\d+\] +(\d+)";
const AMBIGUOUS: &str = "ambiguous job spec";

/// Output collected by a background job from start to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTranscript {
    /// PID the shell reported for the job, if it could be parsed.
    pub pid: Option<u32>,
    pub stdout: String,
    pub stderr: String,
}

/// A job running in the background of a shell session.
///
/// Dropping a job without calling [`stop`](Self::stop) leaves it running and
/// logs a warning.
#[derive(Debug)]
pub struct BackgroundJob<'s> {
    session: &'s mut Session,
    command: String,
    pid: Option<u32>,
    stdout: String,
    stderr: String,
    stopped: bool,
}

impl Session {
    /// Start `command` as a background job of the session's shell.
    ///
    /// Waits for `ready` (the prompt by default) up to `timeout`. The job
    /// PID is parsed from the shell's `[1] 12345` report; failing to find it
    /// is reported on the error sink but does not fail the call.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use interactrust::{Expect, Pattern, SendOptions, Session, Timeout};
    ///
    /// # async fn example(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    /// let mut job = session
    ///     .background_job("tail -f /var/log/syslog", Expect::Prompt, Timeout::secs(0.5))
    ///     .await?;
    /// job.session().cmd("logger hello", SendOptions::default()).await?;
    /// let transcript = job.stop().await?;
    /// assert!(transcript.stdout.contains("hello"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn background_job(
        &mut self,
        command: &str,
        ready: Expect,
        timeout: Timeout,
    ) -> Result<BackgroundJob<'_>, SessionError> {
        let command = command.trim_matches(|c| c == ' ' || c == '&').to_string();
        let output = self
            .cmd(
                &format!("{} &", command),
                SendOptions::new().expect(ready).timeout(timeout),
            )
            .await?;

        let pid = parse_job_pid(&output.stdout)?;
        match pid {
            Some(pid) => debug!(%command, pid, "background job started"),
            None => self
                .sink()
                .error(&format!("Fail to get process id for \"{}\"", command)),
        }

        Ok(BackgroundJob {
            session: self,
            command,
            pid,
            stdout: output.stdout,
            stderr: output.stderr,
            stopped: false,
        })
    }
}

impl<'s> BackgroundJob<'s> {
    /// PID the shell reported for the job.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The job's command line, without the trailing `&`.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The session the job runs in, for use while the job is running.
    pub fn session(&mut self) -> &mut Session {
        self.session
    }

    /// Bring the job to the foreground and interrupt it.
    ///
    /// When the shell reports the `fg <command>` reference as ambiguous, the
    /// most recent job is foregrounded instead.
    pub async fn stop(mut self) -> Result<JobTranscript, SessionError> {
        let escaped = regex::escape(&self.command);
        let mut expect = format!(r"\r?\n{}\r?\n", escaped);
        if let Some(prompt) = self.session.prompt() {
            expect.push('|');
            expect.push_str(&prompt.to_regex_source()?);
        }
        let expect = Pattern::regex(&expect).map_err(PatternError::from)?;

        let output = self
            .session
            .cmd(
                &format!("fg {}", self.command),
                SendOptions::new().continuous().expect(expect),
            )
            .await?;
        let ambiguous = output.stdout.contains(AMBIGUOUS);
        self.absorb(&output, |_| false);

        if ambiguous {
            debug!(command = %self.command, "job reference ambiguous, using fg");
            let expect = Pattern::regex(&format!(r"\r?\n{}", escaped)).map_err(PatternError::from)?;
            let output = self
                .session
                .cmd("fg", SendOptions::new().continuous().expect(expect))
                .await?;
            self.absorb(&output, |line| line == "fg");
        }

        let output = self.session.ctrl_c(SendOptions::new().continuous()).await?;
        self.stdout.push_str(&output.stdout);
        self.stderr.push_str(&output.stderr);

        self.stopped = true;
        Ok(JobTranscript {
            pid: self.pid,
            stdout: std::mem::take(&mut self.stdout),
            stderr: std::mem::take(&mut self.stderr),
        })
    }

    /// Append a foregrounding result, without the shell's echo of the job.
    fn absorb(&mut self, output: &Output, also_drop: impl Fn(&str) -> bool) {
        self.stdout
            .push_str(&job_lines(&output.stdout, &self.command, also_drop));
        self.stderr.push_str(&output.stderr);
    }
}

impl Drop for BackgroundJob<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            warn!(command = %self.command, pid = ?self.pid, "background job dropped without stop");
            self.session.sink().warn(&format!(
                "background job \"{}\" was not stopped and keeps running",
                self.command
            ));
        }
    }
}

fn parse_job_pid(text: &str) -> Result<Option<u32>, SessionError> {
    let re = Regex::new(JOB_PID).map_err(PatternError::from)?;
    Ok(re
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok()))
}

/// Lines of `text` except the shell's echo of `command` and job spec errors.
fn job_lines(text: &str, command: &str, also_drop: impl Fn(&str) -> bool) -> String {
    text.split_inclusive('\n')
        .filter(|line| {
            let bare = line.trim_end_matches(['\r', '\n']);
            let echoed = line.ends_with('\n') && bare.ends_with(command);
            !echoed && !line.contains(AMBIGUOUS) && !also_drop(bare)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_pid() {
        assert_eq!(parse_job_pid("sleep 9 &\r\n[1] 4242\r\n$ ").unwrap(), Some(4242));
        assert_eq!(parse_job_pid("[12]  77\n").unwrap(), Some(77));
        assert_eq!(parse_job_pid("no job here").unwrap(), None);
    }

    #[test]
    fn test_job_lines_drop_echo_and_errors() {
        let text = "fg ping host\r\nping host\r\n64 bytes from host\r\nsh: fg: ambiguous job spec\n$ ";
        assert_eq!(
            job_lines(text, "ping host", |_| false),
            "64 bytes from host\r\n$ "
        );
    }

    #[test]
    fn test_job_lines_extra_filter() {
        let text = "fg\nping host\nreply\n";
        assert_eq!(job_lines(text, "ping host", |line| line == "fg"), "reply\n");
    }

    #[test]
    fn test_unterminated_last_line_kept() {
        assert_eq!(job_lines("partial ping host", "ping host", |_| false), "partial ping host");
    }
}
