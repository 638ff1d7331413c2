//! Jobs running beside the caller with buffered transcripts
//!
//! A parallel job gets its own [`CaptureSink`]; whatever its sessions print
//! is held back and replayed into the caller's sink in one block when the
//! job is joined, so it never interleaves with the caller's live output.
//!
//! Sessions are not shared with a job. A job opens its own, passing the
//! provided sink to [`SessionBuilder::sink`](crate::SessionBuilder::sink).

use crate::result::SessionError;
use crate::sink::{CaptureSink, OutputSink, SinkChannel};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// A running parallel job.
#[derive(Debug)]
pub struct ParallelTask<T> {
    name: String,
    capture: CaptureSink,
    handle: JoinHandle<T>,
}

/// What a joined job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelOutcome<T> {
    /// Child stdout printed by the job's sessions.
    pub stdout: String,
    /// Child stderr printed by the job's sessions.
    pub stderr: String,
    /// Return value of the job.
    pub value: T,
}

/// Start `job` on its own task.
///
/// # Examples
///
/// ```no_run
/// use interactrust::{run_parallel, ConsoleSink, SendOptions, Session};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let task = run_parallel("build", |sink| async move {
///     let mut session = Session::builder().sink(sink).spawn("sh").await?;
///     let output = session.cmd("make -j8", SendOptions::default()).await?;
///     Ok::<_, interactrust::SessionError>(output.is_match())
/// });
///
/// // ... drive other sessions meanwhile ...
///
/// let outcome = task.join(&ConsoleSink).await?;
/// let built = outcome.value?;
/// # Ok(())
/// # }
/// ```
pub fn run_parallel<F, Fut, T>(name: impl Into<String>, job: F) -> ParallelTask<T>
where
    F: FnOnce(Arc<dyn OutputSink>) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    let capture = CaptureSink::new();
    let sink: Arc<dyn OutputSink> = Arc::new(capture.clone());
    debug!(%name, "starting parallel job");
    let handle = tokio::spawn(job(sink));
    ParallelTask {
        name,
        capture,
        handle,
    }
}

impl<T> ParallelTask<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the job, then replay its transcript into `parent` under a
    /// header.
    ///
    /// # Errors
    ///
    /// [`SessionError::TaskFailed`] when the job panicked; its transcript is
    /// still replayed.
    pub async fn join(self, parent: &dyn OutputSink) -> Result<ParallelOutcome<T>, SessionError> {
        let joined = self.handle.await;
        let stdout = self.capture.text(SinkChannel::Stdout);
        let stderr = self.capture.text(SinkChannel::Stderr);

        parent.notice(&format!("Output of parallel job \"{}\":", self.name));
        self.capture.drain_into(parent);
        debug!(name = %self.name, "parallel job joined");

        let value = joined.map_err(|e| SessionError::TaskFailed(format!("{}: {}", self.name, e)))?;
        Ok(ParallelOutcome {
            stdout,
            stderr,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_replays_transcript_after_header() {
        let task = run_parallel("worker", |sink| async move {
            sink.input("ls\n");
            sink.stdout("a.txt\n");
            sink.stderr("warning\n");
            7
        });

        let parent = CaptureSink::new();
        parent.stdout("parent line\n");
        let outcome = task.join(&parent).await.unwrap();

        assert_eq!(outcome.value, 7);
        assert_eq!(outcome.stdout, "a.txt\n");
        assert_eq!(outcome.stderr, "warning\n");

        let events = parent.events();
        assert_eq!(events[0], (SinkChannel::Stdout, "parent line\n".to_string()));
        assert_eq!(events[1].0, SinkChannel::Notice);
        assert!(events[1].1.contains("worker"));
        assert_eq!(events[2], (SinkChannel::Input, "ls\n".to_string()));
    }

    #[tokio::test]
    async fn test_panicking_job_is_task_failure() {
        let task = run_parallel("boom", |sink| async move {
            sink.stdout("before\n");
            let fail = true;
            if fail {
                panic!("job failed");
            }
        });
        let parent = CaptureSink::new();
        let err = task.join(&parent).await.unwrap_err();

        assert!(matches!(err, SessionError::TaskFailed(ref msg) if msg.contains("boom")));
        assert_eq!(parent.text(SinkChannel::Stdout), "before\n");
    }
}
