//! The expect loop behind every session call

use super::{Expect, SendOptions, Session, Timeout};
use crate::console::{KeyFeed, CTRL_C, CTRL_SQUARE};
use crate::mux::{Channel, ReadySet};
use crate::pattern::Matcher;
use crate::result::{EndReason, Output, SessionError, Stream};
use crate::sink::{HideOutput, OutputSink};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How a wait ended, before the buffers are closed.
struct Ending {
    reason: EndReason,
    matched: Option<Stream>,
    captures: Vec<String>,
}

impl Ending {
    fn unmatched(reason: EndReason) -> Self {
        Self {
            reason,
            matched: None,
            captures: Vec::new(),
        }
    }
}

fn lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

impl Session {
    /// One call: pre-flush, write, wait, close the books.
    pub(super) async fn send_inner(
        &mut self,
        input: &[u8],
        opts: &SendOptions,
        mut keys: Option<&mut KeyFeed>,
    ) -> Result<Output, SessionError> {
        if !self.is_alive() {
            return Err(self.dropped_error());
        }

        if let Some(prompt) = &opts.new_prompt {
            self.prompt = Some(prompt.clone());
        }
        let timeout = opts.timeout.unwrap_or(Timeout::After(self.timeout));
        let idle_timeout = opts.idle_timeout.or(self.idle_timeout);
        let mut delay = opts.delay.filter(|d| !d.is_zero()).unwrap_or(self.delay);
        if let Timeout::After(limit) = timeout {
            delay = delay.min(limit);
        }
        let expect = match &opts.expect {
            Expect::Prompt => self.prompt.clone(),
            Expect::Pattern(pattern) => Some(pattern.clone()),
            Expect::Nothing => None,
        };
        let matcher: Option<Box<dyn Matcher>> = expect.as_ref().map(|p| p.to_matcher()).transpose()?;
        let describe = expect.as_ref().map(|p| p.describe().to_string());

        let sink = Arc::clone(&self.sink);
        let hidden = HideOutput(sink.as_ref());
        let out: &dyn OutputSink = if opts.hide_output { &hidden } else { sink.as_ref() };

        let start = Instant::now();
        self.idle.start_call();
        self.pre_flush(out, opts.continuous_output, idle_timeout.is_some())
            .await;

        if !input.is_empty() {
            if !opts.hide_input {
                out.input(&lossy(input));
            }
            self.write_input(input).await?;
        }

        if timeout == Timeout::NoWait {
            out.warn(&format!(
                "timeout is NoWait, returned without waiting for any output. \
                 The output from {:?} may defer to next execution.",
                lossy(input)
            ));
            return Ok(Output::empty(EndReason::NoWait));
        }

        self.stdout.begin_call(opts.continuous_output);
        self.stderr.begin_call(opts.continuous_output);

        let track_idle = idle_timeout.is_some();
        let mut intercepted: Vec<u8> = Vec::new();

        let ending = loop {
            if let Some(code) = self.exit_status() {
                // Bytes written right before exit may still be in flight.
                self.final_drain(out, track_idle, delay.max(self.delay)).await;
                if !opts.hide_output {
                    self.sink.warn(&format!(
                        "Process {} has exited with code {}",
                        self.name, code
                    ));
                }
                break match matcher.as_deref().and_then(|m| self.check_match(m)) {
                    Some(ending) => ending,
                    None => Ending::unmatched(EndReason::ProcessExited),
                };
            }

            let slice = match timeout {
                Timeout::After(limit) => delay.min(limit.saturating_sub(start.elapsed())),
                _ => delay,
            };
            let ready = match self.conn.as_mut() {
                Some(conn) => conn.mux.wait_ready(slice, keys.as_deref_mut()).await,
                None => ReadySet::default(),
            };

            if ready.keyboard && self.forward_keys(out, &mut intercepted).await? {
                break Ending::unmatched(EndReason::Detached);
            }
            self.absorb(ready, out, track_idle);

            if let Some(ending) = matcher.as_deref().and_then(|m| self.check_match(m)) {
                break ending;
            }

            if let Timeout::After(limit) = timeout {
                if start.elapsed() >= limit {
                    if let Some(describe) = &describe {
                        out.warn(&format!(
                            "{} timed out for {:?}, timeout {:.3} seconds, expect \"{}\".",
                            self.name,
                            lossy(input),
                            limit.as_secs_f64(),
                            describe
                        ));
                    }
                    break Ending::unmatched(EndReason::Timeout);
                }
            }

            if let Some(idle) = idle_timeout {
                if let Some(silent) = self.idle.idle_for(Instant::now()) {
                    if silent >= idle {
                        if let Some(describe) = &describe {
                            out.warn(&format!(
                                "{} idled out for {:?}, idle timeout {:.3} seconds, past max_idle_gap {:.3}, \
                                 this max_gap {:.3}, expect \"{}\".",
                                self.name,
                                lossy(input),
                                idle.as_secs_f64(),
                                self.idle.max_idle_gap().as_secs_f64(),
                                self.idle.current_max_gap().as_secs_f64(),
                                describe
                            ));
                        }
                        break Ending::unmatched(EndReason::IdleTimeout);
                    }
                }
            }
        };

        self.idle.finish_call();
        debug!(
            name = %self.name,
            ended = ?ending.reason,
            matched = ?ending.matched,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "call finished"
        );

        let (stdout, previous_out) = self.stdout.finish_call(opts.peek);
        let (stderr, previous_err) = self.stderr.finish_call(opts.peek);

        if let Some(describe) = &describe {
            if stdout.is_empty() && !opts.ignore_no_output {
                out.warn(&format!(
                    "{} has no output for {:?}, expecting \"{}\".",
                    self.name,
                    lossy(input),
                    describe
                ));
            }
        }

        self.scrollback.record(&previous_out, &stdout);
        self.scrollback.record(&previous_err, &stderr);

        if opts.end_with_newline && !stdout.ends_with(b"\n") {
            out.stdout("\n");
        }

        let detached = ending.reason == EndReason::Detached;
        Ok(Output {
            stdout: lossy(&stdout),
            stderr: lossy(&stderr),
            matched: ending.matched,
            captures: ending.captures,
            intercepted: detached.then(|| lossy(&intercepted)),
            ended: ending.reason,
        })
    }

    /// Collect output that arrived between calls into the leftovers.
    async fn pre_flush(&mut self, out: &dyn OutputSink, continuous: bool, track_idle: bool) {
        if self.exit_status().is_some() {
            return;
        }
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        let ready = conn.mux.wait_ready(Duration::ZERO, None).await;

        if ready.stdout {
            if let Ok(data) = conn.mux.read_available(Channel::Stdout) {
                let chunk = self.stdout.push_leftover(&data);
                if continuous {
                    out.stdout(&lossy(&chunk));
                } else {
                    out.stdout(&format!(
                        "previous remaining stdout output: \"{}\"",
                        lossy(self.stdout.leftover())
                    ));
                }
            }
        }
        if ready.stderr {
            if let Ok(data) = conn.mux.read_available(Channel::Stderr) {
                let chunk = self.stderr.push_leftover(&data);
                if continuous {
                    out.stderr(&lossy(&chunk));
                } else {
                    out.stderr(&format!(
                        "previous remaining stderr output: \"{}\"",
                        lossy(self.stderr.leftover())
                    ));
                }
            }
        }
        if continuous && track_idle && (ready.stdout || ready.stderr) {
            self.idle.touch(Instant::now());
        }
    }

    /// Read whatever `ready` reports, stderr first, into the call buffers.
    fn absorb(&mut self, ready: ReadySet, out: &dyn OutputSink, track_idle: bool) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        let reads = [
            (ready.stderr, Channel::Stderr),
            (ready.stdout, Channel::Stdout),
        ];
        for (is_ready, channel) in reads {
            if !is_ready {
                continue;
            }
            match conn.mux.read_available(channel) {
                Ok(data) => {
                    trace!(?channel, bytes = data.len(), "absorbed");
                    if channel == Channel::Stderr {
                        let chunk = self.stderr.append(&data);
                        out.stderr(&lossy(&chunk));
                    } else {
                        let chunk = self.stdout.append(&data);
                        out.stdout(&lossy(&chunk));
                    }
                    if track_idle {
                        self.idle.record(Instant::now());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => debug!(?channel, error = %e, "read failed"),
            }
        }
    }

    /// Wait a bounded time for the streams of an exited process to close.
    async fn final_drain(&mut self, out: &dyn OutputSink, track_idle: bool, within: Duration) {
        let deadline = Instant::now() + within;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let ready = match self.conn.as_mut() {
                Some(conn) => conn.mux.wait_ready(remaining, None).await,
                None => return,
            };
            self.absorb(ready, out, track_idle);

            let exhausted = self.conn.as_ref().is_none_or(|conn| conn.mux.exhausted());
            if exhausted || remaining.is_zero() {
                return;
            }
        }
    }

    /// Search stdout, then stderr; split the first match off as the result.
    fn check_match(&mut self, matcher: &dyn Matcher) -> Option<Ending> {
        let (stream, found) = if let Some(found) = self.stdout.find(matcher) {
            self.stdout.split_at_match(found.end);
            (Stream::Stdout, found)
        } else if let Some(found) = self.stderr.find(matcher) {
            self.stderr.split_at_match(found.end);
            (Stream::Stderr, found)
        } else {
            return None;
        };
        Some(Ending {
            reason: EndReason::Matched,
            matched: Some(stream),
            captures: found.captures,
        })
    }

    /// Forward intercepted keystrokes to the child.
    ///
    /// Returns true when the detach key was pressed.
    async fn forward_keys(
        &mut self,
        out: &dyn OutputSink,
        intercepted: &mut Vec<u8>,
    ) -> Result<bool, SessionError> {
        let keys = match self.conn.as_mut() {
            Some(conn) => match conn.mux.read_available(Channel::Keyboard) {
                Ok(keys) => keys,
                Err(_) => return Ok(false),
            },
            None => return Ok(false),
        };
        let local_echo = self.launch.disable_echo && self.on_terminal();

        let mut pending: Vec<u8> = Vec::with_capacity(keys.len());
        for &key in keys.iter() {
            match key {
                CTRL_SQUARE => {
                    if !pending.is_empty() {
                        self.write_input(&pending).await?;
                    }
                    debug!(name = %self.name, "detached by Ctrl-]");
                    return Ok(true);
                }
                CTRL_C if self.replace_interrupt => {
                    if !pending.is_empty() {
                        self.write_input(&pending).await?;
                        pending.clear();
                    }
                    self.interrupt().await?;
                    intercepted.push(key);
                }
                _ => {
                    pending.push(key);
                    intercepted.push(key);
                    if local_echo {
                        if key == b'\r' {
                            out.input("\n");
                        } else if key.is_ascii_graphic() || key == b' ' {
                            out.input(&(key as char).to_string());
                        }
                    }
                }
            }
        }
        if !pending.is_empty() {
            self.write_input(&pending).await?;
        }
        Ok(false)
    }
}
