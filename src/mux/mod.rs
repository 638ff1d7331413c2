//! Byte-stream multiplexer
//!
//! Each child stream is read by a dedicated thread that pumps chunks into a
//! channel. The session waits on all channels at once, bounded by a time
//! slice, and then drains whatever is ready without blocking.

use crate::console::KeyFeed;
use bytes::{Bytes, BytesMut};
use std::io::{self, Read};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tracing::{debug, trace};

const READ_CHUNK: usize = 4096;

/// Back-off for readers on non-blocking descriptors with nothing to read.
const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(10);

/// Streams a wait can report ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Stdout,
    Stderr,
    Keyboard,
}

/// Streams with data waiting after a [`Multiplexer::wait_ready`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReadySet {
    pub stdout: bool,
    pub stderr: bool,
    pub keyboard: bool,
}

impl ReadySet {
    pub fn any(&self) -> bool {
        self.stdout || self.stderr || self.keyboard
    }
}

/// One child stream as seen by the session.
#[derive(Debug)]
struct Source {
    rx: UnboundedReceiver<Bytes>,
    pending: BytesMut,
    closed: bool,
}

impl Source {
    fn new(rx: UnboundedReceiver<Bytes>) -> Self {
        Self {
            rx,
            pending: BytesMut::new(),
            closed: false,
        }
    }

    /// A source that never produces anything.
    fn absent() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            pending: BytesMut::new(),
            closed: true,
        }
    }

    /// Move everything queued into `pending`; true when data is waiting.
    fn sweep(&mut self) -> bool {
        while !self.closed {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.closed = true,
            }
        }
        !self.pending.is_empty()
    }

    fn accept(&mut self, chunk: Option<Bytes>) {
        match chunk {
            Some(chunk) => self.pending.extend_from_slice(&chunk),
            None => self.closed = true,
        }
    }

    fn take(&mut self) -> io::Result<Bytes> {
        if self.pending.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        Ok(self.pending.split().freeze())
    }

    fn exhausted(&self) -> bool {
        self.closed && self.pending.is_empty()
    }
}

/// Pump a blocking reader into a channel from its own thread.
///
/// The thread ends at end of file, on a read error, or once the receiving
/// side has been dropped and the next chunk cannot be delivered.
pub(crate) fn spawn_reader(
    name: &str,
    mut reader: Box<dyn Read + Send>,
) -> io::Result<UnboundedReceiver<Bytes>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let label = name.to_string();
    thread::Builder::new()
        .name(format!("interactrust-{}", name))
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!(stream = %label, "reader reached end of file");
                        break;
                    }
                    Ok(n) => {
                        trace!(stream = %label, bytes = n, "read chunk");
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(WOULD_BLOCK_BACKOFF);
                    }
                    Err(e) => {
                        // A pseudo-terminal master reports EIO once the child is gone.
                        debug!(stream = %label, error = %e, "reader stopped");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Waits on a child's stdout and stderr, plus an optional keystroke feed.
#[derive(Debug)]
pub(crate) struct Multiplexer {
    stdout: Source,
    stderr: Source,
    keyboard: BytesMut,
}

impl Multiplexer {
    pub fn new(stdout: UnboundedReceiver<Bytes>, stderr: Option<UnboundedReceiver<Bytes>>) -> Self {
        Self {
            stdout: Source::new(stdout),
            stderr: stderr.map(Source::new).unwrap_or_else(Source::absent),
            keyboard: BytesMut::new(),
        }
    }

    fn sweep(&mut self, keys: Option<&mut KeyFeed>) -> ReadySet {
        if let Some(feed) = keys {
            while let Some(chunk) = feed.try_take() {
                self.keyboard.extend_from_slice(&chunk);
            }
        }
        ReadySet {
            stdout: self.stdout.sweep(),
            stderr: self.stderr.sweep(),
            keyboard: !self.keyboard.is_empty(),
        }
    }

    /// Wait up to `max_wait` for any stream to have data.
    ///
    /// Returns at once when something is already waiting. With a zero
    /// `max_wait` this only collects what has arrived. Streams that became
    /// ready together are reported together.
    pub async fn wait_ready(&mut self, max_wait: Duration, mut keys: Option<&mut KeyFeed>) -> ReadySet {
        let ready = self.sweep(keys.as_deref_mut());
        if ready.any() || max_wait.is_zero() {
            return ready;
        }

        let keys_open = keys.as_ref().is_some_and(|feed| feed.is_open());
        let stdout_open = !self.stdout.closed;
        let stderr_open = !self.stderr.closed;

        enum Woke {
            Stdout(Option<Bytes>),
            Stderr(Option<Bytes>),
            Keys(Option<Bytes>),
            Slice,
        }

        let woke = tokio::select! {
            chunk = self.stderr.rx.recv(), if stderr_open => Woke::Stderr(chunk),
            chunk = self.stdout.rx.recv(), if stdout_open => Woke::Stdout(chunk),
            chunk = recv_keys(keys.as_deref_mut()), if keys_open => Woke::Keys(chunk),
            _ = tokio::time::sleep(max_wait) => Woke::Slice,
        };

        match woke {
            Woke::Stdout(chunk) => self.stdout.accept(chunk),
            Woke::Stderr(chunk) => self.stderr.accept(chunk),
            Woke::Keys(Some(chunk)) => self.keyboard.extend_from_slice(&chunk),
            Woke::Keys(None) | Woke::Slice => {}
        }

        self.sweep(keys)
    }

    /// Take what is waiting on a channel.
    ///
    /// Fails with [`io::ErrorKind::WouldBlock`] when nothing is waiting.
    pub fn read_available(&mut self, channel: Channel) -> io::Result<Bytes> {
        match channel {
            Channel::Stdout => self.stdout.take(),
            Channel::Stderr => self.stderr.take(),
            Channel::Keyboard => {
                if self.keyboard.is_empty() {
                    return Err(io::ErrorKind::WouldBlock.into());
                }
                Ok(self.keyboard.split().freeze())
            }
        }
    }

    /// True once both child streams reached end of file and were drained.
    pub fn exhausted(&self) -> bool {
        self.stdout.exhausted() && self.stderr.exhausted()
    }
}

async fn recv_keys(keys: Option<&mut KeyFeed>) -> Option<Bytes> {
    match keys {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::sync::mpsc::UnboundedSender;

    fn mux() -> (UnboundedSender<Bytes>, UnboundedSender<Bytes>, Multiplexer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        (out_tx, err_tx, Multiplexer::new(out_rx, Some(err_rx)))
    }

    #[tokio::test]
    async fn test_wait_times_out_when_idle() {
        let (_out, _err, mut mux) = mux();
        let start = Instant::now();
        let ready = mux.wait_ready(Duration::from_millis(50), None).await;
        assert!(!ready.any());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_both_streams_reported_together() {
        let (out, err, mut mux) = mux();
        out.send(Bytes::from_static(b"token")).unwrap();
        err.send(Bytes::from_static(b"token")).unwrap();

        let ready = mux.wait_ready(Duration::from_millis(100), None).await;
        assert!(ready.stdout && ready.stderr);
        assert_eq!(&mux.read_available(Channel::Stdout).unwrap()[..], b"token");
        assert_eq!(&mux.read_available(Channel::Stderr).unwrap()[..], b"token");
    }

    #[tokio::test]
    async fn test_read_available_would_block() {
        let (_out, _err, mut mux) = mux();
        let err = mux.read_available(Channel::Stdout).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[tokio::test]
    async fn test_wakes_on_late_data() {
        let (out, _err, mut mux) = mux();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            out.send(Bytes::from_static(b"late")).unwrap();
        });
        let ready = mux.wait_ready(Duration::from_secs(5), None).await;
        assert!(ready.stdout);
    }

    #[tokio::test]
    async fn test_exhausted_after_close() {
        let (out, err, mut mux) = mux();
        out.send(Bytes::from_static(b"bye")).unwrap();
        drop(out);
        drop(err);

        mux.wait_ready(Duration::ZERO, None).await;
        assert!(!mux.exhausted());
        mux.read_available(Channel::Stdout).unwrap();
        assert!(mux.exhausted());
    }

    #[tokio::test]
    async fn test_missing_stderr() {
        let (_out_tx, out_rx) = mpsc::unbounded_channel();
        let mut mux = Multiplexer::new(out_rx, None);
        let ready = mux.wait_ready(Duration::from_millis(10), None).await;
        assert!(!ready.stderr);
    }

    #[tokio::test]
    async fn test_keyboard_feed() {
        let (_out, _err, mut mux) = mux();
        let (keys_tx, mut feed) = KeyFeed::channel();
        keys_tx.send(Bytes::from_static(b"q")).unwrap();

        let ready = mux.wait_ready(Duration::from_millis(100), Some(&mut feed)).await;
        assert!(ready.keyboard);
        assert_eq!(&mux.read_available(Channel::Keyboard).unwrap()[..], b"q");
    }

    #[test]
    fn test_spawn_reader_pumps_until_eof() {
        let data: &'static [u8] = b"hello world";
        let mut rx = spawn_reader("test", Box::new(data)).unwrap();
        let mut got = Vec::new();
        while let Some(chunk) = rx.blocking_recv() {
            got.extend_from_slice(&chunk);
        }
        assert_eq!(got, data);
    }
}
