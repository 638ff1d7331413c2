//! Raw mode for the local terminal

use bytes::Bytes;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, OutputFlags, SetArg, Termios};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// How long the key pump blocks in `poll(2)` before checking for shutdown.
const KEY_POLL_MS: u16 = 50;

/// Guard holding the controlling terminal in raw, non-blocking mode.
///
/// Output post-processing stays on so the child's line feeds still render.
/// The previous terminal attributes and file status flags are restored when
/// the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct TerminalMode {
    tty: File,
    saved: Termios,
    saved_flags: OFlag,
}

impl TerminalMode {
    /// Switch the controlling terminal (`/dev/tty`) to raw mode.
    pub fn acquire() -> io::Result<Self> {
        let tty = OpenOptions::new().read(true).write(true).open("/dev/tty")?;

        let saved = tcgetattr(tty.as_fd())?;
        let saved_flags = OFlag::from_bits_truncate(fcntl(tty.as_raw_fd(), FcntlArg::F_GETFL)?);

        let mut raw = saved.clone();
        cfmakeraw(&mut raw);
        raw.output_flags.insert(OutputFlags::OPOST);
        tcsetattr(tty.as_fd(), SetArg::TCSANOW, &raw)?;

        if let Err(e) = fcntl(tty.as_raw_fd(), FcntlArg::F_SETFL(saved_flags | OFlag::O_NONBLOCK)) {
            let _ = tcsetattr(tty.as_fd(), SetArg::TCSANOW, &saved);
            return Err(e.into());
        }

        super::set_raw_mode_active(true);
        debug!("local terminal switched to raw mode");
        Ok(Self {
            tty,
            saved,
            saved_flags,
        })
    }

    pub(crate) fn try_clone_tty(&self) -> io::Result<File> {
        self.tty.try_clone()
    }
}

impl Drop for TerminalMode {
    fn drop(&mut self) {
        if let Err(e) = tcsetattr(self.tty.as_fd(), SetArg::TCSADRAIN, &self.saved) {
            warn!("failed to restore terminal attributes: {}", e);
        }
        if let Err(e) = fcntl(self.tty.as_raw_fd(), FcntlArg::F_SETFL(self.saved_flags)) {
            warn!("failed to restore terminal flags: {}", e);
        }
        super::set_raw_mode_active(false);
        debug!("local terminal restored");
    }
}

/// Pump keystrokes from the terminal into `tx` until `stop` is set or the
/// receiving side goes away.
pub(super) fn spawn_key_pump(
    mut tty: File,
    tx: UnboundedSender<Bytes>,
    stop: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("interactrust-keys".to_string())
        .spawn(move || {
            let mut buf = [0u8; 1024];
            while !stop.load(Ordering::SeqCst) && !tx.is_closed() {
                let ready = {
                    let mut fds = [PollFd::new(tty.as_fd(), PollFlags::POLLIN)];
                    match poll(&mut fds, PollTimeout::from(KEY_POLL_MS)) {
                        Ok(n) => n > 0,
                        Err(Errno::EINTR) => false,
                        Err(e) => {
                            warn!("polling the terminal failed: {}", e);
                            break;
                        }
                    }
                };
                if !ready {
                    continue;
                }
                match tty.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                            break;
                        }
                    }
                    Err(e)
                        if e.kind() == io::ErrorKind::WouldBlock
                            || e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!("reading the terminal failed: {}", e);
                        break;
                    }
                }
            }
        })
}
