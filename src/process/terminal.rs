//! Terminal attribute control for pseudo-terminals

use nix::fcntl::OFlag;
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};
use portable_pty::MasterPty;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;

/// Turn the echo of input characters on or off.
///
/// The attributes are set through the slave device, which shares its line
/// discipline with the child.
pub(crate) fn set_echo(master: &dyn MasterPty, enable: bool) -> io::Result<()> {
    let path = master
        .tty_name()
        .ok_or_else(|| io::Error::other("pseudo-terminal has no device name"))?;
    let tty = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NOCTTY.bits())
        .open(&path)?;

    let mut mode = tcgetattr(&tty)?;
    mode.local_flags.set(LocalFlags::ECHO, enable);
    tcsetattr(&tty, SetArg::TCSAFLUSH, &mode)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_pty::{native_pty_system, PtySize};

    fn echo_enabled(master: &dyn MasterPty) -> bool {
        let tty = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits())
            .open(master.tty_name().unwrap())
            .unwrap();
        tcgetattr(&tty).unwrap().local_flags.contains(LocalFlags::ECHO)
    }

    #[test]
    fn test_set_echo_toggles_flag() {
        let pair = native_pty_system().openpty(PtySize::default()).unwrap();

        set_echo(pair.master.as_ref(), false).unwrap();
        assert!(!echo_enabled(pair.master.as_ref()));

        set_echo(pair.master.as_ref(), true).unwrap();
        assert!(echo_enabled(pair.master.as_ref()));
    }
}
