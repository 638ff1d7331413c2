//! Launcher backed by the operating system

use super::{LaunchSpec, Launcher, ProcessHandle, Spawned};
use portable_pty::{native_pty_system, Child, CommandBuilder, PtySize};
use std::io;
use std::process::{Command, Stdio};
use tracing::debug;

/// Launches real processes.
///
/// Without pseudo-terminal flags the child gets three pipes. With either flag
/// it runs on a pseudo-terminal from `portable-pty` as the leader of a new
/// session, so shells get job control and login clients find a terminal;
/// its stderr then shares the terminal stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLauncher;

impl Launcher for NativeLauncher {
    fn spawn(&self, spec: &LaunchSpec) -> io::Result<Spawned> {
        let argv = spec.argv()?;
        if argv.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "Empty command"));
        }
        if spec.uses_pty() {
            spawn_pty(spec, &argv)
        } else {
            spawn_pipes(spec, &argv)
        }
    }
}

fn spawn_pty(spec: &LaunchSpec, argv: &[String]) -> io::Result<Spawned> {
    let (rows, cols) = spec.pty_size;
    let pair = native_pty_system()
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(io::Error::other)?;

    let mut cmd = CommandBuilder::new(&argv[0]);
    cmd.args(&argv[1..]);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.cwd {
        cmd.cwd(dir);
    }

    let child = pair.slave.spawn_command(cmd).map_err(io::Error::other)?;
    // Only the child holds the slave now, so reads see EOF once it exits.
    drop(pair.slave);

    let reader = pair.master.try_clone_reader().map_err(io::Error::other)?;
    let writer = pair.master.take_writer().map_err(io::Error::other)?;

    if spec.disable_echo {
        #[cfg(unix)]
        super::terminal::set_echo(pair.master.as_ref(), false)?;
        #[cfg(not(unix))]
        debug!("terminal echo control is not supported on this platform");
    }

    debug!(command = %spec.command, pid = ?child.process_id(), "spawned on pseudo-terminal");

    Ok(Spawned {
        stdin: writer,
        stdout: reader,
        stderr: None,
        process: Box::new(PtyProcess { child }),
        terminal: Some(pair.master),
    })
}

fn spawn_pipes(spec: &LaunchSpec, argv: &[String]) -> io::Result<Spawned> {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn()?;
    let missing = || io::Error::other("child stdio was not captured");
    let stdin = child.stdin.take().ok_or_else(missing)?;
    let stdout = child.stdout.take().ok_or_else(missing)?;
    let stderr = child.stderr.take().ok_or_else(missing)?;

    if spec.disable_echo {
        debug!("echo control ignored: stdin is a pipe");
    }
    debug!(command = %spec.command, pid = child.id(), "spawned with pipes");

    Ok(Spawned {
        stdin: Box::new(stdin),
        stdout: Box::new(stdout),
        stderr: Some(Box::new(stderr)),
        process: Box::new(PipeProcess { child }),
        terminal: None,
    })
}

#[derive(Debug)]
struct PtyProcess {
    child: Box<dyn Child + Send + Sync>,
}

impl ProcessHandle for PtyProcess {
    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(|status| status.exit_code() as i32))
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn interrupt(&mut self) -> io::Result<()> {
        signal_interrupt(self.child.process_id())
    }

    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }
}

#[derive(Debug)]
struct PipeProcess {
    child: std::process::Child,
}

impl ProcessHandle for PipeProcess {
    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| status.code().unwrap_or(-1)))
    }

    fn terminate(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }?;
        // Reap it so no zombie is left behind.
        self.child.wait().map(|_| ())
    }

    fn interrupt(&mut self) -> io::Result<()> {
        signal_interrupt(Some(self.child.id()))
    }

    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }
}

#[cfg(unix)]
fn signal_interrupt(pid: Option<u32>) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = pid.ok_or_else(|| io::Error::other("process id unknown"))?;
    kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn signal_interrupt(_pid: Option<u32>) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interrupt signals are not supported on this platform",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::{Duration, Instant};

    fn wait_exit(process: &mut dyn ProcessHandle) -> Option<i32> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(code) = process.try_wait().unwrap() {
                return Some(code);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn test_pipe_launch_separates_stderr() {
        let mut spec = LaunchSpec::new("echo out; echo err 1>&2");
        spec.use_shell = true;
        let mut spawned = NativeLauncher.spawn(&spec).unwrap();

        let mut out = String::new();
        spawned.stdout.read_to_string(&mut out).unwrap();
        let mut err = String::new();
        spawned.stderr.take().unwrap().read_to_string(&mut err).unwrap();

        assert_eq!(out, "out\n");
        assert_eq!(err, "err\n");
        assert_eq!(wait_exit(spawned.process.as_mut()), Some(0));
    }

    #[test]
    fn test_pipe_exit_code() {
        let mut spec = LaunchSpec::new("exit 3");
        spec.use_shell = true;
        let mut spawned = NativeLauncher.spawn(&spec).unwrap();
        assert_eq!(wait_exit(spawned.process.as_mut()), Some(3));
    }

    #[test]
    fn test_pty_launch_has_no_separate_stderr() {
        let mut spec = LaunchSpec::new("echo on-terminal");
        spec.use_pty_stdout = true;
        let mut spawned = NativeLauncher.spawn(&spec).unwrap();
        assert!(spawned.stderr.is_none());
        assert!(spawned.terminal.is_some());
        assert_eq!(wait_exit(spawned.process.as_mut()), Some(0));
    }

    #[test]
    fn test_terminate() {
        let spec = LaunchSpec::new("sleep 30");
        let mut spawned = NativeLauncher.spawn(&spec).unwrap();
        assert_eq!(spawned.process.try_wait().unwrap(), None);
        spawned.process.terminate().unwrap();
        assert!(wait_exit(spawned.process.as_mut()).is_some());
    }

    #[test]
    fn test_empty_command_rejected() {
        let err = NativeLauncher.spawn(&LaunchSpec::new("   ")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
