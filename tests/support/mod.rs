#![allow(dead_code)]

use std::io;
use std::ops::{Deref, DerefMut};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

use anyhow::{bail, Result};
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use ptrace_abi::{traceme, Pid, Tracee};

/// A child process, killed and reaped when dropped, even if a test fails first.
pub struct Reaped(pub Child);

impl Reaped {
    pub fn pid(&self) -> Pid {
        Pid::from_raw(self.0.id() as i32)
    }
}

impl Deref for Reaped {
    type Target = Child;

    fn deref(&self) -> &Child {
        &self.0
    }
}

impl DerefMut for Reaped {
    fn deref_mut(&mut self) -> &mut Child {
        &mut self.0
    }
}

impl Drop for Reaped {
    fn drop(&mut self) {
        // Either may fail if the test already reaped the child.
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// A traced child process, stopped at the `SIGTRAP` that follows its `execve()`.
pub struct Traced {
    pub child: Reaped,
    pub tracee: Tracee,
}

impl Traced {
    pub fn pid(&self) -> Pid {
        self.tracee.pid()
    }

    /// Kill and reap the child.
    pub fn finish(mut self) -> Result<()> {
        self.child.kill()?;
        self.child.wait()?;
        Ok(())
    }
}

/// `PTRACE_TRACEME`, as a `pre_exec()` hook.
pub fn traceme_hook() -> io::Result<()> {
    traceme().map_err(|err| {
        let errno = err.errno().map(|errno| errno as i32).unwrap_or(libc::EINVAL);
        io::Error::from_raw_os_error(errno)
    })
}

/// Spawn `cmd` with a pre-exec `PTRACE_TRACEME` request, and wait for its exec stop.
pub fn spawn(mut cmd: Command) -> Result<Traced> {
    unsafe { cmd.pre_exec(traceme_hook) };

    let child = Reaped(cmd.spawn()?);
    let pid = child.pid();

    match waitpid(pid, None)? {
        WaitStatus::Stopped(_, Signal::SIGTRAP) => {},
        status => bail!("unexpected exec stop: {status:?}"),
    }

    let tracee = Tracee::new(pid);

    Ok(Traced { child, tracee })
}

/// Spawn a long-lived tracee.
pub fn spawn_sleeper() -> Result<Traced> {
    let mut cmd = Command::new("sleep");
    cmd.arg("60");
    spawn(cmd)
}

/// Spawn a long-lived child which is not traced.
pub fn spawn_untraced_sleeper() -> Result<Reaped> {
    let child = Command::new("sleep").arg("60").spawn()?;
    Ok(Reaped(child))
}

/// Wait for the next stop of `pid`, failing if it exits instead.
pub fn wait_stop(pid: Pid) -> Result<WaitStatus> {
    let status = waitpid(pid, None)?;

    match status {
        WaitStatus::Exited(..) | WaitStatus::Signaled(..) => {
            bail!("tracee terminated: {status:?}")
        },
        _ => Ok(status),
    }
}
