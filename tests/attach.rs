use std::os::unix::process::CommandExt;
use std::process::Command;

use anyhow::{bail, Result};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use ntest::timeout;
use pretty_assertions::assert_eq;
use ptrace_abi::{attach, consts, seize, Error, Options, Pid, SyscallInfoOp};

mod support;
use support::*;

#[test]
#[timeout(2000)]
fn test_attach_and_detach() -> Result<()> {
    let child = spawn_untraced_sleeper()?;
    let pid = child.pid();

    let mut tracee = attach(pid)?;
    assert_eq!(tracee.pid(), pid);

    // Attaching queues a `SIGSTOP`. If the child was still inside `execve()`, the
    // legacy exec `SIGTRAP` is reported first.
    loop {
        match wait_stop(pid)? {
            WaitStatus::Stopped(_, Signal::SIGSTOP) => break,
            WaitStatus::Stopped(_, Signal::SIGTRAP) => tracee.cont(None)?,
            status => bail!("unexpected stop after attach: {status:?}"),
        }
    }

    tracee.detach(None)?;

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_attach_nonexistent() -> Result<()> {
    // PID 0 never names a task we can trace.
    let pid = Pid::from_raw(0);

    match attach(pid) {
        Err(Error::Attach { pid: err_pid, .. }) => assert_eq!(err_pid, pid),
        other => panic!("unexpected: {other:?}"),
    }

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_seize_interrupt_listen() -> Result<()> {
    let child = spawn_untraced_sleeper()?;
    let pid = child.pid();

    let mut tracee = seize(pid, Options::PTRACE_O_TRACESYSGOOD | Options::PTRACE_O_EXITKILL)?;

    // Seizing does not stop the tracee; an interrupt reports a `PTRACE_EVENT_STOP`.
    tracee.interrupt()?;
    assert_eq!(
        wait_stop(pid)?,
        WaitStatus::PtraceEvent(pid, Signal::SIGTRAP, consts::PTRACE_EVENT_STOP),
    );

    let info = tracee.syscall_info()?;
    assert_eq!(info.op(), SyscallInfoOp::None);

    // Listening leaves the tracee stopped, but no longer in a ptrace-stop, so
    // requests fail.
    tracee.listen()?;
    let err = tracee.syscall_info().unwrap_err();
    assert!(err.tracee_died());

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_traceme_only_once() -> Result<()> {
    let mut cmd = Command::new("true");

    // A second request fails, because the child is already traced.
    unsafe {
        cmd.pre_exec(|| {
            traceme_hook()?;
            traceme_hook()
        })
    };

    let err = cmd.spawn().unwrap_err();
    assert_eq!(err.raw_os_error(), Some(Errno::EPERM as i32));

    Ok(())
}
