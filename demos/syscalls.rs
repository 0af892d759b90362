use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

use anyhow::Result;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use ptrace_abi::{traceme, Options, Pid, SyscallStop, Tracee};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(StructOpt, Debug)]
struct Opt {
    /// Also print syscall-exit-stops.
    #[structopt(short, long)]
    exits: bool,

    #[structopt(required = true, min_values = 1)]
    argv: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();

    let mut cmd = Command::new(&opt.argv[0]);

    if let Some(args) = opt.argv.get(1..) {
        cmd.args(args);
    }

    unsafe {
        cmd.pre_exec(|| {
            traceme().map_err(|err| {
                let errno = err.errno().map(|errno| errno as i32).unwrap_or(libc::EINVAL);
                io::Error::from_raw_os_error(errno)
            })
        })
    };

    let child = cmd.spawn()?;
    let pid = Pid::from_raw(child.id() as i32);

    // Exec stop.
    waitpid(pid, None)?;

    let mut tracee = Tracee::new(pid);
    tracee.set_options(Options::PTRACE_O_TRACESYSGOOD | Options::PTRACE_O_EXITKILL)?;
    tracee.syscall(None)?;

    loop {
        let signal = match waitpid(pid, None)? {
            WaitStatus::Exited(_, code) => {
                println!("exited with {}", code);
                break;
            },
            WaitStatus::Signaled(_, signal, _) => {
                println!("killed by {}", signal);
                break;
            },
            WaitStatus::PtraceSyscall(_) => {
                let info = tracee.syscall_info()?;

                match info.stop {
                    SyscallStop::Entry { nr, args } => {
                        println!("{:>16x}: {}({:x?})", info.instruction_pointer, nr, args);
                    },
                    SyscallStop::Exit { rval, is_error } if opt.exits => {
                        println!("{:>16x}: = {} (error = {})", info.instruction_pointer, rval, is_error);
                    },
                    _ => {},
                }

                None
            },
            WaitStatus::Stopped(_, Signal::SIGTRAP) => None,
            WaitStatus::Stopped(_, signal) => Some(signal),
            _ => None,
        };

        tracee.syscall(signal)?;
    }

    Ok(())
}
