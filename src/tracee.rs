//! Typed ptrace requests.
//!
//! Each request has its own wrapper, which checks its inputs, sets up the `addr` and
//! `data` arguments the kernel expects, and forwards to [`raw::ptrace()`].

use std::convert::TryFrom;
use std::marker::PhantomData;
use std::mem::{self, size_of};
use std::ptr;

use libc::{c_int, c_long, c_ulong, c_void};
use nix::errno::Errno;
use tracing::debug;

use crate::abi::{ptrace_syscall_info, PeekSigInfoArgs, RseqConfiguration, SeccompMetadata};
use crate::error::{Error, Result, ResultExt};
use crate::raw;
use crate::request::{Options, Request, Restart};
use crate::syscall_info::{SyscallInfo, SYSCALL_INFO_SIZE};

#[cfg(target_arch = "aarch64")]
use crate::aarch64;

pub use nix::unistd::Pid;

/// POSIX signal.
pub use nix::sys::signal::{SigSet, Signal};

/// Register state of a tracee.
#[cfg(target_arch = "aarch64")]
pub type Registers = aarch64::user_pt_regs;

/// Register state of a tracee.
#[cfg(target_arch = "x86_64")]
pub type Registers = libc::user_regs_struct;

/// Floating-point register state of a tracee.
#[cfg(target_arch = "aarch64")]
pub type FpRegisters = aarch64::user_fpsimd_state;

/// Floating-point register state of a tracee.
#[cfg(target_arch = "x86_64")]
pub type FpRegisters = libc::user_fpregs_struct;

/// Extended floating-point register state of a 32-bit x86 tracee.
#[cfg(target_arch = "x86")]
pub type FpxRegisters = libc::user_fpxregs_struct;

/// Extra signal info, such as its cause.
pub type Siginfo = libc::siginfo_t;

/// Seccomp BPF instruction, as returned by `PTRACE_SECCOMP_GET_FILTER`.
pub type SockFilter = libc::sock_filter;

/// Size of the kernel's signal set, as required by `PTRACE_GETSIGMASK` and
/// `PTRACE_SETSIGMASK`. Unlike `libc::sigset_t`, this is 64 bits.
const KERNEL_SIGSET_SIZE: usize = size_of::<u64>();

/// Make the calling process a tracee of its parent (`PTRACE_TRACEME`).
///
/// Intended for a forked child, before it calls `exec()`, such as in a
/// [`pre_exec()`](std::os::unix::process::CommandExt::pre_exec) hook. It neither logs
/// nor allocates, so it is safe to call there.
pub fn traceme() -> Result<()> {
    let request = Request::TraceMe;

    // SAFETY: `PTRACE_TRACEME` ignores `pid`, `addr`, and `data`.
    let ret = unsafe { raw::sys_ptrace(request.as_raw(), 0, ptr::null_mut(), ptr::null_mut()) };
    Errno::result(ret).for_request(request, Pid::this())?;

    Ok(())
}

/// Attach to a running task. The kernel will deliver it a `SIGSTOP`.
///
/// **Warning:** the tracee may not be considered stopped until it has been seen to stop
/// via `waitpid()`.
pub fn attach(pid: Pid) -> Result<Tracee> {
    debug!(pid = pid.as_raw(), "attaching");

    let res = unsafe { raw::ptrace(Request::Attach, pid, ptr::null_mut(), ptr::null_mut()) };
    res.map_err(|source| Error::Attach { pid, source })?;

    Ok(Tracee::new(pid))
}

/// Attach to a running task without stopping it, setting `options` atomically.
pub fn seize(pid: Pid, options: Options) -> Result<Tracee> {
    debug!(pid = pid.as_raw(), ?options, "seizing");

    let data = options.bits() as usize as *mut c_void;
    let res = unsafe { raw::ptrace(Request::Seize, pid, ptr::null_mut(), data) };
    res.map_err(|source| Error::Attach { pid, source })?;

    Ok(Tracee::new(pid))
}

/// A traced task, addressed by its thread ID.
///
/// **Warning:** the underlying task is not guaranteed to exist, or to be stopped. Most
/// requests fail with [`Error::TraceeDied`] if it is not in a ptrace-stop.
///
/// Only the thread that attached may issue requests, so this handle is neither `Send`
/// nor `Sync`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tracee {
    pid: Pid,

    #[doc(hidden)]
    _not_send: PhantomData<*const ()>,
}

impl Tracee {
    /// Address an already-traced task.
    pub fn new(pid: Pid) -> Self {
        let _not_send = PhantomData;

        Self { pid, _not_send }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    // SAFETY: callers must pass `addr` and `data` valid for `request`.
    unsafe fn request(&self, request: Request, addr: *mut c_void, data: *mut c_void) -> Result<c_long> {
        raw::ptrace(request, self.pid, addr, data).for_request(request, self.pid)
    }

    // For requests whose `addr` and `data` are plain integers.
    fn request_words(&self, request: Request, addr: u64, data: u64) -> Result<c_long> {
        let addr = word_arg(addr)? as *mut c_void;
        let data = word_arg(data)? as *mut c_void;

        // SAFETY: only used for requests which do not dereference `addr` or `data` as
        // pointers in the tracer.
        unsafe { self.request(request, addr, data) }
    }

    /// Read a word at `addr` in the tracee's text.
    pub fn peek_text(&self, addr: u64) -> Result<u64> {
        Ok(self.request_words(Request::PeekText, addr, 0)? as c_ulong as u64)
    }

    /// Read a word at `addr` in the tracee's data.
    pub fn peek_data(&self, addr: u64) -> Result<u64> {
        Ok(self.request_words(Request::PeekData, addr, 0)? as c_ulong as u64)
    }

    /// Read a word at offset `off` in the tracee's `USER` area.
    pub fn peek_user(&self, off: u64) -> Result<u64> {
        // `off` does not require validation, because it is not used as a pointer offset
        // by the kernel.
        //
        // See: https://github.com/torvalds/linux/blob/v4.9/arch/x86/kernel/ptrace.c#L774-L791
        Ok(self.request_words(Request::PeekUser, off, 0)? as c_ulong as u64)
    }

    pub fn poke_text(&mut self, addr: u64, word: u64) -> Result<()> {
        self.request_words(Request::PokeText, addr, word)?;
        Ok(())
    }

    pub fn poke_data(&mut self, addr: u64, word: u64) -> Result<()> {
        self.request_words(Request::PokeData, addr, word)?;
        Ok(())
    }

    pub fn poke_user(&mut self, off: u64, word: u64) -> Result<()> {
        self.request_words(Request::PokeUser, off, word)?;
        Ok(())
    }

    /// Resume the stopped tracee, delivering `signal`, if any.
    pub fn restart(&mut self, restart: Restart, signal: impl Into<Option<Signal>>) -> Result<()> {
        let data = signal_data(signal.into());
        self.request_words(restart.into(), 0, data)?;
        Ok(())
    }

    pub fn cont(&mut self, signal: impl Into<Option<Signal>>) -> Result<()> {
        self.restart(Restart::Continue, signal)
    }

    pub fn step(&mut self, signal: impl Into<Option<Signal>>) -> Result<()> {
        self.restart(Restart::Step, signal)
    }

    pub fn syscall(&mut self, signal: impl Into<Option<Signal>>) -> Result<()> {
        self.restart(Restart::Syscall, signal)
    }

    /// Request `PTRACE_KILL`. Deprecated by the kernel in favour of sending `SIGKILL`,
    /// and only effective if the tracee is stopped.
    pub fn kill(&mut self) -> Result<()> {
        self.request_words(Request::Kill, 0, 0)?;
        Ok(())
    }

    /// Detach from the tracee, restarting it with `signal`, if any.
    ///
    /// The handle is consumed:
    ///
    /// ```compile_fail
    /// # use ptrace_abi::{Pid, Tracee};
    /// let tracee = Tracee::new(Pid::from_raw(1));
    /// let _ = tracee.detach(None);
    /// let _ = tracee.pid();
    /// ```
    pub fn detach(self, signal: impl Into<Option<Signal>>) -> Result<()> {
        let signal = signal.into();
        debug!(pid = self.pid.as_raw(), ?signal, "detaching");

        self.request_words(Request::Detach, 0, signal_data(signal))?;
        Ok(())
    }

    #[cfg(target_arch = "x86_64")]
    pub fn registers(&self) -> Result<Registers> {
        let mut regs = mem::MaybeUninit::<Registers>::uninit();

        // SAFETY: the kernel writes a full `user_regs_struct` to `data` on success.
        unsafe {
            self.request(Request::GetRegs, ptr::null_mut(), regs.as_mut_ptr() as *mut c_void)?;
            Ok(regs.assume_init())
        }
    }

    #[cfg(target_arch = "aarch64")]
    pub fn registers(&self) -> Result<Registers> {
        // SAFETY: `user_pt_regs` is plain integers.
        unsafe { self.regset_record(aarch64::NT_PRSTATUS) }
    }

    #[cfg(target_arch = "x86_64")]
    pub fn set_registers(&mut self, mut regs: Registers) -> Result<()> {
        // SAFETY: the kernel reads a `user_regs_struct` from `data`.
        unsafe {
            self.request(Request::SetRegs, ptr::null_mut(), &mut regs as *mut _ as *mut c_void)?;
        }

        Ok(())
    }

    #[cfg(target_arch = "aarch64")]
    pub fn set_registers(&mut self, regs: Registers) -> Result<()> {
        self.set_regset_record(aarch64::NT_PRSTATUS, regs)
    }

    #[cfg(target_arch = "x86_64")]
    pub fn fp_registers(&self) -> Result<FpRegisters> {
        let mut regs = mem::MaybeUninit::<FpRegisters>::uninit();

        // SAFETY: the kernel writes a full `user_fpregs_struct` to `data` on success.
        unsafe {
            self.request(Request::GetFpRegs, ptr::null_mut(), regs.as_mut_ptr() as *mut c_void)?;
            Ok(regs.assume_init())
        }
    }

    #[cfg(target_arch = "aarch64")]
    pub fn fp_registers(&self) -> Result<FpRegisters> {
        // SAFETY: `user_fpsimd_state` is plain integers.
        unsafe { self.regset_record(aarch64::NT_PRFPREG) }
    }

    #[cfg(target_arch = "x86_64")]
    pub fn set_fp_registers(&mut self, mut regs: FpRegisters) -> Result<()> {
        // SAFETY: the kernel reads a `user_fpregs_struct` from `data`.
        unsafe {
            self.request(Request::SetFpRegs, ptr::null_mut(), &mut regs as *mut _ as *mut c_void)?;
        }

        Ok(())
    }

    #[cfg(target_arch = "aarch64")]
    pub fn set_fp_registers(&mut self, regs: FpRegisters) -> Result<()> {
        self.set_regset_record(aarch64::NT_PRFPREG, regs)
    }

    #[cfg(target_arch = "x86")]
    pub fn fpx_registers(&self) -> Result<FpxRegisters> {
        let mut regs = mem::MaybeUninit::<FpxRegisters>::uninit();

        // SAFETY: the kernel writes a full `user_fpxregs_struct` to `data` on success.
        unsafe {
            self.request(Request::GetFpxRegs, ptr::null_mut(), regs.as_mut_ptr() as *mut c_void)?;
            Ok(regs.assume_init())
        }
    }

    #[cfg(target_arch = "x86")]
    pub fn set_fpx_registers(&mut self, mut regs: FpxRegisters) -> Result<()> {
        // SAFETY: the kernel reads a `user_fpxregs_struct` from `data`.
        unsafe {
            self.request(Request::SetFpxRegs, ptr::null_mut(), &mut regs as *mut _ as *mut c_void)?;
        }

        Ok(())
    }

    /// Set tracing options on the tracee, replacing any set before.
    pub fn set_options(&mut self, options: Options) -> Result<()> {
        debug!(pid = self.pid.as_raw(), ?options, "setting options");

        self.request_words(Request::SetOptions, 0, options.bits() as u64)?;
        Ok(())
    }

    /// Message for the last ptrace-event-stop, such as the new PID of a fork, or the
    /// pending wait status of an exit.
    pub fn event_msg(&self) -> Result<u64> {
        let mut msg: c_ulong = 0;

        // SAFETY: the kernel writes an `unsigned long` to `data`.
        unsafe {
            self.request(Request::GetEventMsg, ptr::null_mut(), &mut msg as *mut _ as *mut c_void)?;
        }

        Ok(msg as u64)
    }

    pub fn siginfo(&self) -> Result<Siginfo> {
        let mut info = mem::MaybeUninit::<Siginfo>::zeroed();

        // SAFETY: the kernel writes a `siginfo_t` to `data`; it is plain data, so the
        // zeroed value is also valid.
        unsafe {
            self.request(Request::GetSigInfo, ptr::null_mut(), info.as_mut_ptr() as *mut c_void)?;
            Ok(info.assume_init())
        }
    }

    pub fn set_siginfo(&mut self, info: &Siginfo) -> Result<()> {
        // SAFETY: the kernel only reads a `siginfo_t` from `data`.
        unsafe {
            self.request(Request::SetSigInfo, ptr::null_mut(), info as *const _ as *mut c_void)?;
        }

        Ok(())
    }

    /// Read the register set selected by the ELF note type `note` into `buf`.
    ///
    /// Returns the number of bytes written by the kernel.
    pub fn regset(&self, note: c_int, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::InvalidArgument("empty register set buffer"));
        }

        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut c_void,
            iov_len: buf.len(),
        };

        // SAFETY: `iov` describes `buf`, and the kernel writes at most `iov_len` bytes.
        unsafe {
            self.request(Request::GetRegSet, note as usize as *mut c_void, &mut iov as *mut _ as *mut c_void)?;
        }

        Ok(iov.iov_len)
    }

    /// Write the register set selected by the ELF note type `note` from `buf`.
    pub fn set_regset(&mut self, note: c_int, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Err(Error::InvalidArgument("empty register set buffer"));
        }

        let mut iov = libc::iovec {
            iov_base: buf.as_ptr() as *mut c_void,
            iov_len: buf.len(),
        };

        // SAFETY: `iov` describes `buf`, which the kernel only reads.
        unsafe {
            self.request(Request::SetRegSet, note as usize as *mut c_void, &mut iov as *mut _ as *mut c_void)?;
        }

        Ok(())
    }

    // SAFETY: `T` must be valid for any bit pattern the kernel may write.
    #[cfg(target_arch = "aarch64")]
    unsafe fn regset_record<T: Copy + Default>(&self, note: c_int) -> Result<T> {
        let mut record = T::default();

        let mut iov = libc::iovec {
            iov_base: &mut record as *mut T as *mut c_void,
            iov_len: size_of::<T>(),
        };

        self.request(Request::GetRegSet, note as usize as *mut c_void, &mut iov as *mut _ as *mut c_void)?;

        Ok(record)
    }

    #[cfg(target_arch = "aarch64")]
    fn set_regset_record<T: Copy>(&mut self, note: c_int, mut record: T) -> Result<()> {
        let mut iov = libc::iovec {
            iov_base: &mut record as *mut T as *mut c_void,
            iov_len: size_of::<T>(),
        };

        // SAFETY: `iov` describes `record`, which the kernel only reads.
        unsafe {
            self.request(Request::SetRegSet, note as usize as *mut c_void, &mut iov as *mut _ as *mut c_void)?;
        }

        Ok(())
    }

    /// Stop a seized tracee (`PTRACE_INTERRUPT`).
    pub fn interrupt(&mut self) -> Result<()> {
        self.request_words(Request::Interrupt, 0, 0)?;
        Ok(())
    }

    /// Restart a seized tracee from a group-stop, but keep it stopped (`PTRACE_LISTEN`).
    pub fn listen(&mut self) -> Result<()> {
        self.request_words(Request::Listen, 0, 0)?;
        Ok(())
    }

    /// Copy queued, undelivered signals into `buf`, starting at the `off`-th signal.
    ///
    /// If `shared`, read the process-wide queue, otherwise the thread's queue. Returns
    /// the number of records copied, which is `0` past the end of the queue.
    pub fn peek_siginfo(&self, off: u64, shared: bool, buf: &mut [Siginfo]) -> Result<usize> {
        let nr = i32::try_from(buf.len())
            .map_err(|_| Error::InvalidArgument("too many siginfo records requested"))?;

        let mut args = PeekSigInfoArgs::new(off, shared, nr);

        // SAFETY: `args` is the kernel's `ptrace_peeksiginfo_args`, and `buf` has room for
        // `args.nr` records.
        let copied = unsafe {
            self.request(
                Request::PeekSigInfo,
                &mut args as *mut _ as *mut c_void,
                buf.as_mut_ptr() as *mut c_void,
            )?
        };

        Ok(copied as usize)
    }

    /// The tracee's blocked signal mask, as the kernel's 64-bit signal set.
    ///
    /// Bit `n - 1` is set if signal `n` is blocked.
    pub fn sigmask_raw(&self) -> Result<u64> {
        let mut mask: u64 = 0;

        // SAFETY: `data` points to `addr` bytes.
        unsafe {
            self.request(
                Request::GetSigMask,
                KERNEL_SIGSET_SIZE as *mut c_void,
                &mut mask as *mut _ as *mut c_void,
            )?;
        }

        Ok(mask)
    }

    /// Set the tracee's blocked signal mask from the kernel's 64-bit signal set.
    ///
    /// `SIGKILL` and `SIGSTOP` cannot be blocked, and are removed from `mask`.
    pub fn set_sigmask_raw(&mut self, mask: u64) -> Result<()> {
        let unblockable = sig_bit(Signal::SIGKILL) | sig_bit(Signal::SIGSTOP);

        if mask & unblockable != 0 {
            debug!(pid = self.pid.as_raw(), mask, "removing unblockable signals from mask");
        }

        let mut mask = mask & !unblockable;

        // SAFETY: `data` points to `addr` bytes, which the kernel only reads.
        unsafe {
            self.request(
                Request::SetSigMask,
                KERNEL_SIGSET_SIZE as *mut c_void,
                &mut mask as *mut _ as *mut c_void,
            )?;
        }

        Ok(())
    }

    /// The tracee's blocked signal mask.
    ///
    /// Only standard signals are represented; see [`Tracee::sigmask_raw()`] for
    /// real-time signals.
    pub fn sigmask(&self) -> Result<SigSet> {
        let mask = self.sigmask_raw()?;

        let mut set = SigSet::empty();
        for signal in Signal::iterator() {
            if mask & sig_bit(signal) != 0 {
                set.add(signal);
            }
        }

        Ok(set)
    }

    pub fn set_sigmask(&mut self, set: &SigSet) -> Result<()> {
        let mask = Signal::iterator()
            .filter(|signal| set.contains(*signal))
            .fold(0, |mask, signal| mask | sig_bit(signal));

        self.set_sigmask_raw(mask)
    }

    /// Instructions of the `index`-th seccomp filter installed on the tracee, where `0`
    /// is the most recently installed.
    ///
    /// Requires `CAP_SYS_ADMIN`.
    pub fn seccomp_filter(&self, index: u64) -> Result<Vec<SockFilter>> {
        let addr = index as usize as *mut c_void;

        // SAFETY: with a null `data`, the kernel only reports the instruction count.
        let count = unsafe { self.request(Request::SeccompGetFilter, addr, ptr::null_mut())? };

        let empty = SockFilter { code: 0, jt: 0, jf: 0, k: 0 };
        let mut filter = vec![empty; count as usize];

        // SAFETY: `filter` has room for `count` instructions.
        let count = unsafe {
            self.request(Request::SeccompGetFilter, addr, filter.as_mut_ptr() as *mut c_void)?
        };

        filter.truncate(count as usize);

        Ok(filter)
    }

    /// Flags of the seccomp filter at `filter_off`.
    ///
    /// Requires `CAP_SYS_ADMIN`.
    pub fn seccomp_metadata(&self, filter_off: u64) -> Result<SeccompMetadata> {
        let mut metadata = SeccompMetadata { filter_off, flags: 0 };

        // SAFETY: `data` points to `addr` bytes of `ptrace_seccomp_metadata`.
        unsafe {
            self.request(
                Request::SeccompGetMetadata,
                size_of::<SeccompMetadata>() as *mut c_void,
                &mut metadata as *mut _ as *mut c_void,
            )?;
        }

        Ok(metadata)
    }

    /// Syscall state of the stopped tracee.
    ///
    /// Outside of syscall-stops and seccomp-stops, the result has
    /// [`SyscallStop::None`](crate::SyscallStop::None).
    pub fn syscall_info(&self) -> Result<SyscallInfo> {
        let mut raw = ptrace_syscall_info::zeroed();

        // SAFETY: `data` points to `addr` bytes of `ptrace_syscall_info`.
        let len = unsafe {
            self.request(
                Request::GetSyscallInfo,
                SYSCALL_INFO_SIZE as *mut c_void,
                &mut raw as *mut _ as *mut c_void,
            )?
        };

        SyscallInfo::from_raw(&raw, len as usize)
    }

    /// Restartable sequence registered by the tracee, if any.
    pub fn rseq_configuration(&self) -> Result<RseqConfiguration> {
        let mut conf = RseqConfiguration::default();

        // SAFETY: `data` points to `addr` bytes of `ptrace_rseq_configuration`.
        unsafe {
            self.request(
                Request::GetRseqConfiguration,
                size_of::<RseqConfiguration>() as *mut c_void,
                &mut conf as *mut _ as *mut c_void,
            )?;
        }

        Ok(conf)
    }
}

// Words wider than a pointer cannot be passed to the kernel.
fn word_arg(word: u64) -> Result<usize> {
    usize::try_from(word).map_err(|_| Error::InvalidArgument("word does not fit in a pointer"))
}

fn signal_data(signal: Option<Signal>) -> u64 {
    signal.map(|s| s as i32 as u64).unwrap_or(0)
}

fn sig_bit(signal: Signal) -> u64 {
    1 << (signal as i32 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_data() {
        assert_eq!(signal_data(None), 0);
        assert_eq!(signal_data(Some(Signal::SIGTRAP)), 5);
        assert_eq!(signal_data(Some(Signal::SIGKILL)), 9);
    }

    #[test]
    fn test_sig_bit() {
        assert_eq!(sig_bit(Signal::SIGHUP), 0x1);
        assert_eq!(sig_bit(Signal::SIGKILL), 0x100);
        assert_eq!(sig_bit(Signal::SIGSTOP), 1 << 18);
    }

    #[test]
    fn test_word_arg() {
        assert_eq!(word_arg(0).unwrap(), 0);
        assert_eq!(word_arg(0x7fff_ffff).unwrap(), 0x7fff_ffff);

        if size_of::<usize>() < size_of::<u64>() {
            assert!(matches!(word_arg(1 << 32), Err(Error::InvalidArgument(_))));
        } else {
            assert_eq!(word_arg(u64::MAX).unwrap() as u64, u64::MAX);
        }
    }

    #[test]
    fn test_peeked_word_is_not_sign_extended() {
        // On 32-bit targets, `c_long` is 32 bits wide.
        let ret: c_long = -1;
        assert_eq!(ret as c_ulong as u64, c_ulong::MAX as u64);
    }

    #[test]
    fn test_regset_rejects_empty_buffer() {
        let tracee = Tracee::new(Pid::this());
        let err = tracee.regset(1, &mut []).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
