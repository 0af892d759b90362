//! Typed views over the request, event, and option constants.

use std::convert::TryFrom;
use std::fmt;

use libc::c_int;

use crate::consts::{self, *};
use crate::error::Error;

/// A ptrace request, selecting the operation performed by the low-level call.
///
/// Legacy `PT_*` names map to the same variants as their `PTRACE_*` counterparts.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(i32)]
pub enum Request {
    TraceMe = PTRACE_TRACEME,
    PeekText = PTRACE_PEEKTEXT,
    PeekData = PTRACE_PEEKDATA,
    PeekUser = PTRACE_PEEKUSER,
    PokeText = PTRACE_POKETEXT,
    PokeData = PTRACE_POKEDATA,
    PokeUser = PTRACE_POKEUSER,
    Cont = PTRACE_CONT,
    Kill = PTRACE_KILL,
    SingleStep = PTRACE_SINGLESTEP,
    GetRegs = PTRACE_GETREGS,
    SetRegs = PTRACE_SETREGS,
    GetFpRegs = PTRACE_GETFPREGS,
    SetFpRegs = PTRACE_SETFPREGS,
    Attach = PTRACE_ATTACH,
    Detach = PTRACE_DETACH,
    GetFpxRegs = PTRACE_GETFPXREGS,
    SetFpxRegs = PTRACE_SETFPXREGS,
    Syscall = PTRACE_SYSCALL,
    SetOptions = PTRACE_SETOPTIONS,
    GetEventMsg = PTRACE_GETEVENTMSG,
    GetSigInfo = PTRACE_GETSIGINFO,
    SetSigInfo = PTRACE_SETSIGINFO,
    GetRegSet = PTRACE_GETREGSET,
    SetRegSet = PTRACE_SETREGSET,
    Seize = PTRACE_SEIZE,
    Interrupt = PTRACE_INTERRUPT,
    Listen = PTRACE_LISTEN,
    PeekSigInfo = PTRACE_PEEKSIGINFO,
    GetSigMask = PTRACE_GETSIGMASK,
    SetSigMask = PTRACE_SETSIGMASK,
    SeccompGetFilter = PTRACE_SECCOMP_GET_FILTER,
    SeccompGetMetadata = PTRACE_SECCOMP_GET_METADATA,
    GetSyscallInfo = PTRACE_GET_SYSCALL_INFO,
    GetRseqConfiguration = PTRACE_GET_RSEQ_CONFIGURATION,
}

impl Request {
    const ALL: [Request; 35] = [
        Request::TraceMe,
        Request::PeekText,
        Request::PeekData,
        Request::PeekUser,
        Request::PokeText,
        Request::PokeData,
        Request::PokeUser,
        Request::Cont,
        Request::Kill,
        Request::SingleStep,
        Request::GetRegs,
        Request::SetRegs,
        Request::GetFpRegs,
        Request::SetFpRegs,
        Request::Attach,
        Request::Detach,
        Request::GetFpxRegs,
        Request::SetFpxRegs,
        Request::Syscall,
        Request::SetOptions,
        Request::GetEventMsg,
        Request::GetSigInfo,
        Request::SetSigInfo,
        Request::GetRegSet,
        Request::SetRegSet,
        Request::Seize,
        Request::Interrupt,
        Request::Listen,
        Request::PeekSigInfo,
        Request::GetSigMask,
        Request::SetSigMask,
        Request::SeccompGetFilter,
        Request::SeccompGetMetadata,
        Request::GetSyscallInfo,
        Request::GetRseqConfiguration,
    ];

    /// Every known request, in ascending numeric order.
    pub fn all() -> &'static [Request] {
        &Self::ALL
    }

    pub fn as_raw(self) -> c_int {
        self as c_int
    }

    /// The canonical `PTRACE_*` name of the request.
    pub fn name(self) -> &'static str {
        use Request::*;

        match self {
            TraceMe => "PTRACE_TRACEME",
            PeekText => "PTRACE_PEEKTEXT",
            PeekData => "PTRACE_PEEKDATA",
            PeekUser => "PTRACE_PEEKUSER",
            PokeText => "PTRACE_POKETEXT",
            PokeData => "PTRACE_POKEDATA",
            PokeUser => "PTRACE_POKEUSER",
            Cont => "PTRACE_CONT",
            Kill => "PTRACE_KILL",
            SingleStep => "PTRACE_SINGLESTEP",
            GetRegs => "PTRACE_GETREGS",
            SetRegs => "PTRACE_SETREGS",
            GetFpRegs => "PTRACE_GETFPREGS",
            SetFpRegs => "PTRACE_SETFPREGS",
            Attach => "PTRACE_ATTACH",
            Detach => "PTRACE_DETACH",
            GetFpxRegs => "PTRACE_GETFPXREGS",
            SetFpxRegs => "PTRACE_SETFPXREGS",
            Syscall => "PTRACE_SYSCALL",
            SetOptions => "PTRACE_SETOPTIONS",
            GetEventMsg => "PTRACE_GETEVENTMSG",
            GetSigInfo => "PTRACE_GETSIGINFO",
            SetSigInfo => "PTRACE_SETSIGINFO",
            GetRegSet => "PTRACE_GETREGSET",
            SetRegSet => "PTRACE_SETREGSET",
            Seize => "PTRACE_SEIZE",
            Interrupt => "PTRACE_INTERRUPT",
            Listen => "PTRACE_LISTEN",
            PeekSigInfo => "PTRACE_PEEKSIGINFO",
            GetSigMask => "PTRACE_GETSIGMASK",
            SetSigMask => "PTRACE_SETSIGMASK",
            SeccompGetFilter => "PTRACE_SECCOMP_GET_FILTER",
            SeccompGetMetadata => "PTRACE_SECCOMP_GET_METADATA",
            GetSyscallInfo => "PTRACE_GET_SYSCALL_INFO",
            GetRseqConfiguration => "PTRACE_GET_RSEQ_CONFIGURATION",
        }
    }

    /// Whether the call returns a word read from the tracee, so that `-1` is not
    /// necessarily a failure.
    pub fn is_peek(self) -> bool {
        matches!(self, Request::PeekText | Request::PeekData | Request::PeekUser)
    }
}

impl TryFrom<c_int> for Request {
    type Error = Error;

    fn try_from(raw: c_int) -> Result<Self, Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_raw() == raw)
            .ok_or(Error::UnknownRequest(raw))
    }
}

impl From<Request> for c_int {
    fn from(request: Request) -> c_int {
        request.as_raw()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reason for a _ptrace-event-stop_, as reported in a `waitpid()` status.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(i32)]
pub enum Event {
    Fork = PTRACE_EVENT_FORK,
    Vfork = PTRACE_EVENT_VFORK,
    Clone = PTRACE_EVENT_CLONE,
    Exec = PTRACE_EVENT_EXEC,
    VforkDone = PTRACE_EVENT_VFORK_DONE,
    Exit = PTRACE_EVENT_EXIT,
    Seccomp = PTRACE_EVENT_SECCOMP,
    Stop = PTRACE_EVENT_STOP,
}

impl Event {
    pub fn as_raw(self) -> c_int {
        self as c_int
    }

    /// Extract the event from a raw `waitpid()` status.
    ///
    /// A ptrace-event-stop is reported as a stop with `SIGTRAP` (or, for
    /// [`Event::Stop`], the stopping signal) and the event code in bits 16..24:
    ///
    /// ```text
    ///   status >> 8 == SIGTRAP | (PTRACE_EVENT_foo << 8)
    /// ```
    ///
    /// Returns `Ok(None)` if the status carries no event.
    pub fn from_wait_status(status: c_int) -> Result<Option<Self>, Error> {
        // Low byte `0x7f` marks a stopped child.
        if status & 0xff != 0x7f {
            return Ok(None);
        }

        let code = (status >> 16) & 0xff;

        if code == 0 {
            return Ok(None);
        }

        Event::try_from(code).map(Some)
    }
}

impl TryFrom<c_int> for Event {
    type Error = Error;

    fn try_from(raw: c_int) -> Result<Self, Error> {
        use Event::*;

        let event = match raw {
            PTRACE_EVENT_FORK => Fork,
            PTRACE_EVENT_VFORK => Vfork,
            PTRACE_EVENT_CLONE => Clone,
            PTRACE_EVENT_EXEC => Exec,
            PTRACE_EVENT_VFORK_DONE => VforkDone,
            PTRACE_EVENT_EXIT => Exit,
            PTRACE_EVENT_SECCOMP => Seccomp,
            PTRACE_EVENT_STOP => Stop,
            _ => return Err(Error::UnknownEvent(raw)),
        };

        Ok(event)
    }
}

bitflags::bitflags! {
    /// Tracing options, set via [`Tracee::set_options()`](crate::Tracee::set_options) or
    /// at [`seize()`](crate::seize) time.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct Options: c_int {
        /// Set bit 7 in the signal number of syscall-stops (`SIGTRAP | 0x80`).
        const PTRACE_O_TRACESYSGOOD = consts::PTRACE_O_TRACESYSGOOD;
        const PTRACE_O_TRACEFORK = consts::PTRACE_O_TRACEFORK;
        const PTRACE_O_TRACEVFORK = consts::PTRACE_O_TRACEVFORK;
        const PTRACE_O_TRACECLONE = consts::PTRACE_O_TRACECLONE;
        const PTRACE_O_TRACEEXEC = consts::PTRACE_O_TRACEEXEC;
        const PTRACE_O_TRACEVFORKDONE = consts::PTRACE_O_TRACEVFORKDONE;
        const PTRACE_O_TRACEEXIT = consts::PTRACE_O_TRACEEXIT;
        const PTRACE_O_TRACESECCOMP = consts::PTRACE_O_TRACESECCOMP;
        /// Send `SIGKILL` to the tracee if the tracer exits.
        const PTRACE_O_EXITKILL = consts::PTRACE_O_EXITKILL;
        /// Suspend the tracee's seccomp protections. Requires `CAP_SYS_ADMIN`.
        const PTRACE_O_SUSPEND_SECCOMP = consts::PTRACE_O_SUSPEND_SECCOMP;
    }
}

/// Restart requests, which resume stopped tracees.
///
/// The restart mode determines the possible subsequent stops of the restarted tracee.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Restart {
    Step,
    Continue,
    Syscall,
}

impl From<Restart> for Request {
    fn from(restart: Restart) -> Request {
        match restart {
            Restart::Step => Request::SingleStep,
            Restart::Continue => Request::Cont,
            Restart::Syscall => Request::Syscall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trips_raw() {
        for &request in Request::all() {
            assert_eq!(Request::try_from(request.as_raw()).unwrap(), request);
        }

        assert_eq!(Request::try_from(PT_READ_I).unwrap(), Request::PeekText);
        assert_eq!(Request::try_from(PT_STEP).unwrap(), Request::SingleStep);
    }

    #[test]
    fn test_request_rejects_gaps() {
        for raw in &[10, 11, 20, 23, 25, 0x4210, -1] {
            match Request::try_from(*raw) {
                Err(Error::UnknownRequest(r)) => assert_eq!(r, *raw),
                other => panic!("unexpected result for {raw}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_request_all_is_sorted() {
        let raw: Vec<c_int> = Request::all().iter().map(|r| r.as_raw()).collect();
        let mut sorted = raw.clone();
        sorted.sort_unstable();
        assert_eq!(raw, sorted);
    }

    #[test]
    fn test_request_display() {
        assert_eq!(Request::GetSigMask.to_string(), "PTRACE_GETSIGMASK");
        assert_eq!(Request::Attach.to_string(), "PTRACE_ATTACH");
    }

    #[test]
    fn test_peek_requests() {
        let peeks: Vec<_> = Request::all().iter().filter(|r| r.is_peek()).collect();
        assert_eq!(peeks, [&Request::PeekText, &Request::PeekData, &Request::PeekUser]);
    }

    #[test]
    fn test_event_from_wait_status() {
        // Stopped (0x7f) with SIGTRAP, event exec.
        let status = 0x7f | (libc::SIGTRAP << 8) | (PTRACE_EVENT_EXEC << 16);
        assert_eq!(Event::from_wait_status(status).unwrap(), Some(Event::Exec));

        // Plain SIGSTOP stop.
        let status = 0x7f | (libc::SIGSTOP << 8);
        assert_eq!(Event::from_wait_status(status).unwrap(), None);

        // Exited with code 1.
        let status = 1 << 8;
        assert_eq!(Event::from_wait_status(status).unwrap(), None);

        let status = 0x7f | (libc::SIGTRAP << 8) | (PTRACE_EVENT_STOP << 16);
        assert_eq!(Event::from_wait_status(status).unwrap(), Some(Event::Stop));
    }

    #[test]
    fn test_event_rejects_unknown() {
        assert!(matches!(Event::try_from(8), Err(Error::UnknownEvent(8))));
    }

    #[test]
    fn test_options_all_is_mask() {
        assert_eq!(Options::all().bits(), PTRACE_O_MASK);
        assert_eq!(Options::default(), Options::empty());
        assert_eq!(
            (Options::PTRACE_O_TRACEEXEC | Options::PTRACE_O_EXITKILL).bits(),
            0x00100010,
        );
    }

    #[test]
    fn test_restart_requests() {
        assert_eq!(Request::from(Restart::Step), Request::SingleStep);
        assert_eq!(Request::from(Restart::Continue), Request::Cont);
        assert_eq!(Request::from(Restart::Syscall), Request::Syscall);
    }
}
