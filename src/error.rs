use libc::c_int;
use nix::errno::Errno;

use crate::request::Request;
use crate::tracee::Pid;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Could not attach to tracee = {pid}")]
    Attach {
        pid: Pid,
        source: Errno,
    },

    #[error("Request {request} failed for tracee = {pid}")]
    Request {
        request: Request,
        pid: Pid,
        source: Errno,
    },

    #[error("Tracee died while handling {request}, pid = {pid}")]
    TraceeDied {
        request: Request,
        pid: Pid,
        source: Errno,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Unknown ptrace request = {0}")]
    UnknownRequest(c_int),

    #[error("Unknown ptrace event = {0}")]
    UnknownEvent(c_int),

    #[error("Unknown syscall info op = {0}")]
    UnknownSyscallInfoOp(u8),

    #[error("Syscall info record too short: {len} < {required} bytes")]
    Truncated {
        len: usize,
        required: usize,
    },

    #[error("OS error")]
    OS(#[from] Errno),
}

impl Error {
    /// True if the error means the tracee no longer exists, or is no longer stopped
    /// for us.
    pub fn tracee_died(&self) -> bool {
        matches!(self, Error::TraceeDied { .. })
    }

    /// The OS error underlying a failed call, if any.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Attach { source, .. } |
            Error::Request { source, .. } |
            Error::TraceeDied { source, .. } => Some(*source),
            Error::OS(errno) => Some(*errno),
            _ => None,
        }
    }
}

pub(crate) trait ResultExt<T> {
    /// Attach request context to a failed call, mapping `ESRCH` to `TraceeDied`.
    fn for_request(self, request: Request, pid: Pid) -> Result<T>;
}

impl<T> ResultExt<T> for nix::Result<T> {
    fn for_request(self, request: Request, pid: Pid) -> Result<T> {
        self.map_err(|source| {
            if source == Errno::ESRCH {
                Error::TraceeDied { request, pid, source }
            } else {
                Error::Request { request, pid, source }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esrch_is_tracee_died() {
        let pid = Pid::from_raw(1234);
        let res: nix::Result<()> = Err(Errno::ESRCH);
        let err = res.for_request(Request::GetRegs, pid).unwrap_err();

        assert!(err.tracee_died());
        assert_eq!(err.errno(), Some(Errno::ESRCH));
        assert_eq!(err.to_string(), "Tracee died while handling PTRACE_GETREGS, pid = 1234");
    }

    #[test]
    fn test_other_errno_is_request_error() {
        let pid = Pid::from_raw(1);
        let res: nix::Result<()> = Err(Errno::EIO);
        let err = res.for_request(Request::PeekData, pid).unwrap_err();

        assert!(!err.tracee_died());
        assert!(matches!(err, Error::Request { request: Request::PeekData, source: Errno::EIO, .. }));
    }
}
