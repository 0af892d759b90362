//! The low-level ptrace(2) entry point.
//!
//! Every typed wrapper in this crate forwards to [`ptrace()`].

use libc::{c_int, c_long, c_void, pid_t};
use nix::errno::Errno;
use nix::unistd::Pid;
use tracing::trace;

use crate::request::Request;

/// Direct mirror of the C entry point `long ptrace(int request, ...)`.
///
/// Always passes the conventional `pid`, `addr`, and `data` arguments. Returns `-1` and
/// sets `errno` on failure.
///
/// # Safety
///
/// `addr` and `data` are interpreted according to `request`, and may be dereferenced by
/// the kernel or the C library. The caller must pass pointers valid for that request.
pub unsafe fn sys_ptrace(request: c_int, pid: pid_t, addr: *mut c_void, data: *mut c_void) -> c_long {
    // `libc` types the request as `c_uint` on glibc and `c_int` elsewhere.
    libc::ptrace(request as _, pid, addr, data)
}

/// Issue `request` and check the result.
///
/// For the `PEEK*` requests the return value is the word read, which may be `-1`, so
/// `errno` is cleared first and inspected afterwards.
///
/// # Safety
///
/// As for [`sys_ptrace()`].
pub unsafe fn ptrace(request: Request, pid: Pid, addr: *mut c_void, data: *mut c_void) -> nix::Result<c_long> {
    trace!(%request, pid = pid.as_raw(), ?addr, ?data, "ptrace");

    if request.is_peek() {
        Errno::clear();
        let ret = sys_ptrace(request.as_raw(), pid.as_raw(), addr, data);

        if ret == -1 {
            let errno = Errno::last();

            if errno != Errno::UnknownErrno {
                return Err(errno);
            }
        }

        Ok(ret)
    } else {
        Errno::result(sys_ptrace(request.as_raw(), pid.as_raw(), addr, data))
    }
}
