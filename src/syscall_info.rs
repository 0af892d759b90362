//! Checked view of `PTRACE_GET_SYSCALL_INFO` output.
//!
//! The kernel record is a header followed by a union whose active member is chosen by
//! the leading `op` byte. Here the union is a [`SyscallStop`] enum, so the payload can
//! only be read as the variant `op` names.
//!
//! The kernel only writes as much of the record as the active member needs, and the
//! request returns that length:
//!
//! ```text
//!    0        1       4       8                   16              24
//!    +--------+-------+-------+-------------------+---------------+------------
//!    |   op   |  pad  | arch  |instruction_pointer| stack_pointer | payload...
//!    +--------+-------+-------+-------------------+---------------+------------
//!
//!    none:    24 bytes, no payload
//!    entry:   nr @ 24, args[6] @ 32                    (80 bytes)
//!    exit:    rval @ 24, is_error @ 32                 (33 bytes)
//!    seccomp: nr @ 24, args[6] @ 32, ret_data @ 80     (84 bytes)
//! ```
//!
//! All fields are native-endian.

use std::convert::TryFrom;
use std::mem::size_of;

use crate::abi::{
    ptrace_syscall_info,
    ptrace_syscall_info_entry,
    ptrace_syscall_info_exit,
    ptrace_syscall_info_seccomp,
};
use crate::consts::*;
use crate::error::{Error, Result};

/// Size of the full kernel record.
pub const SYSCALL_INFO_SIZE: usize = size_of::<ptrace_syscall_info>();

const HEADER_LEN: usize = 24;
const NR_OFFSET: usize = 24;
const ARGS_OFFSET: usize = 32;
const RVAL_OFFSET: usize = 24;
const IS_ERROR_OFFSET: usize = 32;
const RET_DATA_OFFSET: usize = 80;

/// Discriminant of a `ptrace_syscall_info` record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum SyscallInfoOp {
    None = PTRACE_SYSCALL_INFO_NONE,
    Entry = PTRACE_SYSCALL_INFO_ENTRY,
    Exit = PTRACE_SYSCALL_INFO_EXIT,
    Seccomp = PTRACE_SYSCALL_INFO_SECCOMP,
}

impl SyscallInfoOp {
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    /// Number of leading record bytes the kernel writes for this op.
    pub fn record_len(self) -> usize {
        match self {
            SyscallInfoOp::None => HEADER_LEN,
            SyscallInfoOp::Entry => ARGS_OFFSET + 6 * 8,
            SyscallInfoOp::Exit => IS_ERROR_OFFSET + 1,
            SyscallInfoOp::Seccomp => RET_DATA_OFFSET + 4,
        }
    }
}

impl TryFrom<u8> for SyscallInfoOp {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        let op = match raw {
            PTRACE_SYSCALL_INFO_NONE => SyscallInfoOp::None,
            PTRACE_SYSCALL_INFO_ENTRY => SyscallInfoOp::Entry,
            PTRACE_SYSCALL_INFO_EXIT => SyscallInfoOp::Exit,
            PTRACE_SYSCALL_INFO_SECCOMP => SyscallInfoOp::Seccomp,
            _ => return Err(Error::UnknownSyscallInfoOp(raw)),
        };

        Ok(op)
    }
}

/// The kind of stop the tracee is in, with its syscall payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyscallStop {
    /// Not a syscall-stop.
    None,

    /// syscall-enter-stop.
    Entry { nr: u64, args: [u64; 6] },

    /// syscall-exit-stop. When `is_error`, `rval` is a negated errno.
    Exit { rval: i64, is_error: bool },

    /// `PTRACE_EVENT_SECCOMP` stop. `ret_data` is the `SECCOMP_RET_DATA` of the filter.
    Seccomp { nr: u64, args: [u64; 6], ret_data: u32 },
}

impl SyscallStop {
    pub fn op(&self) -> SyscallInfoOp {
        match self {
            SyscallStop::None => SyscallInfoOp::None,
            SyscallStop::Entry { .. } => SyscallInfoOp::Entry,
            SyscallStop::Exit { .. } => SyscallInfoOp::Exit,
            SyscallStop::Seccomp { .. } => SyscallInfoOp::Seccomp,
        }
    }
}

/// Syscall state of a stopped tracee.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SyscallInfo {
    /// `AUDIT_ARCH_*` value of the syscall ABI in use.
    pub arch: u32,
    pub instruction_pointer: u64,
    pub stack_pointer: u64,
    pub stop: SyscallStop,
}

impl SyscallInfo {
    pub fn op(&self) -> SyscallInfoOp {
        self.stop.op()
    }

    /// Syscall number, for entry and seccomp stops.
    pub fn nr(&self) -> Option<u64> {
        match self.stop {
            SyscallStop::Entry { nr, .. } | SyscallStop::Seccomp { nr, .. } => Some(nr),
            _ => None,
        }
    }

    /// Syscall arguments, for entry and seccomp stops.
    pub fn args(&self) -> Option<[u64; 6]> {
        match self.stop {
            SyscallStop::Entry { args, .. } | SyscallStop::Seccomp { args, .. } => Some(args),
            _ => None,
        }
    }

    /// Decode the first `len` bytes of a kernel-filled record.
    ///
    /// `len` is the value returned by `PTRACE_GET_SYSCALL_INFO`. It may exceed the size
    /// of `raw` if the kernel knows a longer record than we do.
    pub fn from_raw(raw: &ptrace_syscall_info, len: usize) -> Result<Self> {
        check_len(len, HEADER_LEN)?;

        let op = SyscallInfoOp::try_from(raw.op)?;
        check_len(len, op.record_len())?;

        // SAFETY: `op` names the member the kernel wrote, and every member is plain
        // integers, so any bit pattern is valid.
        let stop = unsafe {
            match op {
                SyscallInfoOp::None => SyscallStop::None,
                SyscallInfoOp::Entry => {
                    let ptrace_syscall_info_entry { nr, args } = raw.data.entry;
                    SyscallStop::Entry { nr, args }
                },
                SyscallInfoOp::Exit => {
                    let ptrace_syscall_info_exit { rval, is_error } = raw.data.exit;
                    SyscallStop::Exit { rval, is_error: is_error != 0 }
                },
                SyscallInfoOp::Seccomp => {
                    let ptrace_syscall_info_seccomp { nr, args, ret_data } = raw.data.seccomp;
                    SyscallStop::Seccomp { nr, args, ret_data }
                },
            }
        };

        Ok(Self {
            arch: raw.arch,
            instruction_pointer: raw.instruction_pointer,
            stack_pointer: raw.stack_pointer,
            stop,
        })
    }

    /// Decode a record from its byte encoding.
    ///
    /// `bytes` may be truncated to the length the kernel reports for the record's op.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        check_len(bytes.len(), HEADER_LEN)?;

        let op = SyscallInfoOp::try_from(bytes[0])?;
        check_len(bytes.len(), op.record_len())?;

        let stop = match op {
            SyscallInfoOp::None => SyscallStop::None,
            SyscallInfoOp::Entry => SyscallStop::Entry {
                nr: read_u64(bytes, NR_OFFSET),
                args: read_args(bytes),
            },
            SyscallInfoOp::Exit => SyscallStop::Exit {
                rval: read_u64(bytes, RVAL_OFFSET) as i64,
                is_error: bytes[IS_ERROR_OFFSET] != 0,
            },
            SyscallInfoOp::Seccomp => SyscallStop::Seccomp {
                nr: read_u64(bytes, NR_OFFSET),
                args: read_args(bytes),
                ret_data: read_u32(bytes, RET_DATA_OFFSET),
            },
        };

        Ok(Self {
            arch: read_u32(bytes, 4),
            instruction_pointer: read_u64(bytes, 8),
            stack_pointer: read_u64(bytes, 16),
            stop,
        })
    }

    /// Encode as the kernel's record: discriminant, header, then payload, with zeroed
    /// padding.
    pub fn to_bytes(&self) -> [u8; SYSCALL_INFO_SIZE] {
        let mut bytes = [0; SYSCALL_INFO_SIZE];

        bytes[0] = self.op().as_raw();
        write(&mut bytes, 4, &self.arch.to_ne_bytes());
        write(&mut bytes, 8, &self.instruction_pointer.to_ne_bytes());
        write(&mut bytes, 16, &self.stack_pointer.to_ne_bytes());

        match self.stop {
            SyscallStop::None => {},
            SyscallStop::Entry { nr, args } => {
                write(&mut bytes, NR_OFFSET, &nr.to_ne_bytes());
                write_args(&mut bytes, &args);
            },
            SyscallStop::Exit { rval, is_error } => {
                write(&mut bytes, RVAL_OFFSET, &rval.to_ne_bytes());
                bytes[IS_ERROR_OFFSET] = is_error as u8;
            },
            SyscallStop::Seccomp { nr, args, ret_data } => {
                write(&mut bytes, NR_OFFSET, &nr.to_ne_bytes());
                write_args(&mut bytes, &args);
                write(&mut bytes, RET_DATA_OFFSET, &ret_data.to_ne_bytes());
            },
        }

        bytes
    }
}

impl TryFrom<&ptrace_syscall_info> for SyscallInfo {
    type Error = Error;

    fn try_from(raw: &ptrace_syscall_info) -> Result<Self> {
        SyscallInfo::from_raw(raw, SYSCALL_INFO_SIZE)
    }
}

impl From<&SyscallInfo> for ptrace_syscall_info {
    fn from(info: &SyscallInfo) -> Self {
        let mut raw = ptrace_syscall_info::zeroed();

        raw.op = info.op().as_raw();
        raw.arch = info.arch;
        raw.instruction_pointer = info.instruction_pointer;
        raw.stack_pointer = info.stack_pointer;

        match info.stop {
            SyscallStop::None => {},
            SyscallStop::Entry { nr, args } => {
                raw.data.entry = ptrace_syscall_info_entry { nr, args };
            },
            SyscallStop::Exit { rval, is_error } => {
                raw.data.exit = ptrace_syscall_info_exit { rval, is_error: is_error as u8 };
            },
            SyscallStop::Seccomp { nr, args, ret_data } => {
                raw.data.seccomp = ptrace_syscall_info_seccomp { nr, args, ret_data };
            },
        }

        raw
    }
}

fn check_len(len: usize, required: usize) -> Result<()> {
    if len < required {
        return Err(Error::Truncated { len, required });
    }

    Ok(())
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut word = [0; 8];
    word.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_ne_bytes(word)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_ne_bytes(word)
}

fn read_args(bytes: &[u8]) -> [u64; 6] {
    let mut args = [0; 6];

    for (i, arg) in args.iter_mut().enumerate() {
        *arg = read_u64(bytes, ARGS_OFFSET + 8 * i);
    }

    args
}

fn write(bytes: &mut [u8], offset: usize, data: &[u8]) {
    bytes[offset..offset + data.len()].copy_from_slice(data);
}

fn write_args(bytes: &mut [u8], args: &[u64; 6]) {
    for (i, arg) in args.iter().enumerate() {
        write(bytes, ARGS_OFFSET + 8 * i, &arg.to_ne_bytes());
    }
}
