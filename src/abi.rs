//! Fixed-layout records exchanged with the kernel.
//!
//! Layouts are defined in [`include/uapi/linux/ptrace.h`](https://github.com/torvalds/linux/blob/v6.1/include/uapi/linux/ptrace.h).
//! The records carry no invariants beyond field order, width, and padding.
#![allow(non_camel_case_types)]

use crate::consts::PTRACE_PEEKSIGINFO_SHARED;

/// Arguments to `PTRACE_PEEKSIGINFO`, passed via `addr`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PeekSigInfoArgs {
    /// Ordinal of the first queued signal to copy.
    pub off: u64,

    /// `0` or [`PTRACE_PEEKSIGINFO_SHARED`].
    pub flags: u32,

    /// Maximum number of `siginfo_t` records to copy.
    pub nr: i32,
}

impl PeekSigInfoArgs {
    pub fn new(off: u64, shared: bool, nr: i32) -> Self {
        let flags = if shared { PTRACE_PEEKSIGINFO_SHARED } else { 0 };

        Self { off, flags, nr }
    }

    pub fn shared(&self) -> bool {
        self.flags & PTRACE_PEEKSIGINFO_SHARED != 0
    }
}

/// In-out record for `PTRACE_SECCOMP_GET_METADATA`.
///
/// The caller sets `filter_off`; the kernel fills `flags`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SeccompMetadata {
    pub filter_off: u64,
    pub flags: u64,
}

/// Output of `PTRACE_GET_RSEQ_CONFIGURATION`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RseqConfiguration {
    pub rseq_abi_pointer: u64,
    pub rseq_abi_size: u32,
    pub signature: u32,
    pub flags: u32,
    pub pad: u32,
}

/// `entry` member of the `ptrace_syscall_info` union.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ptrace_syscall_info_entry {
    pub nr: u64,
    pub args: [u64; 6],
}

/// `exit` member of the `ptrace_syscall_info` union.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ptrace_syscall_info_exit {
    pub rval: i64,
    pub is_error: u8,
}

/// `seccomp` member of the `ptrace_syscall_info` union.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ptrace_syscall_info_seccomp {
    pub nr: u64,
    pub args: [u64; 6],
    pub ret_data: u32,
}

/// Anonymous union in `ptrace_syscall_info`. The active member is selected by
/// [`ptrace_syscall_info::op`].
#[repr(C)]
#[derive(Clone, Copy)]
pub union ptrace_syscall_info_data {
    pub entry: ptrace_syscall_info_entry,
    pub exit: ptrace_syscall_info_exit,
    pub seccomp: ptrace_syscall_info_seccomp,
}

/// Output of `PTRACE_GET_SYSCALL_INFO`, in the kernel's layout.
///
/// Prefer [`SyscallInfo`](crate::SyscallInfo), which checks `op` before reading the union.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ptrace_syscall_info {
    pub op: u8,
    pub pad: [u8; 3],
    pub arch: u32,
    pub instruction_pointer: u64,
    pub stack_pointer: u64,
    pub data: ptrace_syscall_info_data,
}

impl ptrace_syscall_info {
    pub fn zeroed() -> Self {
        Self {
            op: 0,
            pad: [0; 3],
            arch: 0,
            instruction_pointer: 0,
            stack_pointer: 0,
            // Largest member, so the fields of every member are initialized.
            data: ptrace_syscall_info_data {
                seccomp: ptrace_syscall_info_seccomp::default(),
            },
        }
    }
}

impl std::fmt::Debug for ptrace_syscall_info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ptrace_syscall_info")
            .field("op", &self.op)
            .field("arch", &self.arch)
            .field("instruction_pointer", &self.instruction_pointer)
            .field("stack_pointer", &self.stack_pointer)
            .finish_non_exhaustive()
    }
}
