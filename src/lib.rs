//! Constants, records, and typed requests for the Linux ptrace(2) ABI.
//!
//! [`consts`] and [`abi`] mirror the kernel's vocabulary and record layouts exactly.
//! [`Tracee`] wraps each request in a typed method that forwards to the single low-level
//! call in [`raw`].

pub mod abi;
pub mod consts;
pub mod error;
pub mod raw;
pub mod request;
pub mod syscall_info;
pub mod tracee;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

pub use abi::{PeekSigInfoArgs, RseqConfiguration, SeccompMetadata};
pub use error::{Error, Result};
pub use request::{Event, Options, Request, Restart};
pub use syscall_info::{SyscallInfo, SyscallInfoOp, SyscallStop};
pub use tracee::{attach, seize, traceme, Pid, SigSet, Siginfo, Signal, Tracee};

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub use tracee::{FpRegisters, Registers};

#[cfg(target_arch = "x86")]
pub use tracee::FpxRegisters;
