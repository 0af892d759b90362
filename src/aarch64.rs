//! Register-set records for arm64, which has no `PTRACE_GETREGS`/`PTRACE_GETFPREGS`.
//!
//! Registers are instead read and written with `PTRACE_GETREGSET`/`PTRACE_SETREGSET`,
//! selected by an ELF note type.
#![allow(non_camel_case_types)]

use libc::c_int;

/// Defined in [`include/uapi/linux/elf.h`](https://github.com/torvalds/linux/blob/v6.1/include/uapi/linux/elf.h#L374).
pub const NT_PRSTATUS: c_int = 1;
pub const NT_PRFPREG: c_int = 2;

/// Defined in [`arch/arm64/include/uapi/asm/ptrace.h`](https://github.com/torvalds/linux/blob/v6.1/arch/arm64/include/uapi/asm/ptrace.h#L88).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct user_pt_regs {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64,
}

/// Defined in [`arch/arm64/include/uapi/asm/ptrace.h`](https://github.com/torvalds/linux/blob/v6.1/arch/arm64/include/uapi/asm/ptrace.h#L99).
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default)]
pub struct user_fpsimd_state {
    pub vregs: [u128; 32],
    pub fpsr: u32,
    pub fpcr: u32,
    pad: [u32; 2],
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn test_regset_sizes() {
        assert_eq!(size_of::<user_pt_regs>(), 34 * 8);
        assert_eq!(size_of::<user_fpsimd_state>(), 32 * 16 + 16);
    }
}
