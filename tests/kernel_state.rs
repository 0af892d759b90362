use anyhow::Result;
use nix::errno::Errno;
use ntest::timeout;
use ptrace_abi::Error;

mod support;
use support::*;

/// `NT_PRSTATUS`, the general-purpose register set.
const NT_PRSTATUS: libc::c_int = 1;

#[test]
#[timeout(2000)]
fn test_regset_general_registers() -> Result<()> {
    let mut traced = spawn_sleeper()?;

    let mut buf = vec![0u8; 4096];
    let len = traced.tracee.regset(NT_PRSTATUS, &mut buf)?;

    assert!(len > 0);
    assert!(len < buf.len());

    // Writing back what we read is a no-op.
    traced.tracee.set_regset(NT_PRSTATUS, &buf[..len])?;

    let mut again = vec![0u8; 4096];
    let len_again = traced.tracee.regset(NT_PRSTATUS, &mut again)?;
    assert_eq!(&buf[..len], &again[..len_again]);

    traced.finish()
}

#[cfg(target_arch = "x86_64")]
#[test]
#[timeout(2000)]
fn test_registers_agree_with_syscall_info() -> Result<()> {
    let mut traced = spawn_sleeper()?;

    let regs = traced.tracee.registers()?;
    let info = traced.tracee.syscall_info()?;

    assert_eq!(regs.rip, info.instruction_pointer);
    assert_eq!(regs.rsp, info.stack_pointer);

    traced.tracee.set_registers(regs)?;
    let fp = traced.tracee.fp_registers()?;
    traced.tracee.set_fp_registers(fp)?;

    traced.finish()
}

#[cfg(target_arch = "aarch64")]
#[test]
#[timeout(2000)]
fn test_registers_agree_with_syscall_info() -> Result<()> {
    let mut traced = spawn_sleeper()?;

    let regs = traced.tracee.registers()?;
    let info = traced.tracee.syscall_info()?;

    assert_eq!(regs.pc, info.instruction_pointer);
    assert_eq!(regs.sp, info.stack_pointer);

    traced.tracee.set_registers(regs)?;
    let fp = traced.tracee.fp_registers()?;
    traced.tracee.set_fp_registers(fp)?;

    traced.finish()
}

#[cfg(target_arch = "x86_64")]
#[test]
#[timeout(2000)]
fn test_user_area_registers() -> Result<()> {
    use memoffset::offset_of;

    let mut traced = spawn_sleeper()?;

    // The `USER` area begins with the general-purpose registers.
    let rip = offset_of!(libc::user_regs_struct, rip) as u64;
    let rax = offset_of!(libc::user_regs_struct, rax) as u64;

    let regs = traced.tracee.registers()?;
    assert_eq!(traced.tracee.peek_user(rip)?, regs.rip);

    traced.tracee.poke_user(rax, 0x1234)?;
    assert_eq!(traced.tracee.registers()?.rax, 0x1234);
    assert_eq!(traced.tracee.peek_user(rax)?, 0x1234);

    traced.tracee.poke_user(rax, regs.rax)?;
    assert_eq!(traced.tracee.registers()?.rax, regs.rax);

    traced.finish()
}

#[test]
#[timeout(2000)]
fn test_seccomp_requests() -> Result<()> {
    let traced = spawn_sleeper()?;

    // Whether the tracee inherited a filter, and whether we may read it, depends on the
    // environment. Either way, the tracee is alive.
    match traced.tracee.seccomp_filter(0) {
        Ok(filter) => assert!(!filter.is_empty()),
        Err(err) => {
            assert!(!err.tracee_died());
            assert!(matches!(
                err.errno(),
                Some(Errno::EINVAL) | Some(Errno::EACCES) | Some(Errno::ENOENT) | Some(Errno::EIO)
            ));
        },
    }

    if let Err(err) = traced.tracee.seccomp_metadata(0) {
        assert!(!err.tracee_died());
    }

    traced.finish()
}

#[test]
#[timeout(2000)]
fn test_rseq_configuration() -> Result<()> {
    let traced = spawn_sleeper()?;

    match traced.tracee.rseq_configuration() {
        Ok(conf) => {
            // Before the new image registers an area, nothing is configured.
            assert_eq!(conf.rseq_abi_pointer, 0);
            assert_eq!(conf.rseq_abi_size, 0);
        },
        // Kernels before 5.13 do not know the request.
        Err(Error::Request { source: Errno::EIO, .. }) => {},
        Err(err) => return Err(err.into()),
    }

    traced.finish()
}
