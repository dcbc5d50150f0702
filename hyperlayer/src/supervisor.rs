//! The VM-exit dispatch loop: the supervisor's central `run` — one
//! iteration per VM exit, classifying the reason and acting on it before
//! re-entering the guest.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::proc::Process;
use crate::signal;
use crate::syscall::{self, SyscallContext};
use crate::task::Task;
use crate::vmm::{Register, VmExit, Vmm};
use crate::vsyscall;

const SYSCALL_INSN: [u8; 2] = [0x0F, 0x05];
const VEX_C4: u8 = 0xC4;
const VEX_C5: u8 = 0xC5;

fn is_vsyscall_addr(addr: u64) -> bool {
    (vsyscall::VSYSCALL_PAGE_ADDR..vsyscall::VSYSCALL_PAGE_ADDR + vsyscall::VSYSCALL_PAGE_SIZE).contains(&addr)
}

fn guest_args(vmm: &dyn Vmm) -> Result<[u64; 6]> {
    Ok([
        vmm.read_register(Register::Rdi)?,
        vmm.read_register(Register::Rsi)?,
        vmm.read_register(Register::Rdx)?,
        vmm.read_register(Register::R10)?,
        vmm.read_register(Register::R8)?,
        vmm.read_register(Register::R9)?,
    ])
}

/// Decode and run one syscall at the current RIP, advancing RIP past the
/// two-byte `syscall` instruction and writing the result into RAX.
///
/// Returns `true` if the syscall dispatched was `rt_sigreturn` — callers
/// that loop on behalf of a single blocking syscall (nothing in this crate
/// does yet, but the signature documents the intended use) can stop early.
fn run_syscall(
    proc: &Arc<Process>,
    task: &Arc<Task>,
    table: &[Option<syscall::SyscallHandler>; syscall::MAX_SYSCALLS],
    vmm: &mut dyn Vmm,
) -> Result<bool> {
    let nr = vmm.read_register(Register::Rax)?;
    let args = guest_args(vmm)?;
    let ctx = SyscallContext { proc, task, args };

    let ret = match syscall::dispatch(table, nr, &ctx) {
        Ok(ret) => ret,
        Err(e) => {
            warn!(nr, %e, "syscall dispatch failed");
            -i64::from(libc::ENOSYS)
        }
    };

    vmm.write_register(Register::Rax, ret as u64)?;
    let rip = vmm.read_register(Register::Rip)?;
    vmm.write_register(Register::Rip, rip + SYSCALL_INSN.len() as u64)?;

    Ok(nr == crate::syscall::numbers::SYS_RT_SIGRETURN)
}

fn handle_invalid_opcode(
    proc: &Arc<Process>,
    task: &Arc<Task>,
    table: &[Option<syscall::SyscallHandler>; syscall::MAX_SYSCALLS],
    vmm: &mut dyn Vmm,
    rip: u64,
    return_on_sigreturn: bool,
) -> Result<bool> {
    let mut insn = [0u8; 2];
    vmm.read_guest_memory(rip, &mut insn)?;

    if insn == SYSCALL_INSN {
        let was_sigreturn = run_syscall(proc, task, table, vmm)?;
        return Ok(was_sigreturn && return_on_sigreturn);
    }

    if insn[0] == VEX_C4 || insn[0] == VEX_C5 {
        match vmm.enable_avx() {
            Ok(true) => {
                trace!(rip, "enabled avx on first vex-prefixed instruction");
                return Ok(false);
            }
            Ok(false) => {
                warn!(rip, ?insn, "vex-prefixed instruction still faults with avx already enabled, delivering SIGILL");
            }
            Err(e) => {
                warn!(rip, ?insn, %e, "enabling avx failed, delivering SIGILL");
            }
        }
    } else {
        warn!(rip, ?insn, "unrecognized #UD, delivering SIGILL");
    }

    signal::send_signal(proc, libc::SIGILL)?;
    Ok(false)
}

/// Run the guest until it explicitly asks to stop (`return_on_sigreturn`
/// lets a caller single-step through exactly one signal handler's return,
/// the way a test harness driving [`crate::vmm::fake::FakeVmm`] needs to).
///
/// Each iteration: deliver one pending signal if any, run the guest to the
/// next exit, classify and act on the exit.
pub fn main_loop(proc: Arc<Process>, task: Arc<Task>, table: &[Option<syscall::SyscallHandler>; syscall::MAX_SYSCALLS], vmm: &mut dyn Vmm, return_on_sigreturn: bool) -> Result<()> {
    crate::task::set_current(task.clone());

    loop {
        signal::handle_signal(&proc, &task, vmm)?;

        let exit = vmm.run()?;
        match exit {
            VmExit::ExternalInterrupt | VmExit::HaltOrIrq => {}

            VmExit::PageFault { addr, write, exec } => {
                if is_vsyscall_addr(addr) {
                    vsyscall::handle_vsyscall_fault(&proc, &task, vmm, addr)?;
                } else {
                    debug!(addr, write, exec, "page fault outside vsyscall range, delivering SIGSEGV");
                    signal::send_signal(&proc, libc::SIGSEGV)?;
                }
            }

            VmExit::EptViolation { addr, read, write, exec } => {
                debug!(addr, read, write, exec, "ept violation on unmapped guest physical page");
                signal::send_signal(&proc, libc::SIGSEGV)?;
            }

            VmExit::InvalidOpcode { rip } => {
                if handle_invalid_opcode(&proc, &task, table, vmm, rip, return_on_sigreturn)? {
                    return Ok(());
                }
            }

            VmExit::Cpuid { leaf, subleaf } => {
                let (eax, ebx, ecx, edx) = host_cpuid(leaf, subleaf);
                vmm.write_register(Register::Rax, eax as u64)?;
                vmm.write_register(Register::Rbx, ebx as u64)?;
                vmm.write_register(Register::Rcx, ecx as u64)?;
                vmm.write_register(Register::Rdx, edx as u64)?;
                let rip = vmm.read_register(Register::Rip)?;
                vmm.write_register(Register::Rip, rip + 2)?;
            }

            VmExit::FatalException { vector } => {
                error!(vector, "fatal guest exception, terminating");
                signal::die_with_forcedsig(&proc, &task, libc::SIGSEGV)?;
                return Ok(());
            }

            VmExit::EntryFailureOrUnknown { raw_reason } => {
                warn!(raw_reason, "vm-entry failure or unrecognized exit reason");
                if let Err(e) = vmm.check_vm_entry() {
                    error!(%e, "vm-entry self-check failed after anomalous exit");
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn host_cpuid(leaf: u64, subleaf: u64) -> (u32, u32, u32, u32) {
    let result = unsafe { core::arch::x86_64::__cpuid_count(leaf as u32, subleaf as u32) };
    (result.eax, result.ebx, result.ecx, result.edx)
}

#[cfg(not(target_arch = "x86_64"))]
fn host_cpuid(_leaf: u64, _subleaf: u64) -> (u32, u32, u32, u32) {
    (0, 0, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::fs_ops::FsOps;
    use crate::vmm::fake::FakeVmm;

    #[derive(Debug)]
    struct NullMm;
    impl crate::proc::MemoryMap for NullMm {
        fn mmap(&self, addr: u64, _len: usize, _prot: i32, _flags: i32) -> Result<u64> {
            Ok(addr)
        }
        fn munmap(&self, _addr: u64, _len: usize) -> Result<()> {
            Ok(())
        }
        fn guest_to_host(&self, _addr: u64) -> Option<*mut u8> {
            None
        }
        fn addr_ok(&self, _addr: u64, _len: usize, _prot: i32) -> bool {
            false
        }
    }

    #[derive(Debug)]
    struct NullFs;
    impl FsOps for NullFs {
        fn openat(&self, _dir: std::os::fd::RawFd, _path: &str, _flags: i32, _mode: u32) -> Result<std::sync::Arc<dyn crate::vfs::file::FileOps>> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn symlinkat(&self, _target: &str, _dir: std::os::fd::RawFd, _path: &str) -> Result<()> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn faccessat(&self, _dir: std::os::fd::RawFd, _path: &str, _mode: i32, _flags: i32) -> Result<()> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn renameat(&self, _od: std::os::fd::RawFd, _op: &str, _nd: std::os::fd::RawFd, _np: &str) -> Result<()> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn linkat(&self, _od: std::os::fd::RawFd, _op: &str, _nd: std::os::fd::RawFd, _np: &str, _flags: i32) -> Result<()> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn unlinkat(&self, _dir: std::os::fd::RawFd, _path: &str, _flags: i32) -> Result<()> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn readlinkat(&self, _dir: std::os::fd::RawFd, _path: &str, _buf: &mut [u8]) -> Result<usize> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn mkdirat(&self, _dir: std::os::fd::RawFd, _path: &str, _mode: u32) -> Result<()> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn fstatat(&self, _dir: std::os::fd::RawFd, _path: &str, _flags: i32) -> Result<crate::vfs::file::LinuxStat> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn statfs(&self, _dir: std::os::fd::RawFd, _path: &str) -> Result<crate::vfs::file::LinuxStatfs> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn fchownat(&self, _dir: std::os::fd::RawFd, _path: &str, _uid: u32, _gid: u32, _flags: i32) -> Result<()> {
            Err(crate::error::VfsError::NotFound.into())
        }
        fn fchmodat(&self, _dir: std::os::fd::RawFd, _path: &str, _mode: u32, _flags: i32) -> Result<()> {
            Err(crate::error::VfsError::NotFound.into())
        }
    }

    #[test]
    fn halt_then_fatal_exception_terminates_without_panicking() {
        let proc = Process::new(std::sync::Arc::new(NullMm), std::sync::Arc::new(NullFs), -1, 1);
        let task = Task::new(1);
        proc.add_task(&task);
        let table = syscall::build_table();

        let mut vmm = FakeVmm::new().with_exit(VmExit::HaltOrIrq).with_exit(VmExit::FatalException { vector: 13 });

        main_loop(proc, task, &table, &mut vmm, false).expect("loop terminates cleanly on fatal exception");
    }

    #[test]
    fn vex_prefixed_instruction_enables_avx_and_resumes() {
        let proc = Process::new(std::sync::Arc::new(NullMm), std::sync::Arc::new(NullFs), -1, 1);
        let task = Task::new(1);
        proc.add_task(&task);
        let table = syscall::build_table();

        let mut vmm = FakeVmm::new();
        vmm.set_memory_bytes(0x1000, &[VEX_C4, 0x00]);

        let stop = handle_invalid_opcode(&proc, &task, &table, &mut vmm, 0x1000, false).expect("handles the exit");
        assert!(!stop);
        assert!(vmm.avx_enabled);
        assert_eq!(task.deliverable(), 0, "no signal should be raised on a successful first-time enable");
    }

    #[test]
    fn vex_prefixed_instruction_with_avx_already_enabled_falls_through_to_sigill() {
        let proc = Process::new(std::sync::Arc::new(NullMm), std::sync::Arc::new(NullFs), -1, 1);
        let task = Task::new(1);
        proc.add_task(&task);
        let table = syscall::build_table();

        let mut vmm = FakeVmm::new();
        vmm.set_memory_bytes(0x1000, &[VEX_C5, 0x00]);
        vmm.avx_enabled = true;

        let stop = handle_invalid_opcode(&proc, &task, &table, &mut vmm, 0x1000, false).expect("handles the exit");
        assert!(!stop);
        assert_ne!(
            task.deliverable() & (1u64 << libc::SIGILL),
            0,
            "a VEX-prefixed opcode that still faults with AVX already on must deliver SIGILL"
        );
    }
}
