//! vsyscall emulation: a lazily-allocated three-byte trampoline at the
//! fixed guest address real Linux reserves for it.

use tracing::{error, warn};

use crate::error::Result;
use crate::proc::Process;
use crate::signal;
use crate::task::Task;
use crate::vmm::{Register, Vmm};

/// Fixed guest linear address of the vsyscall page.
pub const VSYSCALL_PAGE_ADDR: u64 = 0xFFFF_FFFF_FF60_0000;
/// Size of the reserved region.
pub const VSYSCALL_PAGE_SIZE: u64 = 0x1000;

const TRAMPOLINE: [u8; 3] = [0x0F, 0x05, 0xC3]; // syscall; ret

fn syscall_number_for_offset(offset: u64) -> Option<u64> {
    match offset {
        0x000 => Some(96),  // gettimeofday
        0x400 => Some(201), // time
        0x800 => Some(309), // getcpu
        _ => None,
    }
}

/// Handle a `#PF` that landed inside the vsyscall page: lazily install the
/// trampoline on first use, then redirect the guest to it with RAX
/// preloaded with the syscall number the faulting offset corresponds to.
pub fn handle_vsyscall_fault(
    proc: &Process,
    task: &std::sync::Arc<Task>,
    vmm: &mut dyn Vmm,
    fault_addr: u64,
) -> Result<()> {
    let offset = fault_addr - VSYSCALL_PAGE_ADDR;
    let Some(sysno) = syscall_number_for_offset(offset) else {
        warn!(fault_addr, offset, "vsyscall fault at unmapped offset");
        let _ = task;
        signal::send_signal(proc, libc::SIGSEGV)?;
        return Ok(());
    };

    if proc.vsyscall_page.load(std::sync::atomic::Ordering::SeqCst) == 0 {
        let addr = proc
            .mm
            .mmap(
                VSYSCALL_PAGE_ADDR,
                VSYSCALL_PAGE_SIZE as usize,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_FIXED | libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
            )
            .map_err(|e| {
                error!(?e, "failed to install vsyscall page");
                e
            })?;
        if let Some(host_ptr) = proc.mm.guest_to_host(addr) {
            unsafe { std::ptr::copy_nonoverlapping(TRAMPOLINE.as_ptr(), host_ptr, TRAMPOLINE.len()) };
        }
        proc.install_vsyscall_page(addr);
    }

    let page = proc.vsyscall_page.load(std::sync::atomic::Ordering::SeqCst);
    vmm.write_register(Register::Rax, sysno)
        .map_err(|e| crate::error::VmmError::RegisterAccess(e.to_string()))?;
    vmm.write_register(Register::Rip, page)
        .map_err(|e| crate::error::VmmError::RegisterAccess(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_maps_to_documented_syscall_numbers() {
        assert_eq!(syscall_number_for_offset(0x000), Some(96));
        assert_eq!(syscall_number_for_offset(0x400), Some(201));
        assert_eq!(syscall_number_for_offset(0x800), Some(309));
        assert_eq!(syscall_number_for_offset(0xC00), None);
    }

    #[test]
    fn offset_must_match_an_entry_point_exactly() {
        assert_eq!(syscall_number_for_offset(0x001), None);
        assert_eq!(syscall_number_for_offset(0x00F), None);
        assert_eq!(syscall_number_for_offset(0x401), None);
        assert_eq!(syscall_number_for_offset(0x7FF), None);
    }
}
