//! Guest memory crossings: every handler that touches guest-supplied
//! pointers goes through these, never a raw cast at the call site.
//!
//! A short copy (fewer bytes transferred than requested because the
//! mapping ends partway through) is always a hard `EFAULT`, never a
//! partial success — that is the contract handlers above this layer rely
//! on.

use crate::error::{Result, SyscallError};
use crate::proc::Process;

/// Copy `len` bytes from guest address `addr` into a fresh `Vec`.
pub fn copy_from_user(proc: &Process, addr: u64, len: usize) -> Result<Vec<u8>> {
    if !proc.mm.addr_ok(addr, len, libc::PROT_READ) {
        return Err(SyscallError::Fault(addr).into());
    }
    let Some(host_ptr) = proc.mm.guest_to_host(addr) else {
        return Err(SyscallError::Fault(addr).into());
    };
    let slice = unsafe { std::slice::from_raw_parts(host_ptr, len) };
    Ok(slice.to_vec())
}

/// Copy `data` to guest address `addr`.
pub fn copy_to_user(proc: &Process, addr: u64, data: &[u8]) -> Result<()> {
    if !proc.mm.addr_ok(addr, data.len(), libc::PROT_WRITE) {
        return Err(SyscallError::Fault(addr).into());
    }
    let Some(host_ptr) = proc.mm.guest_to_host(addr) else {
        return Err(SyscallError::Fault(addr).into());
    };
    unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), host_ptr, data.len()) };
    Ok(())
}

/// Copy a NUL-terminated string from guest memory, capped at `max_len`
/// bytes (callers pass `PATH_MAX`-style bounds so an unterminated guest
/// buffer cannot force an unbounded host-side read).
pub fn strncpy_from_user(proc: &Process, addr: u64, max_len: usize) -> Result<String> {
    if !proc.mm.addr_ok(addr, 1, libc::PROT_READ) {
        return Err(SyscallError::Fault(addr).into());
    }
    let Some(host_ptr) = proc.mm.guest_to_host(addr) else {
        return Err(SyscallError::Fault(addr).into());
    };
    let mut bytes = Vec::with_capacity(64);
    for i in 0..max_len {
        if !proc.mm.addr_ok(addr + i as u64, 1, libc::PROT_READ) {
            return Err(SyscallError::Fault(addr + i as u64).into());
        }
        let byte = unsafe { *host_ptr.add(i) };
        if byte == 0 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        bytes.push(byte);
    }
    Err(SyscallError::Fault(addr).into())
}

/// Linux's `PATH_MAX`, the cap every path-taking handler uses with
/// [`strncpy_from_user`].
pub const PATH_MAX: usize = 4096;

/// Copy a `repr(C)`, `Copy` struct's bytes out of guest memory. The sole
/// way `ioctl`/`fcntl` struct arguments (`termios`, `winsize`, `flock`, the
/// process-group `pid_t`) may be read — never a raw cast of the guest
/// address to a host pointer.
pub fn copy_struct_from_user<T: Copy>(proc: &Process, addr: u64) -> Result<T> {
    let bytes = copy_from_user(proc, addr, std::mem::size_of::<T>())?;
    Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<T>()) })
}

/// Copy a `repr(C)` struct's bytes into guest memory, the write-back
/// counterpart of [`copy_struct_from_user`].
pub fn copy_struct_to_user<T>(proc: &Process, addr: u64, value: &T) -> Result<()> {
    let bytes = unsafe { std::slice::from_raw_parts((value as *const T).cast::<u8>(), std::mem::size_of::<T>()) };
    copy_to_user(proc, addr, bytes)
}
