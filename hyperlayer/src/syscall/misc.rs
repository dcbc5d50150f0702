//! Time-related syscalls, including the handlers the vsyscall trampoline
//! routes into directly.

use super::context::SyscallContext;
use super::uaccess::copy_to_user;

#[repr(C)]
struct LinuxTimeval {
    tv_sec: i64,
    tv_usec: i64,
}

#[repr(C)]
struct LinuxTimespec {
    tv_sec: i64,
    tv_nsec: i64,
}

fn write_struct<T>(ctx: &SyscallContext, addr: u64, value: &T) -> i64 {
    let bytes = unsafe { std::slice::from_raw_parts((value as *const T).cast::<u8>(), std::mem::size_of::<T>()) };
    match copy_to_user(ctx.proc, addr, bytes) {
        Ok(()) => 0,
        Err(_) => -i64::from(libc::EFAULT),
    }
}

pub fn sys_gettimeofday(ctx: &SyscallContext) -> i64 {
    let mut tv = libc::timeval { tv_sec: 0, tv_usec: 0 };
    if unsafe { libc::gettimeofday(&mut tv, std::ptr::null_mut()) } != 0 {
        return -i64::from(libc::EINVAL);
    }
    let out = LinuxTimeval { tv_sec: tv.tv_sec as i64, tv_usec: tv.tv_usec as i64 };
    if ctx.arg(0) == 0 {
        return 0;
    }
    write_struct(ctx, ctx.arg(0), &out)
}

pub fn sys_time(ctx: &SyscallContext) -> i64 {
    let now = unsafe { libc::time(std::ptr::null_mut()) };
    if ctx.arg(0) != 0 {
        let rc = write_struct(ctx, ctx.arg(0), &(now as i64));
        if rc != 0 {
            return rc;
        }
    }
    now as i64
}

pub fn sys_clock_gettime(ctx: &SyscallContext) -> i64 {
    let clock_id = ctx.arg(0) as libc::clockid_t;
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    if unsafe { libc::clock_gettime(clock_id, &mut ts) } != 0 {
        return -i64::from(libc::EINVAL);
    }
    let out = LinuxTimespec { tv_sec: ts.tv_sec as i64, tv_nsec: ts.tv_nsec as i64 };
    write_struct(ctx, ctx.arg(1), &out)
}

/// `getcpu`: always reports CPU 0, node 0 — this supervisor pins the guest
/// to a single vCPU, so there is no second value that would ever be true.
pub fn sys_getcpu(ctx: &SyscallContext) -> i64 {
    if ctx.arg(0) != 0 {
        let rc = write_struct(ctx, ctx.arg(0), &0u32);
        if rc != 0 {
            return rc;
        }
    }
    if ctx.arg(1) != 0 {
        let rc = write_struct(ctx, ctx.arg(1), &0u32);
        if rc != 0 {
            return rc;
        }
    }
    0
}
