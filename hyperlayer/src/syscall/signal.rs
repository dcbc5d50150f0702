//! `rt_sigaction`/`rt_sigprocmask`/`rt_sigreturn` handler bodies.

use crate::signal::bitset::NSIG;
use crate::signal::{Disposition, SigAction};
use crate::task;

use super::context::SyscallContext;
use super::uaccess::{copy_from_user, copy_to_user};

const SIG_DFL: u64 = 0;
const SIG_IGN: u64 = 1;

#[repr(C)]
#[derive(Clone, Copy)]
struct RawSigaction {
    handler: u64,
    flags: u64,
    restorer: u64,
    mask: u64,
}

fn encode(action: SigAction) -> RawSigaction {
    match action.disposition {
        Disposition::Default => RawSigaction { handler: SIG_DFL, flags: 0, restorer: 0, mask: 0 },
        Disposition::Ignore => RawSigaction { handler: SIG_IGN, flags: 0, restorer: 0, mask: 0 },
        Disposition::Handler { addr, sa_mask, sa_flags } => {
            RawSigaction { handler: addr, flags: sa_flags, restorer: 0, mask: sa_mask }
        }
    }
}

fn decode(raw: &RawSigaction) -> Disposition {
    match raw.handler {
        SIG_DFL => Disposition::Default,
        SIG_IGN => Disposition::Ignore,
        addr => Disposition::Handler { addr, sa_mask: raw.mask, sa_flags: raw.flags },
    }
}

pub fn sys_rt_sigaction(ctx: &SyscallContext) -> i64 {
    let signum = ctx.arg(0) as i32;
    if signum <= 0 || signum as usize >= NSIG {
        return -i64::from(libc::EINVAL);
    }

    if ctx.arg(2) != 0 {
        let old = ctx.proc.sigaction.read().expect("sigaction lock poisoned")[signum as usize];
        let raw = encode(old);
        let bytes = unsafe {
            std::slice::from_raw_parts((&raw as *const RawSigaction).cast::<u8>(), std::mem::size_of::<RawSigaction>())
        };
        if copy_to_user(ctx.proc, ctx.arg(2), bytes).is_err() {
            return -i64::from(libc::EFAULT);
        }
    }

    if ctx.arg(1) != 0 {
        let bytes = match copy_from_user(ctx.proc, ctx.arg(1), std::mem::size_of::<RawSigaction>()) {
            Ok(b) => b,
            Err(_) => return -i64::from(libc::EFAULT),
        };
        let raw = unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<RawSigaction>()) };
        let disposition = decode(&raw);
        let mut table = ctx.proc.sigaction.write().expect("sigaction lock poisoned");
        table[signum as usize] = SigAction { disposition };
    }

    0
}

const SIG_BLOCK: u64 = 0;
const SIG_UNBLOCK: u64 = 1;
const SIG_SETMASK: u64 = 2;

pub fn sys_rt_sigprocmask(ctx: &SyscallContext) -> i64 {
    let how = ctx.arg(0);
    let set_addr = ctx.arg(1);
    let oldset_addr = ctx.arg(2);
    let current = task::current();

    if oldset_addr != 0 {
        let old = current.sigmask.load();
        if copy_to_user(ctx.proc, oldset_addr, &old.to_ne_bytes()).is_err() {
            return -i64::from(libc::EFAULT);
        }
    }

    if set_addr == 0 {
        return 0;
    }

    let bytes = match copy_from_user(ctx.proc, set_addr, 8) {
        Ok(b) => b,
        Err(_) => return -i64::from(libc::EFAULT),
    };
    let mask = u64::from_ne_bytes(bytes.try_into().expect("exactly 8 bytes"));

    match how {
        SIG_BLOCK => current.sigmask.addset(mask),
        SIG_UNBLOCK => current.sigmask.delset(mask),
        SIG_SETMASK => {
            current.sigmask.replace(mask);
        }
        _ => return -i64::from(libc::EINVAL),
    }
    0
}

/// The signal frame this crate marshals onto the guest stack does not save
/// the pre-signal register file (that belongs to the out-of-scope memory
/// manager and ELF loader, per [`crate::signal::marshal_signal_frame`]), so
/// there is no saved register context to restore here. The supervisor
/// loop's own `return_on_sigreturn` handling is what actually resumes the
/// interrupted flow; this handler's job is restoring the signal mask
/// `marshal_signal_frame` blocked `sig`/`sa_mask` onto, so the handler's
/// temporary blocking doesn't outlive the handler itself.
pub fn sys_rt_sigreturn(_ctx: &SyscallContext) -> i64 {
    let current = task::current();
    let saved = current.saved_sigmasks.lock().expect("saved sigmasks lock poisoned").pop();
    if let Some(mask) = saved {
        current.sigmask.replace(mask);
    }
    0
}

/// Temporarily replace the calling task's mask with `mask`, block until a
/// signal not in that temporary mask becomes pending, restore the original
/// mask, and always return `-EINTR` — per `sigsuspend(2)`, there is no
/// "success" return. Polls with a bounded sleep the way `FutexTable::wait`
/// does rather than a real blocking primitive, since nothing here wakes
/// this host thread directly on signal arrival.
pub fn sys_rt_sigsuspend(ctx: &SyscallContext) -> i64 {
    let bytes = match copy_from_user(ctx.proc, ctx.arg(0), 8) {
        Ok(b) => b,
        Err(_) => return -i64::from(libc::EFAULT),
    };
    let temp_mask = u64::from_ne_bytes(bytes.try_into().expect("exactly 8 bytes"));

    let current = task::current();
    let old_mask = current.sigmask.replace(temp_mask);

    while current.deliverable() == 0 {
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    current.sigmask.replace(old_mask);
    -i64::from(libc::EINTR)
}
