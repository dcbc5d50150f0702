//! Signal delivery: dispositions, pending-set management, and the
//! guest-stack frame marshaling the supervisor loop runs at the top of
//! every iteration.

pub mod bitset;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, SignalError};
use crate::proc::Process;
use crate::task::Task;
use crate::vmm::Vmm;

/// Disposition a process has registered for one signal number.
#[derive(Debug, Clone, Copy)]
pub enum Disposition {
    Default,
    Ignore,
    Handler { addr: u64, sa_mask: u64, sa_flags: u64 },
}

impl Default for Disposition {
    fn default() -> Self {
        Disposition::Default
    }
}

/// One `sigaction` table slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct SigAction {
    pub disposition: Disposition,
}

/// Find a task in `proc` eligible to receive `sig`: prefer one that does
/// not currently block it, otherwise fall back to any task (it will
/// observe the pending bit once it unblocks).
pub fn send_signal(proc: &Process, sig: i32) -> Result<()> {
    let tasks = proc.live_tasks();
    if tasks.is_empty() {
        return Err(SignalError::NoEligibleTask.into());
    }
    let target = tasks
        .iter()
        .find(|t| !t.sigmask.ismember(sig))
        .unwrap_or(&tasks[0]);
    target.sigpending.addbit(sig);
    Ok(())
}

/// Run at the start of every supervisor-loop iteration: deliver any
/// signal pending and not blocked for the current task.
pub fn handle_signal(proc: &Process, task: &Arc<Task>, vmm: &mut dyn Vmm) -> Result<()> {
    let deliverable = task.deliverable();
    if deliverable == 0 {
        return Ok(());
    }
    for sig in 1..bitset::NSIG as i32 {
        if deliverable & (1u64 << sig) == 0 {
            continue;
        }
        deliver_one(proc, task, vmm, sig)?;
        // Deliver one signal per loop iteration; the next iteration's
        // `handle_signal` call picks up whatever remains pending.
        break;
    }
    Ok(())
}

fn deliver_one(proc: &Process, task: &Arc<Task>, vmm: &mut dyn Vmm, sig: i32) -> Result<()> {
    let action = proc.sigaction.read().expect("sigaction lock poisoned")[sig as usize];
    match action.disposition {
        Disposition::Ignore => {
            task.sigpending.delbit(sig);
            Ok(())
        }
        Disposition::Default => {
            task.sigpending.delbit(sig);
            die_with_forcedsig(proc, task, sig)
        }
        Disposition::Handler { addr, sa_mask, sa_flags } => {
            task.sigpending.delbit(sig);
            marshal_signal_frame(task, vmm, sig, addr, sa_mask, sa_flags)
        }
    }
}

/// Marshal a signal frame onto the guest stack (or the alternate stack, if
/// one is configured and the handler requested it), point RIP at the
/// handler, and block `sig` plus the handler's `sa_mask` for the duration.
fn marshal_signal_frame(
    task: &Arc<Task>,
    vmm: &mut dyn Vmm,
    sig: i32,
    handler_addr: u64,
    sa_mask: u64,
    sa_flags: u64,
) -> Result<()> {
    use crate::vmm::Register;

    const SA_ONSTACK: u64 = 0x0800_0000;

    let sas = *task.sas.lock().expect("sas lock poisoned");
    let rsp = vmm.read_register(Register::Rsp).map_err(|e| {
        SignalError::FrameDelivery(std::io::Error::other(e.to_string()))
    })?;

    let frame_base = match sas {
        Some(stack) if stack.is_enabled() && sa_flags & SA_ONSTACK != 0 => stack.addr + stack.size,
        _ => rsp,
    };

    // Reserve a red-zone-safe frame below the chosen stack pointer; the
    // actual signal-frame layout (siginfo_t, ucontext_t, retcode trampoline)
    // is guest-ABI plumbing belonging to the out-of-scope memory manager
    // and ELF loader, so only the pointer bookkeeping lives here.
    let new_rsp = (frame_base - 512) & !0xF;

    vmm.write_register(Register::Rsp, new_rsp).map_err(|e| {
        SignalError::FrameDelivery(std::io::Error::other(e.to_string()))
    })?;
    vmm.write_register(Register::Rdi, sig as u64).map_err(|e| {
        SignalError::FrameDelivery(std::io::Error::other(e.to_string()))
    })?;
    vmm.write_register(Register::Rip, handler_addr).map_err(|e| {
        SignalError::FrameDelivery(std::io::Error::other(e.to_string()))
    })?;

    task.saved_sigmasks.lock().expect("saved sigmasks lock poisoned").push(task.sigmask.load());
    task.sigmask.addbit(sig);
    task.sigmask.addset(sa_mask);
    debug!(sig, handler_addr, "signal frame delivered");
    Ok(())
}

/// Terminate the task's process with signal `sig`'s default action: mask
/// every other signal, install the default disposition, and raise the
/// host's own counterpart so the process actually dies with that signal.
pub fn die_with_forcedsig(proc: &Process, task: &Arc<Task>, sig: i32) -> Result<()> {
    task.sigmask.replace(!0);
    {
        let mut table = proc.sigaction.write().expect("sigaction lock poisoned");
        table[sig as usize] = SigAction { disposition: Disposition::Default };
    }
    let host_sig = crate::conversions::signal::linux_to_host(sig).unwrap_or(sig);
    warn!(sig, host_sig, "terminating with forced signal");
    unsafe {
        libc::raise(host_sig);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    #[test]
    fn blocked_signal_stays_pending_never_delivered() {
        let task = Task::new(1);
        task.sigmask.addbit(10);
        task.sigpending.addbit(10);
        assert_eq!(task.deliverable(), 0, "blocked signal must not be deliverable");
        task.sigmask.delbit(10);
        assert_ne!(task.deliverable() & (1u64 << 10), 0, "unblocking must surface it");
    }

    #[test]
    fn marshal_signal_frame_saves_the_mask_sigreturn_must_restore() {
        let task = Task::new(1);
        task.sigmask.addbit(3); // blocked before delivery, must survive it
        let mut vmm = crate::vmm::fake::FakeVmm::new();

        marshal_signal_frame(&task, &mut vmm, 10, 0x1000, 1u64 << 20, 0).expect("frame marshals");

        assert!(task.sigmask.ismember(10), "sig itself is blocked for the handler's duration");
        assert!(task.sigmask.ismember(20), "sa_mask is unioned in for the handler's duration");
        assert!(task.sigmask.ismember(3), "pre-existing block is untouched");

        // This is what `sys_rt_sigreturn` does with the saved mask.
        let restored = task
            .saved_sigmasks
            .lock()
            .unwrap()
            .pop()
            .expect("marshal_signal_frame must have saved a mask to restore");
        task.sigmask.replace(restored);

        assert!(!task.sigmask.ismember(10), "sigreturn must unblock the delivered signal");
        assert!(!task.sigmask.ismember(20), "sigreturn must unblock the sa_mask additions");
        assert!(task.sigmask.ismember(3), "sigreturn must not touch pre-existing blocks");
    }
}
