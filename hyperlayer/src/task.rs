//! Per-host-thread task state.
//!
//! Each guest thread maps 1:1 onto a host thread; the host thread's
//! [`Task`] is only ever mutated by that thread itself. Cross-thread
//! observation (signal delivery, `sigpending`) goes through the atomic
//! fields only.

use std::sync::Arc;

use crate::signal::bitset::AtomicSigBits;

/// An alternate signal stack, installed via `sigaltstack`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalStack {
    /// Guest linear address of the stack base.
    pub addr: u64,
    /// `SS_DISABLE`/`SS_ONSTACK` flags as given to `sigaltstack`.
    pub flags: i32,
    /// Stack size in bytes.
    pub size: u64,
}

impl SignalStack {
    /// Whether this stack is usable (not `SS_DISABLE`).
    pub fn is_enabled(&self) -> bool {
        self.flags & libc::SS_DISABLE == 0
    }
}

/// Control block for one guest thread.
#[derive(Debug)]
pub struct Task {
    /// Guest-visible thread id (the host thread's tid, reused directly).
    pub tid: i32,
    /// `CLONE_CHILD_SETTID` target, written once at clone time.
    pub set_child_tid: std::sync::atomic::AtomicU64,
    /// `CLONE_CHILD_CLEARTID` target, cleared (and futex-woken) at exit.
    pub clear_child_tid: std::sync::atomic::AtomicU64,
    /// Signals currently blocked by this thread.
    pub sigmask: AtomicSigBits,
    /// Signals pending for this thread specifically.
    pub sigpending: AtomicSigBits,
    /// Optional alternate signal stack.
    pub sas: std::sync::Mutex<Option<SignalStack>>,
    /// Signal masks saved across nested handler invocations: pushed by
    /// `marshal_signal_frame` with the mask in effect just before it blocks
    /// `sig`/`sa_mask` for the handler's duration, popped and restored by
    /// `sys_rt_sigreturn`. A stack rather than a single slot because a
    /// second handler can itself be invoked (for a signal not in the
    /// first's `sa_mask`) before the first returns.
    pub saved_sigmasks: std::sync::Mutex<Vec<u64>>,
}

impl Task {
    /// Construct a fresh task for host thread `tid`.
    pub fn new(tid: i32) -> Arc<Self> {
        Arc::new(Self {
            tid,
            set_child_tid: std::sync::atomic::AtomicU64::new(0),
            clear_child_tid: std::sync::atomic::AtomicU64::new(0),
            sigmask: AtomicSigBits::new(),
            sigpending: AtomicSigBits::new(),
            sas: std::sync::Mutex::new(None),
            saved_sigmasks: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Signals that are pending and not currently blocked — the set the
    /// supervisor loop must deliver before the next `vmm_run`.
    pub fn deliverable(&self) -> u64 {
        self.sigpending.load() & !self.sigmask.load()
    }
}

thread_local! {
    /// The calling host thread's task, installed by whoever spawns the
    /// thread on behalf of a guest thread. `main_loop` reads this rather
    /// than threading a `&Task` through every call.
    pub static CURRENT_TASK: std::cell::RefCell<Option<Arc<Task>>> = const { std::cell::RefCell::new(None) };
}

/// Install `task` as the current thread's task state.
pub fn set_current(task: Arc<Task>) {
    CURRENT_TASK.with(|cell| *cell.borrow_mut() = Some(task));
}

/// Fetch the current thread's task state.
///
/// # Panics
/// Panics if no task has been installed via [`set_current`] — every host
/// thread that enters `main_loop` must have one.
pub fn current() -> Arc<Task> {
    CURRENT_TASK.with(|cell| {
        cell.borrow()
            .clone()
            .expect("main_loop entered without an installed Task")
    })
}
