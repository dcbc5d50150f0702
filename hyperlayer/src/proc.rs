//! The process control block: state shared by every task in one emulated
//! process tree.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::cred::Cred;
use crate::futex::FutexTable;
use crate::signal::SigAction;
use crate::signal::bitset::NSIG;
use crate::task::Task;
use crate::vfs::FdTable;
use crate::vfs::fs_ops::FsOps;

/// External collaborator: the memory manager. `do_mmap`, `guest_to_host`
/// and address validity checks live on the other side of this trait and
/// are not implemented by this crate.
pub trait MemoryMap: std::fmt::Debug + Send + Sync {
    /// Map `len` bytes with `prot`/`flags` semantics matching `mmap(2)`,
    /// returning the guest linear address chosen (or requested, for
    /// `MAP_FIXED`).
    fn mmap(&self, addr: u64, len: usize, prot: i32, flags: i32) -> crate::error::Result<u64>;
    /// Unmap a previously mapped region.
    fn munmap(&self, addr: u64, len: usize) -> crate::error::Result<()>;
    /// Translate a guest linear address into a host pointer, or `None` if
    /// the address is not currently mapped.
    fn guest_to_host(&self, addr: u64) -> Option<*mut u8>;
    /// Whether `len` bytes starting at `addr` are mapped with at least
    /// `prot` permissions.
    fn addr_ok(&self, addr: u64, len: usize, prot: i32) -> bool;
}

/// Process-wide state shared by every task. Lives for the lifetime of the
/// emulated process; mutated only under the locks on its fields.
#[derive(Debug)]
pub struct Process {
    pub mm: Arc<dyn MemoryMap>,
    pub vfs: Arc<dyn FsOps>,
    pub vfs_root: RawFd,
    pub fdtab: RwLock<FdTable>,
    pub sigaction: RwLock<[SigAction; NSIG]>,
    pub tasks: Mutex<Vec<Weak<Task>>>,
    /// Host linear address of the lazily-allocated vsyscall trampoline, or
    /// 0 if not yet installed. Installed at most once.
    pub vsyscall_page: AtomicU64,
    pub cred: RwLock<Cred>,
    pub futex: FutexTable,
    pub pid: i32,
}

impl Process {
    pub fn new(mm: Arc<dyn MemoryMap>, vfs: Arc<dyn FsOps>, vfs_root: RawFd, pid: i32) -> Arc<Self> {
        Arc::new(Self {
            mm,
            vfs,
            vfs_root,
            fdtab: RwLock::new(FdTable::default()),
            sigaction: RwLock::new(std::array::from_fn(|_| SigAction::default())),
            tasks: Mutex::new(Vec::new()),
            vsyscall_page: AtomicU64::new(0),
            cred: RwLock::new(Cred::from_host()),
            futex: FutexTable::new(),
            pid,
        })
    }

    /// Register a new task under this process.
    pub fn add_task(&self, task: &Arc<Task>) {
        self.tasks.lock().expect("tasks lock poisoned").push(Arc::downgrade(task));
    }

    /// Live tasks, pruning any that have already been dropped.
    pub fn live_tasks(&self) -> Vec<Arc<Task>> {
        let mut guard = self.tasks.lock().expect("tasks lock poisoned");
        guard.retain(|w| w.strong_count() > 0);
        guard.iter().filter_map(Weak::upgrade).collect()
    }

    /// Install the vsyscall page address, once. Returns `false` if it was
    /// already installed (the caller should not attempt to reallocate).
    pub fn install_vsyscall_page(&self, addr: u64) -> bool {
        self.vsyscall_page
            .compare_exchange(0, addr, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
