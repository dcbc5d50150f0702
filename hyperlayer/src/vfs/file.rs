//! Open-file objects and their operation vtable.

use std::os::fd::RawFd;
use std::sync::Arc;

use crate::error::{Result, VfsError};

/// Linux `struct stat64`-equivalent, already translated to host-neutral
/// fields. Conversions to/from the guest's on-wire layout live in
/// `conversions::stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinuxStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    pub atime: i64,
    pub atime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub ctime: i64,
    pub ctime_nsec: i64,
}

/// Linux `struct statfs`-equivalent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxStatfs {
    pub f_type: i64,
    pub f_bsize: i64,
    pub f_blocks: u64,
    pub f_bfree: u64,
    pub f_bavail: u64,
    pub f_files: u64,
    pub f_ffree: u64,
    pub f_namelen: i64,
    pub f_frsize: i64,
}

/// The twelve-operation capability set every open file exposes. A tagged
/// enum dispatching to free functions would work just as well; this crate
/// uses a trait object so `HostFile` and any future backend share one call
/// surface without a growing `match`.
pub trait FileOps: std::fmt::Debug + Send + Sync {
    /// Scatter-read into `bufs`, honoring the file's current offset.
    fn readv(&self, bufs: &mut [std::io::IoSliceMut<'_>]) -> Result<usize>;
    /// Gather-write from `bufs`, honoring the file's current offset.
    fn writev(&self, bufs: &[std::io::IoSlice<'_>]) -> Result<usize>;
    /// Release the underlying host resource. Called at most once.
    fn close(&self) -> Result<()>;
    /// Terminal/device control. Unknown requests return `-ENOTTY`. `proc`
    /// is threaded through so implementations can route `arg` (a guest
    /// pointer) through `copy_from_user`/`copy_to_user` rather than
    /// dereferencing it directly.
    fn ioctl(&self, proc: &crate::proc::Process, request: u64, arg: u64) -> Result<i64>;
    /// Reposition the file offset.
    fn lseek(&self, offset: i64, whence: i32) -> Result<i64>;
    /// Fill a Linux `dirent64`-layout buffer.
    fn getdents(&self, buf: &mut [u8]) -> Result<usize>;
    /// `fcntl` commands not already handled generically by the fd table.
    /// Same `proc` rationale as [`FileOps::ioctl`]: lock-struct arguments
    /// are guest pointers, crossed via `copy_struct_from_user`/
    /// `copy_struct_to_user`.
    fn fcntl(&self, proc: &crate::proc::Process, cmd: i32, arg: u64) -> Result<i64>;
    /// Flush to stable storage.
    fn fsync(&self) -> Result<()>;
    /// Populate a `stat` structure.
    fn fstat(&self) -> Result<LinuxStat>;
    /// Populate a `statfs` structure for the filesystem backing this file.
    fn fstatfs(&self) -> Result<LinuxStatfs>;
    /// Change ownership.
    fn fchown(&self, uid: u32, gid: u32) -> Result<()>;
    /// Change permission bits.
    fn fchmod(&self, mode: u32) -> Result<()>;
    /// The host file descriptor backing this object, if any (used by
    /// `getdents` to `dup` before streaming so the caller's fd position is
    /// left untouched).
    fn raw_fd(&self) -> Option<RawFd>;
}

/// An open file, shared by every fd-table slot and in-flight acquire that
/// points at it. Strong-count drop-to-zero is the "free on 1→0" moment
/// spec'd for open files; `ops.close()` already ran earlier, at the last
/// explicit `close(2)`, decoupled from this drop per [`super::vfs_close`].
#[derive(Debug)]
pub struct OpenFile {
    pub ops: Arc<dyn FileOps>,
}

impl OpenFile {
    /// Wrap an operations vtable into a shareable open file.
    pub fn new(ops: Arc<dyn FileOps>) -> Arc<Self> {
        Arc::new(Self { ops })
    }
}

/// Acquire the file at `fd`, bumping the shared reference.
///
/// Bounds-checks `fd` against the table and returns [`VfsError::BadFd`] if
/// the slot is empty, mirroring `vfs_acquire`'s bounds + null check.
pub fn acquire(table: &super::FdTable, fd: i32) -> Result<Arc<OpenFile>> {
    table
        .get(fd)
        .ok_or(VfsError::BadFd(fd))
        .map_err(Into::into)
}
