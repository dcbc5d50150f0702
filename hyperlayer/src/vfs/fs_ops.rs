//! Filesystem-level (path-taking) operation vtable.

use std::os::fd::RawFd;
use std::sync::Arc;

use crate::error::Result;

use super::file::{FileOps, LinuxStat, LinuxStatfs};

/// The twelve path-level operations a filesystem backend must provide.
/// `HostFs` (in `hostfs.rs`) is the only implementation; the trait exists
/// so path resolution in `path.rs` stays backend-agnostic.
pub trait FsOps: std::fmt::Debug + Send + Sync {
    /// Open (optionally creating) the file at `dir`/`subpath`.
    fn openat(&self, dir: RawFd, subpath: &str, flags: i32, mode: u32) -> Result<Arc<dyn FileOps>>;
    /// Create a symlink at `dir`/`subpath` pointing at `target`.
    fn symlinkat(&self, target: &str, dir: RawFd, subpath: &str) -> Result<()>;
    /// Check access permissions.
    fn faccessat(&self, dir: RawFd, subpath: &str, mode: i32, flags: i32) -> Result<()>;
    /// Rename/move within or across directories.
    fn renameat(&self, old_dir: RawFd, old_path: &str, new_dir: RawFd, new_path: &str) -> Result<()>;
    /// Create a hard link.
    fn linkat(&self, old_dir: RawFd, old_path: &str, new_dir: RawFd, new_path: &str, flags: i32) -> Result<()>;
    /// Remove a non-directory entry.
    fn unlinkat(&self, dir: RawFd, subpath: &str, flags: i32) -> Result<()>;
    /// Read a symlink's target without following it.
    fn readlinkat(&self, dir: RawFd, subpath: &str, buf: &mut [u8]) -> Result<usize>;
    /// Create a directory.
    fn mkdirat(&self, dir: RawFd, subpath: &str, mode: u32) -> Result<()>;
    /// Stat a path, optionally without following the final symlink.
    fn fstatat(&self, dir: RawFd, subpath: &str, flags: i32) -> Result<LinuxStat>;
    /// Stat the filesystem containing a path.
    fn statfs(&self, dir: RawFd, subpath: &str) -> Result<LinuxStatfs>;
    /// Change ownership of a path.
    fn fchownat(&self, dir: RawFd, subpath: &str, uid: u32, gid: u32, flags: i32) -> Result<()>;
    /// Change permission bits of a path.
    fn fchmodat(&self, dir: RawFd, subpath: &str, mode: u32, flags: i32) -> Result<()>;
}
