//! Virtual filesystem: the fd table, open-file lifecycle, and the
//! path-resolving syscalls built on top of [`fs_ops::FsOps`].

pub mod fcntl_ops;
pub mod file;
pub mod fs_ops;
pub mod getdents;
pub mod hostfs;
pub mod ioctl_ops;
pub mod path;

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;

use crate::error::{Result, VfsError};

pub use file::OpenFile;
pub use fs_ops::FsOps;

/// Maps guest-visible fds to open files. Guest fds are host fds directly —
/// `vfs_openat` publishes a file at whatever host fd its `openat` call
/// returned, so the table is sparse rather than a dense small-int
/// allocator.
#[derive(Debug, Default)]
pub struct FdTable {
    slots: HashMap<i32, Arc<OpenFile>>,
}

impl FdTable {
    pub fn get(&self, fd: i32) -> Option<Arc<OpenFile>> {
        self.slots.get(&fd).cloned()
    }

    pub fn insert(&mut self, fd: i32, file: Arc<OpenFile>) {
        self.slots.insert(fd, file);
    }

    pub fn remove(&mut self, fd: i32) -> Option<Arc<OpenFile>> {
        self.slots.remove(&fd)
    }

    pub fn contains(&self, fd: i32) -> bool {
        self.slots.contains_key(&fd)
    }
}

/// Acquire the file at `fd` under a shared (read) lock on the table,
/// bumping its reference by cloning the `Arc`.
pub fn vfs_acquire(table: &std::sync::RwLock<FdTable>, fd: i32) -> Result<Arc<OpenFile>> {
    let guard = table.read().expect("fdtab lock poisoned");
    guard.get(fd).ok_or(VfsError::BadFd(fd)).map_err(Into::into)
}

/// Release a previously acquired file. On the last strong reference this
/// drops the `Arc`; `ops.close()` has, per [`vfs_close`], already run at the
/// guest's explicit `close(2)` rather than here — this only reclaims
/// memory, it never re-runs the close operation.
pub fn vfs_release(file: Arc<OpenFile>) {
    drop(file);
}

/// Guest-facing `close(2)`: always invokes the underlying `ops.close()`
/// regardless of how many other acquires are outstanding.
///
/// This is intentional, not an oversight: a file left open across `fork`
/// (e.g. the write end of a pipe inherited by a child) must actually
/// release its host resource the moment any holder of the fd closes it,
/// or a reader blocked on EOF will never see it — the other holders keep a
/// live `Arc` to the now-host-closed object until their own last reference
/// drops, but further I/O through it will surface the close. See
/// DESIGN.md, Open Question (a).
pub fn vfs_close(table: &std::sync::RwLock<FdTable>, fd: i32) -> Result<()> {
    let removed = {
        let mut guard = table.write().expect("fdtab lock poisoned");
        guard.remove(fd)
    };
    match removed {
        Some(file) => {
            let result = file.ops.close();
            drop(file);
            result
        }
        None => Err(VfsError::BadFd(fd).into()),
    }
}

/// `openat`: resolve `path` relative to `dirfd`, delegate to the
/// filesystem's `openat`, then publish the resulting file into the fd
/// table at its own host fd.
pub fn vfs_openat(
    fs: Arc<dyn FsOps>,
    root: RawFd,
    table: &std::sync::RwLock<FdTable>,
    dirfd: Option<RawFd>,
    raw_path: &str,
    flags: i32,
    mode: u32,
) -> Result<i32> {
    let resolve_flags = if flags & libc::O_NOFOLLOW != 0 {
        path::RESOLVE_NOFOLLOW
    } else {
        0
    };
    let resolved = path::resolve(fs, root, dirfd, raw_path, resolve_flags)?;
    let file_ops = resolved.fs.openat(resolved.dir, &resolved.subpath, flags, mode)?;
    let open_file = OpenFile::new(file_ops);
    let fd = open_file
        .ops
        .raw_fd()
        .ok_or(VfsError::Host(std::io::Error::other("backend exposes no host fd")))?;
    table.write().expect("fdtab lock poisoned").insert(fd, open_file);
    Ok(fd)
}

macro_rules! path_syscall {
    ($name:ident, $op:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        /// Resolve then delegate to the filesystem's path-level operation,
        /// releasing nothing extra — path handles own no lock.
        pub fn $name(
            fs: Arc<dyn FsOps>,
            root: RawFd,
            dirfd: Option<RawFd>,
            raw_path: &str,
            resolve_flags: u32,
            $($arg: $ty),*
        ) -> Result<$ret> {
            let resolved = path::resolve(fs, root, dirfd, raw_path, resolve_flags)?;
            resolved.fs.$op(resolved.dir, &resolved.subpath, $($arg),*)
        }
    };
}

path_syscall!(vfs_faccessat, faccessat(mode: i32, flags: i32) -> ());
path_syscall!(vfs_unlinkat, unlinkat(flags: i32) -> ());
path_syscall!(vfs_mkdirat, mkdirat(mode: u32) -> ());
path_syscall!(vfs_fstatat, fstatat(flags: i32) -> file::LinuxStat);
path_syscall!(vfs_statfs, statfs() -> file::LinuxStatfs);

/// `symlinkat`: resolve the destination directory, delegate creation.
pub fn vfs_symlinkat(
    fs: Arc<dyn FsOps>,
    root: RawFd,
    target: &str,
    dirfd: Option<RawFd>,
    raw_path: &str,
) -> Result<()> {
    let resolved = path::resolve(fs, root, dirfd, raw_path, path::RESOLVE_NOFOLLOW)?;
    resolved.fs.symlinkat(target, resolved.dir, &resolved.subpath)
}

/// `readlinkat`: resolve without following the final symlink, then read it.
pub fn vfs_readlinkat(
    fs: Arc<dyn FsOps>,
    root: RawFd,
    dirfd: Option<RawFd>,
    raw_path: &str,
    buf: &mut [u8],
) -> Result<usize> {
    let resolved = path::resolve(fs, root, dirfd, raw_path, path::RESOLVE_NOFOLLOW)?;
    resolved.fs.readlinkat(resolved.dir, &resolved.subpath, buf)
}

/// `fchownat`/`fchmodat` both resolve then delegate with the extra id/mode
/// argument after the flags, so they don't fit the two-argument macro above.
pub fn vfs_fchownat(
    fs: Arc<dyn FsOps>,
    root: RawFd,
    dirfd: Option<RawFd>,
    raw_path: &str,
    uid: u32,
    gid: u32,
    flags: i32,
) -> Result<()> {
    let resolved = path::resolve(fs, root, dirfd, raw_path, 0)?;
    resolved.fs.fchownat(resolved.dir, &resolved.subpath, uid, gid, flags)
}

pub fn vfs_fchmodat(
    fs: Arc<dyn FsOps>,
    root: RawFd,
    dirfd: Option<RawFd>,
    raw_path: &str,
    mode: u32,
    flags: i32,
) -> Result<()> {
    let resolved = path::resolve(fs, root, dirfd, raw_path, 0)?;
    resolved.fs.fchmodat(resolved.dir, &resolved.subpath, mode, flags)
}

/// `renameat`: both sides are resolved independently (no locking needed —
/// path handles are transient and own no lock, as documented on
/// [`path::ResolvedPath`]).
pub fn vfs_renameat(
    fs: Arc<dyn FsOps>,
    root: RawFd,
    old_dirfd: Option<RawFd>,
    old_path: &str,
    new_dirfd: Option<RawFd>,
    new_path: &str,
) -> Result<()> {
    let old = path::resolve(fs.clone(), root, old_dirfd, old_path, path::RESOLVE_NOFOLLOW)?;
    let new = path::resolve(fs, root, new_dirfd, new_path, path::RESOLVE_NOFOLLOW)?;
    old.fs.renameat(old.dir, &old.subpath, new.dir, &new.subpath)
}

/// `linkat`.
pub fn vfs_linkat(
    fs: Arc<dyn FsOps>,
    root: RawFd,
    old_dirfd: Option<RawFd>,
    old_path: &str,
    new_dirfd: Option<RawFd>,
    new_path: &str,
    flags: i32,
) -> Result<()> {
    let resolve_flags = if flags & libc::AT_SYMLINK_FOLLOW == 0 {
        path::RESOLVE_NOFOLLOW
    } else {
        0
    };
    let old = path::resolve(fs.clone(), root, old_dirfd, old_path, resolve_flags)?;
    let new = path::resolve(fs, root, new_dirfd, new_path, path::RESOLVE_NOFOLLOW)?;
    old.fs.linkat(old.dir, &old.subpath, new.dir, &new.subpath, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use file::{FileOps, LinuxStat, LinuxStatfs};

    #[derive(Debug)]
    struct DummyFile(std::sync::atomic::AtomicBool);

    impl FileOps for DummyFile {
        fn readv(&self, _b: &mut [std::io::IoSliceMut<'_>]) -> Result<usize> {
            Ok(0)
        }
        fn writev(&self, _b: &[std::io::IoSlice<'_>]) -> Result<usize> {
            Ok(0)
        }
        fn close(&self) -> Result<()> {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        fn ioctl(&self, _p: &crate::proc::Process, _r: u64, _a: u64) -> Result<i64> {
            Ok(-i64::from(libc::ENOTTY))
        }
        fn lseek(&self, _o: i64, _w: i32) -> Result<i64> {
            Ok(0)
        }
        fn getdents(&self, _b: &mut [u8]) -> Result<usize> {
            Ok(0)
        }
        fn fcntl(&self, _p: &crate::proc::Process, _c: i32, _a: u64) -> Result<i64> {
            Ok(0)
        }
        fn fsync(&self) -> Result<()> {
            Ok(())
        }
        fn fstat(&self) -> Result<LinuxStat> {
            Ok(LinuxStat::default())
        }
        fn fstatfs(&self) -> Result<LinuxStatfs> {
            Ok(LinuxStatfs::default())
        }
        fn fchown(&self, _u: u32, _g: u32) -> Result<()> {
            Ok(())
        }
        fn fchmod(&self, _m: u32) -> Result<()> {
            Ok(())
        }
        fn raw_fd(&self) -> Option<RawFd> {
            None
        }
    }

    fn dummy_table_with(fd: i32) -> std::sync::RwLock<FdTable> {
        let mut table = FdTable::default();
        table.insert(fd, OpenFile::new(Arc::new(DummyFile(std::sync::atomic::AtomicBool::new(false)))));
        std::sync::RwLock::new(table)
    }

    #[test]
    fn vfs_close_is_idempotent_and_returns_ebadf_on_second_call() {
        let table = dummy_table_with(9);
        vfs_close(&table, 9).expect("first close succeeds");
        let second = vfs_close(&table, 9);
        assert!(second.is_err());
        // Other slots are untouched by a close on an already-closed fd.
        assert!(!table.read().unwrap().contains(9));
    }

    #[test]
    fn vfs_close_runs_ops_close_even_with_outstanding_acquire() {
        let table = dummy_table_with(9);
        let file = vfs_acquire(&table, 9).expect("acquire holds a ref");
        vfs_close(&table, 9).expect("close succeeds despite outstanding ref");
        assert!(!table.read().unwrap().contains(9));
        drop(file);
    }

    #[test]
    fn fd_reuse_after_close_and_reopen() {
        let table = dummy_table_with(9);
        vfs_close(&table, 9).unwrap();
        table
            .write()
            .unwrap()
            .insert(9, OpenFile::new(Arc::new(DummyFile(std::sync::atomic::AtomicBool::new(false)))));
        assert!(table.read().unwrap().contains(9));
    }
}
