//! The host filesystem backend — the only concrete [`FsOps`] implementation.

use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::Mutex;
use std::sync::Arc;

use nix::fcntl::{self, OFlag};
use nix::sys::stat::{self, Mode};
use nix::unistd;

use crate::error::{Result, VfsError};

use super::file::{FileOps, LinuxStat, LinuxStatfs};
use super::fs_ops::FsOps;

/// A host-backed filesystem rooted at whatever directory the VFS layer
/// hands in as `dir` for each call — `HostFs` itself is stateless.
#[derive(Debug, Default)]
pub struct HostFs;

fn io_err(err: nix::Error) -> crate::error::EmulatorError {
    VfsError::Host(std::io::Error::from_raw_os_error(err as i32)).into()
}

impl FsOps for HostFs {
    fn openat(&self, dir: RawFd, subpath: &str, flags: i32, mode: u32) -> Result<Arc<dyn FileOps>> {
        let oflag = OFlag::from_bits_truncate(flags);
        let dirfd = unsafe { BorrowedFd::borrow_raw(dir) };
        let fd = fcntl::openat(dirfd, subpath, oflag, Mode::from_bits_truncate(mode)).map_err(io_err)?;
        Ok(Arc::new(HostFile::new(fd)))
    }

    fn symlinkat(&self, target: &str, dir: RawFd, subpath: &str) -> Result<()> {
        let dirfd = unsafe { BorrowedFd::borrow_raw(dir) };
        unistd::symlinkat(target, Some(dirfd), subpath).map_err(io_err)
    }

    fn faccessat(&self, dir: RawFd, subpath: &str, mode: i32, flags: i32) -> Result<()> {
        let dirfd = unsafe { BorrowedFd::borrow_raw(dir) };
        let amode = unistd::AccessFlags::from_bits_truncate(mode);
        let atflags = fcntl::AtFlags::from_bits_truncate(flags);
        unistd::faccessat(Some(dirfd), subpath, amode, atflags).map_err(io_err)
    }

    fn renameat(&self, old_dir: RawFd, old_path: &str, new_dir: RawFd, new_path: &str) -> Result<()> {
        let old_dirfd = unsafe { BorrowedFd::borrow_raw(old_dir) };
        let new_dirfd = unsafe { BorrowedFd::borrow_raw(new_dir) };
        fcntl::renameat(Some(old_dirfd), old_path, Some(new_dirfd), new_path).map_err(io_err)
    }

    fn linkat(&self, old_dir: RawFd, old_path: &str, new_dir: RawFd, new_path: &str, flags: i32) -> Result<()> {
        let old_dirfd = unsafe { BorrowedFd::borrow_raw(old_dir) };
        let new_dirfd = unsafe { BorrowedFd::borrow_raw(new_dir) };
        let atflags = fcntl::AtFlags::from_bits_truncate(flags);
        unistd::linkat(Some(old_dirfd), old_path, Some(new_dirfd), new_path, atflags).map_err(io_err)
    }

    fn unlinkat(&self, dir: RawFd, subpath: &str, flags: i32) -> Result<()> {
        let dirfd = unsafe { BorrowedFd::borrow_raw(dir) };
        let kind = if flags & libc::AT_REMOVEDIR != 0 {
            unistd::UnlinkatFlags::RemoveDir
        } else {
            unistd::UnlinkatFlags::NoRemoveDir
        };
        unistd::unlinkat(Some(dirfd), subpath, kind).map_err(io_err)
    }

    fn readlinkat(&self, dir: RawFd, subpath: &str, buf: &mut [u8]) -> Result<usize> {
        // The guest-facing `readlink` syscall copies the whole buffer back
        // regardless of the actual link length — preserved intentionally,
        // see DESIGN.md.
        let dirfd = unsafe { BorrowedFd::borrow_raw(dir) };
        let target = fcntl::readlinkat(dirfd, subpath).map_err(io_err)?;
        let bytes = target.as_bytes();
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn mkdirat(&self, dir: RawFd, subpath: &str, mode: u32) -> Result<()> {
        let dirfd = unsafe { BorrowedFd::borrow_raw(dir) };
        stat::mkdirat(Some(dirfd), subpath, Mode::from_bits_truncate(mode)).map_err(io_err)
    }

    fn fstatat(&self, dir: RawFd, subpath: &str, flags: i32) -> Result<LinuxStat> {
        let dirfd = unsafe { BorrowedFd::borrow_raw(dir) };
        let atflags = fcntl::AtFlags::from_bits_truncate(flags);
        let st = stat::fstatat(Some(dirfd), subpath, atflags).map_err(io_err)?;
        Ok(crate::conversions::stat::host_to_linux(&st))
    }

    fn statfs(&self, dir: RawFd, subpath: &str) -> Result<LinuxStatfs> {
        let path = resolve_for_statfs(dir, subpath)?;
        let sfs = nix::sys::statvfs::statvfs(&path).map_err(io_err)?;
        Ok(crate::conversions::statfs::host_to_linux(&sfs))
    }

    fn fchownat(&self, dir: RawFd, subpath: &str, uid: u32, gid: u32, flags: i32) -> Result<()> {
        let dirfd = unsafe { BorrowedFd::borrow_raw(dir) };
        let atflags = fcntl::AtFlags::from_bits_truncate(flags);
        unistd::fchownat(
            Some(dirfd),
            subpath,
            Some(unistd::Uid::from_raw(uid)),
            Some(unistd::Gid::from_raw(gid)),
            atflags,
        )
        .map_err(io_err)
    }

    fn fchmodat(&self, dir: RawFd, subpath: &str, mode: u32, flags: i32) -> Result<()> {
        let dirfd = unsafe { BorrowedFd::borrow_raw(dir) };
        let nofollow = fcntl::AtFlags::from_bits_truncate(flags).contains(fcntl::AtFlags::AT_SYMLINK_NOFOLLOW);
        let atflags = if nofollow {
            stat::FchmodatFlags::NoFollowSymlink
        } else {
            stat::FchmodatFlags::FollowSymlink
        };
        stat::fchmodat(Some(dirfd), subpath, Mode::from_bits_truncate(mode), atflags).map_err(io_err)
    }
}

fn resolve_for_statfs(dir: RawFd, subpath: &str) -> Result<std::path::PathBuf> {
    // `statvfs` has no `*at` form; resolve via `/proc/self/fd` the way
    // other host-indirection layers do when they need an absolute path
    // from a directory fd plus a relative subpath.
    let dir_path =
        std::fs::read_link(format!("/proc/self/fd/{dir}")).map_err(VfsError::Host)?;
    Ok(dir_path.join(subpath))
}

/// A host-backed open file: a thin wrapper around a host fd plus the
/// twelve-operation vtable.
#[derive(Debug)]
pub struct HostFile {
    fd: Mutex<Option<OwnedFd>>,
}

impl HostFile {
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            fd: Mutex::new(Some(fd)),
        }
    }

    fn with_fd<T>(&self, f: impl FnOnce(BorrowedFd<'_>) -> Result<T>) -> Result<T> {
        let guard = self.fd.lock().expect("host file mutex poisoned");
        match guard.as_ref() {
            Some(fd) => f(fd.as_fd()),
            None => Err(VfsError::BadFd(-1).into()),
        }
    }
}

use std::os::fd::AsFd;

impl FileOps for HostFile {
    fn readv(&self, bufs: &mut [std::io::IoSliceMut<'_>]) -> Result<usize> {
        self.with_fd(|fd| unistd::readv(fd, bufs).map_err(io_err))
    }

    fn writev(&self, bufs: &[std::io::IoSlice<'_>]) -> Result<usize> {
        self.with_fd(|fd| unistd::writev(fd, bufs).map_err(io_err))
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.fd.lock().expect("host file mutex poisoned");
        if let Some(fd) = guard.take() {
            drop(fd); // OwnedFd's Drop calls close(2).
        }
        Ok(())
    }

    fn ioctl(&self, proc: &crate::proc::Process, request: u64, arg: u64) -> Result<i64> {
        self.with_fd(|fd| crate::vfs::ioctl_ops::dispatch(proc, fd.as_raw_fd(), request, arg))
    }

    fn lseek(&self, offset: i64, whence: i32) -> Result<i64> {
        self.with_fd(|fd| {
            let whence = match whence {
                0 => unistd::Whence::SeekSet,
                1 => unistd::Whence::SeekCur,
                2 => unistd::Whence::SeekEnd,
                _ => unistd::Whence::SeekSet,
            };
            unistd::lseek(fd.as_raw_fd(), offset, whence).map_err(io_err)
        })
    }

    fn getdents(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_fd(|fd| crate::vfs::getdents::fill(fd.as_raw_fd(), buf))
    }

    fn fcntl(&self, proc: &crate::proc::Process, cmd: i32, arg: u64) -> Result<i64> {
        self.with_fd(|fd| crate::vfs::fcntl_ops::dispatch(proc, fd.as_raw_fd(), cmd, arg))
    }

    fn fsync(&self) -> Result<()> {
        self.with_fd(|fd| unistd::fsync(fd).map_err(io_err))
    }

    fn fstat(&self) -> Result<LinuxStat> {
        self.with_fd(|fd| {
            stat::fstat(fd.as_raw_fd())
                .map(|st| crate::conversions::stat::host_to_linux(&st))
                .map_err(io_err)
        })
    }

    fn fstatfs(&self) -> Result<LinuxStatfs> {
        self.with_fd(|fd| {
            let path = format!("/proc/self/fd/{}", fd.as_raw_fd());
            nix::sys::statvfs::statvfs(path.as_str())
                .map(|s| crate::conversions::statfs::host_to_linux(&s))
                .map_err(io_err)
        })
    }

    fn fchown(&self, uid: u32, gid: u32) -> Result<()> {
        self.with_fd(|fd| {
            unistd::fchown(fd, Some(unistd::Uid::from_raw(uid)), Some(unistd::Gid::from_raw(gid)))
                .map_err(io_err)
        })
    }

    fn fchmod(&self, mode: u32) -> Result<()> {
        self.with_fd(|fd| stat::fchmod(fd, Mode::from_bits_truncate(mode)).map_err(io_err))
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.fd
            .lock()
            .expect("host file mutex poisoned")
            .as_ref()
            .map(|f| f.as_raw_fd())
    }
}
