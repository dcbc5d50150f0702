//! `fcntl` commands that operate on a single open file (as opposed to the
//! fd-table-wide `F_DUPFD`/`F_GETFD`/`F_SETFD`, which the fd table itself
//! handles since they mutate table slots rather than file state).

use std::os::fd::{BorrowedFd, RawFd};

use nix::fcntl::{self, FcntlArg, OFlag};

use crate::error::Result;
use crate::proc::Process;
use crate::syscall::uaccess::{copy_struct_from_user, copy_struct_to_user};

const F_GETFL: i32 = 3;
const F_SETFL: i32 = 4;
const F_GETLK: i32 = 5;
const F_SETLK: i32 = 6;
const F_SETLKW: i32 = 7;

pub fn dispatch(proc: &Process, fd: RawFd, cmd: i32, arg: u64) -> Result<i64> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    match cmd {
        F_GETFL => match fcntl::fcntl(borrowed, FcntlArg::F_GETFL) {
            Ok(flags) => Ok(i64::from(crate::conversions::flags::host_to_linux_oflags(flags))),
            Err(e) => Ok(crate::error::errno_from_nix(e)),
        },
        F_SETFL => {
            let linux_flags = arg as i32;
            let host_flags = crate::conversions::flags::linux_to_host_oflags(linux_flags)?;
            match fcntl::fcntl(borrowed, FcntlArg::F_SETFL(OFlag::from_bits_truncate(host_flags))) {
                Ok(r) => Ok(i64::from(r)),
                Err(e) => Ok(crate::error::errno_from_nix(e)),
            }
        }
        F_GETLK => {
            // The guest fills in `l_type`/`l_whence`/`l_start`/`l_len` and
            // the host fills in `l_pid` on return, so this one needs both
            // directions.
            let mut lock: libc::flock = copy_struct_from_user(proc, arg)?;
            let rc = unsafe { libc::fcntl(fd, cmd, std::ptr::addr_of_mut!(lock)) };
            if rc < 0 {
                Ok(-i64::from(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)))
            } else {
                copy_struct_to_user(proc, arg, &lock)?;
                Ok(i64::from(rc))
            }
        }
        F_SETLK | F_SETLKW => {
            let lock: libc::flock = copy_struct_from_user(proc, arg)?;
            let rc = unsafe { libc::fcntl(fd, cmd, std::ptr::addr_of!(lock)) };
            if rc < 0 {
                Ok(-i64::from(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)))
            } else {
                Ok(i64::from(rc))
            }
        }
        _ => Ok(-i64::from(libc::EINVAL)),
    }
}
