//! `ioctl` translation for terminal devices.
//!
//! Only the requests the guest actually exercises (termios get/set, window
//! size, process-group, line discipline flush, close-on-exec) are
//! translated; anything else recognized as a terminal ioctl but not
//! implemented here returns `-ENOTTY` (a documented no-op), and anything not
//! recognized at all returns `-EPERM`.

use std::os::fd::RawFd;

use crate::conversions::{termios, winsize};
use crate::error::Result;
use crate::proc::Process;
use crate::syscall::uaccess::{copy_struct_from_user, copy_struct_to_user};

// Linux ioctl request numbers for the requests we translate.
const TCGETS: u64 = 0x5401;
const TCSETS: u64 = 0x5402;
const TCSETSW: u64 = 0x5403;
const TCFLSH: u64 = 0x540B;
const TIOCGPGRP: u64 = 0x540F;
const TIOCSPGRP: u64 = 0x5410;
const TIOCGWINSZ: u64 = 0x5413;
const TIOCSWINSZ: u64 = 0x5414;
const FIOCLEX: u64 = 0x5451;

pub fn dispatch(proc: &Process, fd: RawFd, request: u64, arg: u64) -> Result<i64> {
    match request {
        TCGETS => {
            let termios = nix::sys::termios::tcgetattr(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) });
            match termios {
                Ok(t) => {
                    let linux = termios::termios_to_linux(&t);
                    copy_struct_to_user(proc, arg, &linux)?;
                    Ok(0)
                }
                Err(e) => Ok(crate::error::errno_from_nix(e)),
            }
        }
        TCSETS | TCSETSW => {
            let linux = copy_struct_from_user(proc, arg)?;
            let t = termios::linux_to_termios(linux);
            let action = if request == TCSETSW {
                nix::sys::termios::SetArg::TCSADRAIN
            } else {
                nix::sys::termios::SetArg::TCSANOW
            };
            let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
            Ok(nix_syswrap_unit(nix::sys::termios::tcsetattr(borrowed, action, &t)))
        }
        TCFLSH => {
            let queue = match arg {
                0 => nix::sys::termios::FlushArg::TCIFLUSH,
                1 => nix::sys::termios::FlushArg::TCOFLUSH,
                _ => nix::sys::termios::FlushArg::TCIOFLUSH,
            };
            let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
            Ok(nix_syswrap_unit(nix::sys::termios::tcflush(borrowed, queue)))
        }
        TIOCGPGRP => {
            let pgrp = unsafe { libc::tcgetpgrp(fd) };
            if pgrp < 0 {
                Ok(-i64::from(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)))
            } else {
                copy_struct_to_user(proc, arg, &pgrp)?;
                Ok(0)
            }
        }
        TIOCSPGRP => {
            let pgrp: i32 = copy_struct_from_user(proc, arg)?;
            let rc = unsafe { libc::tcsetpgrp(fd, pgrp) };
            if rc < 0 {
                Ok(-i64::from(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)))
            } else {
                Ok(0)
            }
        }
        TIOCGWINSZ => {
            let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
            let rc = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, std::ptr::addr_of_mut!(ws)) };
            if rc < 0 {
                Ok(-i64::from(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)))
            } else {
                let linux = winsize::winsize_to_linux(&ws);
                copy_struct_to_user(proc, arg, &linux)?;
                Ok(0)
            }
        }
        TIOCSWINSZ => {
            let linux = copy_struct_from_user(proc, arg)?;
            let ws = winsize::linux_to_winsize(linux);
            let rc = unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, std::ptr::addr_of!(ws)) };
            if rc < 0 {
                Ok(-i64::from(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)))
            } else {
                Ok(0)
            }
        }
        FIOCLEX => {
            let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
            Ok(nix_syswrap_unit(nix::fcntl::fcntl(
                borrowed,
                nix::fcntl::FcntlArg::F_SETFD(nix::fcntl::FdFlag::FD_CLOEXEC),
            )
            .map(|_| ())))
        }
        // Recognized terminal-control range but not one we translate: a
        // documented no-op.
        0x5400..=0x54FF => Ok(-i64::from(libc::ENOTTY)),
        _ => Ok(-i64::from(libc::EPERM)),
    }
}

fn nix_syswrap_unit(result: std::result::Result<(), nix::Error>) -> i64 {
    match result {
        Ok(()) => 0,
        Err(e) => crate::error::errno_from_nix(e),
    }
}
