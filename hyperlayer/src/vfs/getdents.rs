//! Linux `getdents64` directory-entry packing.
//!
//! The host fd is `dup`'d before streaming entries so the caller's
//! directory-stream position (as observed through repeated `getdents`
//! calls on the same fd) is never perturbed by our own iteration.

use std::os::fd::{IntoRawFd, OwnedFd, RawFd};

use crate::error::Result;

#[repr(C)]
struct LinuxDirent64Header {
    d_ino: u64,
    d_off: i64,
    d_reclen: u16,
    d_type: u8,
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

pub fn fill(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    let dup_fd: OwnedFd = nix::unistd::dup(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) })
        .map_err(|e| crate::error::VfsError::Host(std::io::Error::from_raw_os_error(e as i32)))?;
    let mut dir = unsafe { nix::dir::Dir::from_fd(dup_fd.into_raw_fd()) }
        .map_err(|e| crate::error::VfsError::Host(std::io::Error::from_raw_os_error(e as i32)))?;

    let mut written = 0usize;
    for entry in dir.iter() {
        let entry = entry.map_err(|e| crate::error::VfsError::Host(std::io::Error::from_raw_os_error(e as i32)))?;
        let name = entry.file_name().to_bytes();
        let header_len = std::mem::size_of::<LinuxDirent64Header>();
        // name + NUL + 1 byte of d_type tacked on after, 8-byte aligned.
        let reclen = align8(header_len + name.len() + 1 + 1);
        if written + reclen > buf.len() {
            break;
        }
        let header = LinuxDirent64Header {
            d_ino: entry.ino(),
            d_off: 0,
            d_reclen: reclen as u16,
            d_type: file_type_byte(entry.file_type()),
        };
        let dst = &mut buf[written..written + reclen];
        dst.fill(0);
        let header_bytes = unsafe {
            std::slice::from_raw_parts(
                (&header as *const LinuxDirent64Header).cast::<u8>(),
                header_len,
            )
        };
        dst[..header_len].copy_from_slice(header_bytes);
        dst[header_len..header_len + name.len()].copy_from_slice(name);
        // Final byte of the record duplicates d_type, as Linux's packed
        // layout places it after the name+NUL padding.
        dst[reclen - 1] = header.d_type;
        written += reclen;
    }
    Ok(written)
}

fn file_type_byte(ft: Option<nix::dir::Type>) -> u8 {
    match ft {
        Some(nix::dir::Type::Fifo) => libc::DT_FIFO,
        Some(nix::dir::Type::CharacterDevice) => libc::DT_CHR,
        Some(nix::dir::Type::Directory) => libc::DT_DIR,
        Some(nix::dir::Type::BlockDevice) => libc::DT_BLK,
        Some(nix::dir::Type::File) => libc::DT_REG,
        Some(nix::dir::Type::Symlink) => libc::DT_LNK,
        Some(nix::dir::Type::Socket) => libc::DT_SOCK,
        None => libc::DT_UNKNOWN,
    }
}
