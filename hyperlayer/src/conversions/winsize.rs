//! Linux `struct winsize` <-> host `libc::winsize`.
//!
//! The two layouts are identical (four `u16` fields); this module exists so
//! every guest-memory touch point goes through a named conversion, not a
//! raw cast scattered at call sites. Callers cross the guest-memory
//! boundary themselves via `syscall::uaccess`'s `copy_struct_from_user`/
//! `copy_struct_to_user`.

#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct LinuxWinsize {
    ws_row: u16,
    ws_col: u16,
    ws_xpixel: u16,
    ws_ypixel: u16,
}

pub(crate) fn winsize_to_linux(ws: &libc::winsize) -> LinuxWinsize {
    LinuxWinsize {
        ws_row: ws.ws_row,
        ws_col: ws.ws_col,
        ws_xpixel: ws.ws_xpixel,
        ws_ypixel: ws.ws_ypixel,
    }
}

pub(crate) fn linux_to_winsize(linux: LinuxWinsize) -> libc::winsize {
    libc::winsize {
        ws_row: linux.ws_row,
        ws_col: linux.ws_col,
        ws_xpixel: linux.ws_xpixel,
        ws_ypixel: linux.ws_ypixel,
    }
}
