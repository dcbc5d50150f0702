//! Linux `struct termios` <-> host `nix::sys::termios::Termios`.
//!
//! Pure struct repacking: callers cross the guest-memory boundary
//! themselves via `syscall::uaccess`'s `copy_struct_from_user`/
//! `copy_struct_to_user` and hand this module already-materialized structs.

#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct LinuxTermios {
    c_iflag: u32,
    c_oflag: u32,
    c_cflag: u32,
    c_lflag: u32,
    c_line: u8,
    c_cc: [u8; 32],
    c_ispeed: u32,
    c_ospeed: u32,
}

pub(crate) fn termios_to_linux(t: &nix::sys::termios::Termios) -> LinuxTermios {
    let raw: &libc::termios = t.as_ref();
    let mut out = LinuxTermios {
        c_iflag: raw.c_iflag as u32,
        c_oflag: raw.c_oflag as u32,
        c_cflag: raw.c_cflag as u32,
        c_lflag: raw.c_lflag as u32,
        c_line: raw.c_line as u8,
        c_cc: [0; 32],
        c_ispeed: unsafe { libc::cfgetispeed(raw) as u32 },
        c_ospeed: unsafe { libc::cfgetospeed(raw) as u32 },
    };
    for (i, b) in raw.c_cc.iter().take(32).enumerate() {
        out.c_cc[i] = *b as u8;
    }
    out
}

pub(crate) fn linux_to_termios(linux: LinuxTermios) -> nix::sys::termios::Termios {
    let mut raw: libc::termios = unsafe { std::mem::zeroed() };
    raw.c_iflag = linux.c_iflag as libc::tcflag_t;
    raw.c_oflag = linux.c_oflag as libc::tcflag_t;
    raw.c_cflag = linux.c_cflag as libc::tcflag_t;
    raw.c_lflag = linux.c_lflag as libc::tcflag_t;
    raw.c_line = linux.c_line as libc::cc_t;
    for (i, b) in linux.c_cc.iter().enumerate().take(raw.c_cc.len()) {
        raw.c_cc[i] = *b as libc::cc_t;
    }
    unsafe {
        libc::cfsetispeed(&mut raw, linux.c_ispeed as libc::speed_t);
        libc::cfsetospeed(&mut raw, linux.c_ospeed as libc::speed_t);
    }
    nix::sys::termios::Termios::from(raw)
}
