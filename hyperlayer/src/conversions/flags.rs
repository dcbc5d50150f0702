//! Linux `open(2)`/`fcntl(2)` flag <-> host flag translation.
//!
//! Bidirectional: guests hand us Linux-numbered flags, the host filesystem
//! wants its own numbering. Flags the host platform lacks an equivalent for
//! are dropped only where Linux itself treats them as a no-op; anything
//! else unrecognized on the way *in* (from the guest) is rejected with
//! `-EINVAL`, matching what real Linux documents for unknown `open` flags.

use crate::error::Result;

const LINUX_O_RDONLY: i32 = 0o0;
const LINUX_O_WRONLY: i32 = 0o1;
const LINUX_O_RDWR: i32 = 0o2;
const LINUX_O_CREAT: i32 = 0o100;
const LINUX_O_EXCL: i32 = 0o200;
const LINUX_O_NOCTTY: i32 = 0o400;
const LINUX_O_TRUNC: i32 = 0o1000;
const LINUX_O_APPEND: i32 = 0o2000;
const LINUX_O_NONBLOCK: i32 = 0o4000;
const LINUX_O_DIRECTORY: i32 = 0o200000;
const LINUX_O_NOFOLLOW: i32 = 0o400000;
const LINUX_O_CLOEXEC: i32 = 0o2000000;
const LINUX_O_SYNC: i32 = 0o4010000;

const SUPPORTED_LINUX_FLAGS: i32 = LINUX_O_RDONLY
    | LINUX_O_WRONLY
    | LINUX_O_RDWR
    | LINUX_O_CREAT
    | LINUX_O_EXCL
    | LINUX_O_NOCTTY
    | LINUX_O_TRUNC
    | LINUX_O_APPEND
    | LINUX_O_NONBLOCK
    | LINUX_O_DIRECTORY
    | LINUX_O_NOFOLLOW
    | LINUX_O_CLOEXEC
    | LINUX_O_SYNC;

/// Translate Linux-numbered `open` flags into the host's `O_*` bits.
/// Any bit outside [`SUPPORTED_LINUX_FLAGS`] is rejected with `-EINVAL`.
pub fn linux_to_host_oflags(flags: i32) -> Result<i32> {
    if flags & !SUPPORTED_LINUX_FLAGS != 0 {
        return Err(crate::error::EmulatorError::Unimplemented("unsupported open flag bits"));
    }
    let mut host = 0;
    host |= match flags & 0o3 {
        LINUX_O_WRONLY => libc::O_WRONLY,
        LINUX_O_RDWR => libc::O_RDWR,
        _ => libc::O_RDONLY,
    };
    if flags & LINUX_O_CREAT != 0 {
        host |= libc::O_CREAT;
    }
    if flags & LINUX_O_EXCL != 0 {
        host |= libc::O_EXCL;
    }
    if flags & LINUX_O_NOCTTY != 0 {
        host |= libc::O_NOCTTY;
    }
    if flags & LINUX_O_TRUNC != 0 {
        host |= libc::O_TRUNC;
    }
    if flags & LINUX_O_APPEND != 0 {
        host |= libc::O_APPEND;
    }
    if flags & LINUX_O_NONBLOCK != 0 {
        host |= libc::O_NONBLOCK;
    }
    if flags & LINUX_O_DIRECTORY != 0 {
        host |= libc::O_DIRECTORY;
    }
    if flags & LINUX_O_NOFOLLOW != 0 {
        host |= libc::O_NOFOLLOW;
    }
    if flags & LINUX_O_CLOEXEC != 0 {
        host |= libc::O_CLOEXEC;
    }
    if flags & LINUX_O_SYNC != 0 {
        host |= libc::O_SYNC;
    }
    Ok(host)
}

/// Translate host `O_*` bits back into Linux-numbered flags, the inverse of
/// [`linux_to_host_oflags`] restricted to the subset both sides support.
pub fn host_to_linux_oflags(host: i32) -> i32 {
    let mut linux = match host & libc::O_ACCMODE {
        libc::O_WRONLY => LINUX_O_WRONLY,
        libc::O_RDWR => LINUX_O_RDWR,
        _ => LINUX_O_RDONLY,
    };
    if host & libc::O_CREAT != 0 {
        linux |= LINUX_O_CREAT;
    }
    if host & libc::O_EXCL != 0 {
        linux |= LINUX_O_EXCL;
    }
    if host & libc::O_NOCTTY != 0 {
        linux |= LINUX_O_NOCTTY;
    }
    if host & libc::O_TRUNC != 0 {
        linux |= LINUX_O_TRUNC;
    }
    if host & libc::O_APPEND != 0 {
        linux |= LINUX_O_APPEND;
    }
    if host & libc::O_NONBLOCK != 0 {
        linux |= LINUX_O_NONBLOCK;
    }
    if host & libc::O_DIRECTORY != 0 {
        linux |= LINUX_O_DIRECTORY;
    }
    if host & libc::O_NOFOLLOW != 0 {
        linux |= LINUX_O_NOFOLLOW;
    }
    if host & libc::O_CLOEXEC != 0 {
        linux |= LINUX_O_CLOEXEC;
    }
    if host & libc::O_SYNC != 0 {
        linux |= LINUX_O_SYNC;
    }
    linux
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_identity_on_supported_subset() {
        let cases = [
            LINUX_O_RDONLY,
            LINUX_O_WRONLY | LINUX_O_CREAT | LINUX_O_EXCL,
            LINUX_O_RDWR | LINUX_O_APPEND | LINUX_O_NONBLOCK,
            LINUX_O_RDONLY | LINUX_O_DIRECTORY | LINUX_O_CLOEXEC,
        ];
        for flags in cases {
            let host = linux_to_host_oflags(flags).expect("supported flag set");
            assert_eq!(host_to_linux_oflags(host), flags);
        }
    }

    #[test]
    fn unsupported_flag_bit_is_rejected() {
        let bogus = 1 << 28;
        assert!(linux_to_host_oflags(bogus).is_err());
    }
}
