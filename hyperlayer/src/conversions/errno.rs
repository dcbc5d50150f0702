//! Host errno <-> Linux errno translation.
//!
//! The common POSIX codes (`ENOENT`, `EACCES`, `EBADF`, ...) share numbers
//! between Linux and the host this crate targets; this table exists for the
//! minority that do not, so `syswrap!` never has to special-case a handler.

const MAP: &[(i32, i32)] = &[
    (libc::EDEADLK, 35),
    (libc::ENAMETOOLONG, 36),
    (libc::ENOLCK, 37),
    (libc::ENOSYS, 38),
    (libc::ENOTEMPTY, 39),
    (libc::ELOOP, 40),
];

/// Translate a host errno value into its Linux equivalent. Codes not in the
/// divergence table are assumed identical, which holds for the common
/// POSIX.1 codes on this host.
pub fn host_to_linux(errno: i32) -> i32 {
    MAP.iter().find(|(h, _)| *h == errno).map_or(errno, |(_, l)| *l)
}
