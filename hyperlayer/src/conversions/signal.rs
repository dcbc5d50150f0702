//! Signal-number translation.
//!
//! The host this crate targets already numbers the common signals
//! identically to Linux (`SIGHUP`..`SIGTERM` share numbers 1-15 across
//! Linux and the BSD/Darwin lineage); the realtime range and a handful of
//! numbers above 15 diverge, so the table is still explicit rather than an
//! identity function in disguise.

const MAP: &[(i32, i32)] = &[
    (1, libc::SIGHUP),
    (2, libc::SIGINT),
    (3, libc::SIGQUIT),
    (4, libc::SIGILL),
    (5, libc::SIGTRAP),
    (6, libc::SIGABRT),
    (7, libc::SIGBUS),
    (8, libc::SIGFPE),
    (9, libc::SIGKILL),
    (10, libc::SIGUSR1),
    (11, libc::SIGSEGV),
    (12, libc::SIGUSR2),
    (13, libc::SIGPIPE),
    (14, libc::SIGALRM),
    (15, libc::SIGTERM),
    (17, libc::SIGCHLD),
    (18, libc::SIGCONT),
    (19, libc::SIGSTOP),
    (20, libc::SIGTSTP),
    (21, libc::SIGTTIN),
    (22, libc::SIGTTOU),
];

/// Translate a Linux signal number to the host's numbering.
pub fn linux_to_host(sig: i32) -> Option<i32> {
    MAP.iter().find(|(l, _)| *l == sig).map(|(_, h)| *h)
}

/// Translate a host signal number to its Linux numbering.
pub fn host_to_linux(sig: i32) -> Option<i32> {
    MAP.iter().find(|(_, h)| *h == sig).map(|(l, _)| *l)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_known_signals() {
        for &(linux, _host) in MAP {
            let host = linux_to_host(linux).unwrap();
            assert_eq!(host_to_linux(host), Some(linux));
        }
    }
}
