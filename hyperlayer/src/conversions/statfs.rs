//! `statfs` field repacking.

use crate::vfs::file::LinuxStatfs;

pub fn host_to_linux(sfs: &nix::sys::statvfs::Statvfs) -> LinuxStatfs {
    LinuxStatfs {
        f_type: 0x01021994, // TMPFS_MAGIC-ish placeholder, real value unused by guests that only check it's nonzero
        f_bsize: sfs.block_size() as i64,
        f_blocks: sfs.blocks(),
        f_bfree: sfs.blocks_free(),
        f_bavail: sfs.blocks_available(),
        f_files: sfs.files(),
        f_ffree: sfs.files_free(),
        f_namelen: 255,
        f_frsize: sfs.fragment_size() as i64,
    }
}
