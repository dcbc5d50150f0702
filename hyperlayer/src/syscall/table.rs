//! The syscall dispatch table: a flat array indexed by Linux syscall
//! number, built once via [`syscall_table!`].

use super::context::SyscallContext;

/// Ceiling on guest RAX values the table can hold. Linux x86-64 numbers
/// the syscalls this crate implements well under this.
pub const MAX_SYSCALLS: usize = 512;

pub type SyscallHandler = fn(&SyscallContext) -> i64;

/// Declaratively register `(number, handler)` pairs into a
/// `[Option<SyscallHandler>; MAX_SYSCALLS]`, the idiomatic-Rust
/// reexpression of the original table-of-macro-calls registration style.
#[macro_export]
macro_rules! syscall_table {
    ($($num:expr => $handler:path),* $(,)?) => {{
        let mut table: [Option<$crate::syscall::table::SyscallHandler>; $crate::syscall::table::MAX_SYSCALLS] =
            [None; $crate::syscall::table::MAX_SYSCALLS];
        $(
            table[$num as usize] = Some($handler);
        )*
        table
    }};
}

/// Build the default handler table covering the representative family
/// members this crate implements end to end.
pub fn build_table() -> [Option<SyscallHandler>; MAX_SYSCALLS] {
    use super::numbers::*;
    use super::{fs as h_fs, misc as h_misc, process as h_process, signal as h_signal};

    syscall_table! {
        SYS_READ => h_fs::sys_read,
        SYS_WRITE => h_fs::sys_write,
        SYS_OPEN => h_fs::sys_open,
        SYS_OPENAT => h_fs::sys_openat,
        SYS_CLOSE => h_fs::sys_close,
        SYS_STAT => h_fs::sys_stat,
        SYS_LSTAT => h_fs::sys_lstat,
        SYS_FSTAT => h_fs::sys_fstat,
        SYS_LSEEK => h_fs::sys_lseek,
        SYS_IOCTL => h_fs::sys_ioctl,
        SYS_READV => h_fs::sys_readv,
        SYS_WRITEV => h_fs::sys_writev,
        SYS_ACCESS => h_fs::sys_access,
        SYS_FACCESSAT => h_fs::sys_faccessat,
        SYS_PIPE => h_fs::sys_pipe,
        SYS_PIPE2 => h_fs::sys_pipe2,
        SYS_DUP => h_fs::sys_dup,
        SYS_DUP2 => h_fs::sys_dup2,
        SYS_DUP3 => h_fs::sys_dup3,
        SYS_FCNTL => h_fs::sys_fcntl,
        SYS_FSYNC => h_fs::sys_fsync,
        SYS_GETCWD => h_fs::sys_getcwd,
        SYS_CHDIR => h_fs::sys_chdir,
        SYS_FCHDIR => h_fs::sys_fchdir,
        SYS_RENAME => h_fs::sys_rename,
        SYS_RENAMEAT => h_fs::sys_renameat,
        SYS_MKDIR => h_fs::sys_mkdir,
        SYS_MKDIRAT => h_fs::sys_mkdirat,
        SYS_RMDIR => h_fs::sys_rmdir,
        SYS_LINK => h_fs::sys_link,
        SYS_LINKAT => h_fs::sys_linkat,
        SYS_UNLINK => h_fs::sys_unlink,
        SYS_UNLINKAT => h_fs::sys_unlinkat,
        SYS_SYMLINK => h_fs::sys_symlink,
        SYS_SYMLINKAT => h_fs::sys_symlinkat,
        SYS_READLINK => h_fs::sys_readlink,
        SYS_READLINKAT => h_fs::sys_readlinkat,
        SYS_CHMOD => h_fs::sys_chmod,
        SYS_FCHMOD => h_fs::sys_fchmod,
        SYS_FCHMODAT => h_fs::sys_fchmodat,
        SYS_CHOWN => h_fs::sys_chown,
        SYS_FCHOWN => h_fs::sys_fchown,
        SYS_LCHOWN => h_fs::sys_lchown,
        SYS_FCHOWNAT => h_fs::sys_fchownat,
        SYS_UMASK => h_fs::sys_umask,
        SYS_STATFS => h_fs::sys_statfs,
        SYS_GETDENTS64 => h_fs::sys_getdents64,
        SYS_CHROOT => h_fs::sys_chroot,

        SYS_GETPID => h_process::sys_getpid,
        SYS_GETPPID => h_process::sys_getppid,
        SYS_GETTID => h_process::sys_gettid,
        SYS_GETUID => h_process::sys_getuid,
        SYS_GETEUID => h_process::sys_geteuid,
        SYS_GETGID => h_process::sys_getgid,
        SYS_GETEGID => h_process::sys_getegid,
        SYS_UNAME => h_process::sys_uname,
        SYS_BRK => h_process::sys_brk,
        SYS_MMAP => h_process::sys_mmap,
        SYS_MUNMAP => h_process::sys_munmap,
        SYS_MPROTECT => h_process::sys_mprotect,
        SYS_EXIT => h_process::sys_exit,
        SYS_EXIT_GROUP => h_process::sys_exit_group,
        SYS_SCHED_YIELD => h_process::sys_sched_yield,
        SYS_FUTEX => h_process::sys_futex,
        SYS_PRCTL => h_process::sys_prctl,

        SYS_GETTIMEOFDAY => h_misc::sys_gettimeofday,
        SYS_TIME => h_misc::sys_time,
        SYS_CLOCK_GETTIME => h_misc::sys_clock_gettime,
        SYS_GETCPU => h_misc::sys_getcpu,

        SYS_RT_SIGACTION => h_signal::sys_rt_sigaction,
        SYS_RT_SIGPROCMASK => h_signal::sys_rt_sigprocmask,
        SYS_RT_SIGRETURN => h_signal::sys_rt_sigreturn,
        SYS_RT_SIGSUSPEND => h_signal::sys_rt_sigsuspend,
    }
}
