//! Error taxonomy for the supervisor.
//!
//! Mirrors the five-way split the system draws between guest-programming
//! faults, host-call failures, guest CPU-level faults, internal bugs, and
//! unimplemented functionality. Handlers convert into a raw Linux errno at
//! the syscall boundary via [`syswrap`]; everything above that boundary uses
//! [`Result<T, EmulatorError>`].

use thiserror::Error;

/// Errors raised while resolving or operating on the virtual filesystem.
#[derive(Debug, Error)]
pub enum VfsError {
    /// A path component could not be found.
    #[error("no such file or directory")]
    NotFound,
    /// A path prefix is absent or not a directory.
    #[error("not a directory")]
    NotADirectory,
    /// Symlink resolution exceeded the hop budget.
    #[error("too many levels of symbolic links")]
    LoopLimitExceeded,
    /// The file-descriptor table has no slot at this index.
    #[error("bad file descriptor {0}")]
    BadFd(i32),
    /// A path component was empty.
    #[error("empty path")]
    EmptyPath,
    /// The underlying host filesystem call failed.
    #[error("host filesystem error: {0}")]
    Host(#[source] std::io::Error),
}

/// Errors raised while dispatching or delivering signals.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The signal number is out of range for the supported `sigset`.
    #[error("invalid signal number {0}")]
    InvalidSignal(i32),
    /// No task in the target process could receive the signal.
    #[error("no eligible task for signal delivery")]
    NoEligibleTask,
    /// Marshaling the signal frame onto the guest stack failed.
    #[error("failed to deliver signal frame: {0}")]
    FrameDelivery(#[source] std::io::Error),
}

/// Errors raised by the syscall dispatch layer itself (not individual
/// handler bodies, which report failure as a negative-errno return value).
#[derive(Debug, Error)]
pub enum SyscallError {
    /// The guest's RAX held a number outside the handler table.
    #[error("syscall number {0} out of range")]
    OutOfRange(u64),
    /// The handler table slot exists but has no registered handler.
    #[error("syscall {0} is not implemented")]
    Unimplemented(u64),
    /// A user-space memory crossing (copy_from_user/copy_to_user) failed.
    #[error("fault accessing guest memory at {0:#x}")]
    Fault(u64),
}

/// Errors raised by the hardware-virtualization binding.
#[derive(Debug, Error)]
pub enum VmmError {
    /// Opening or configuring the virtualization device failed.
    #[error("virtualization backend unavailable: {0}")]
    Unavailable(#[source] std::io::Error),
    /// A register or VMCS field read/write failed.
    #[error("register access failed: {0}")]
    RegisterAccess(String),
    /// Guest memory setup failed.
    #[error("guest memory error: {0}")]
    Memory(String),
    /// The VM-entry self-diagnostic found an inconsistent VMCS state.
    #[error("vm-entry self-check failed: {0}")]
    EntryCheckFailed(String),
}

/// Errors raised while manipulating process/task control-block state.
#[derive(Debug, Error)]
pub enum ProcError {
    /// Privilege elevation or restoration failed.
    #[error("privilege switch failed: {0}")]
    Privilege(#[source] std::io::Error),
    /// A futex operation targeted an unknown word.
    #[error("futex operation failed: {0}")]
    Futex(String),
}

/// Top-level error aggregating every subsystem, the way a single crate-wide
/// error type aggregates its sub-errors.
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// VFS-layer failure.
    #[error(transparent)]
    Vfs(#[from] VfsError),
    /// Signal-subsystem failure.
    #[error(transparent)]
    Signal(#[from] SignalError),
    /// Syscall-dispatch failure.
    #[error(transparent)]
    Syscall(#[from] SyscallError),
    /// Hardware-virtualization binding failure.
    #[error(transparent)]
    Vmm(#[from] VmmError),
    /// Process/task control-block failure.
    #[error(transparent)]
    Proc(#[from] ProcError),
    /// Functionality that is intentionally unimplemented.
    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Translate a host `io::Error` into a negative Linux errno, the way every
/// syscall handler must report failure to the guest in RAX.
///
/// Errors of a kind with no raw OS error attached (e.g. `ErrorKind::Other`
/// manufactured in-process) fall back to `-EIO`.
pub fn errno_from_io(err: &std::io::Error) -> i64 {
    match err.raw_os_error() {
        Some(code) => -i64::from(code),
        None => -i64::from(libc::EIO),
    }
}

/// Translate a host `nix::Error` (a bare `Errno`) into a negative Linux
/// errno. `nix` mirrors the host's own errno numbering, which on the hosts
/// this runs on matches Linux's for the common codes; divergent cases are
/// patched by callers before they reach the guest.
pub fn errno_from_nix(err: nix::Error) -> i64 {
    -(err as i64)
}

/// Thin macro translating a `std::io::Result<T>` into the signed
/// Linux-return-value convention used by every syscall handler: a
/// non-negative value on success, `-errno` on failure.
///
/// ```ignore
/// fn sys_close(fd: i32) -> i64 {
///     syswrap!(nix::unistd::close(fd), |()| 0)
/// }
/// ```
#[macro_export]
macro_rules! syswrap {
    ($result:expr) => {
        match $result {
            Ok(value) => value as i64,
            Err(err) => $crate::error::errno_from_io(&err),
        }
    };
    ($result:expr, |$ok:ident| $map:expr) => {
        match $result {
            Ok($ok) => $map,
            Err(err) => $crate::error::errno_from_io(&err),
        }
    };
}

/// Same as [`syswrap!`] for calls returning `Result<T, nix::Error>`.
#[macro_export]
macro_rules! nix_syswrap {
    ($result:expr) => {
        match $result {
            Ok(value) => value as i64,
            Err(err) => $crate::error::errno_from_nix(err),
        }
    };
    ($result:expr, |$ok:ident| $map:expr) => {
        match $result {
            Ok($ok) => $map,
            Err(err) => $crate::error::errno_from_nix(err),
        }
    };
}
