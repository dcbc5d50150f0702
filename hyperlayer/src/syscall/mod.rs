//! Syscall translation: the dispatch table and every handler body it
//! indexes into.

pub mod context;
pub mod fs;
pub mod misc;
pub mod numbers;
pub mod process;
pub mod signal;
pub mod table;
pub mod uaccess;

pub use context::SyscallContext;
pub use table::{build_table, SyscallHandler, MAX_SYSCALLS};

use crate::error::{Result, SyscallError};

/// Look up and invoke the handler for `nr`, translating an out-of-range or
/// unregistered number into the same negative-errno convention handler
/// bodies use for their own failures.
pub fn dispatch(table: &[Option<SyscallHandler>; MAX_SYSCALLS], nr: u64, ctx: &SyscallContext) -> Result<i64> {
    if nr as usize >= MAX_SYSCALLS {
        return Err(SyscallError::OutOfRange(nr).into());
    }
    match table[nr as usize] {
        Some(handler) => Ok(handler(ctx)),
        None => Err(SyscallError::Unimplemented(nr).into()),
    }
}
