//! Everything a syscall handler needs, bundled so the table's function
//! pointers take one argument instead of threading `Process`/`Task`
//! separately through every handler.

use std::sync::Arc;

use crate::proc::Process;
use crate::task::Task;

pub struct SyscallContext<'a> {
    pub proc: &'a Process,
    pub task: &'a Arc<Task>,
    pub args: [u64; 6],
}

impl<'a> SyscallContext<'a> {
    pub fn arg(&self, index: usize) -> u64 {
        self.args[index]
    }
}
