//! An in-memory fake [`Vmm`] used only by `#[cfg(test)]` code, so the
//! dispatch loop in `supervisor.rs` can be exercised without any hardware
//! virtualization capability.

use std::collections::{HashMap, VecDeque};

use crate::error::VmmError;

use super::{Register, VmExit, Vmm};

/// A scripted sequence of exits plus a tiny flat guest-memory image, driven
/// entirely by a test.
#[derive(Debug, Default)]
pub struct FakeVmm {
    pub registers: HashMap<Register, u64>,
    pub memory: HashMap<u64, u8>,
    pub scripted_exits: VecDeque<VmExit>,
    pub avx_enabled: bool,
    pub vmcs: HashMap<u32, u64>,
}

impl FakeVmm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit(mut self, exit: VmExit) -> Self {
        self.scripted_exits.push_back(exit);
        self
    }

    pub fn set_memory_bytes(&mut self, addr: u64, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(addr + i as u64, *b);
        }
    }
}

impl Vmm for FakeVmm {
    fn run(&mut self) -> Result<VmExit, VmmError> {
        self.scripted_exits
            .pop_front()
            .ok_or_else(|| VmmError::RegisterAccess("fake vmm exhausted its scripted exits".into()))
    }

    fn read_register(&self, reg: Register) -> Result<u64, VmmError> {
        Ok(*self.registers.get(&reg).unwrap_or(&0))
    }

    fn write_register(&mut self, reg: Register, value: u64) -> Result<(), VmmError> {
        self.registers.insert(reg, value);
        Ok(())
    }

    fn read_vmcs(&self, field: u32) -> Result<u64, VmmError> {
        Ok(*self.vmcs.get(&field).unwrap_or(&0))
    }

    fn write_vmcs(&mut self, field: u32, value: u64) -> Result<(), VmmError> {
        self.vmcs.insert(field, value);
        Ok(())
    }

    fn read_guest_memory(&self, addr: u64, buf: &mut [u8]) -> Result<(), VmmError> {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = *self.memory.get(&(addr + i as u64)).unwrap_or(&0);
        }
        Ok(())
    }

    fn enable_avx(&mut self) -> Result<bool, VmmError> {
        let newly_enabled = !self.avx_enabled;
        self.avx_enabled = true;
        Ok(newly_enabled)
    }
}
