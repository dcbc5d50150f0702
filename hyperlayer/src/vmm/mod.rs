//! The hardware-virtualization binding boundary.
//!
//! `Vmm` is the trait the supervisor loop drives; a concrete
//! implementation (backed by Linux KVM via `kvm-ioctls`) satisfies it on
//! hosts that expose hardware virtualization, and a fake in-memory one
//! exists purely so the dispatch loop in `supervisor.rs` can be unit
//! tested without any.

#[cfg(target_os = "linux")]
pub mod kvm;

#[cfg(test)]
pub mod fake;

use crate::error::VmmError;

/// General-purpose and control registers the supervisor needs to read or
/// write around a VM exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rsp,
    Rbp,
    R8,
    R9,
    R10,
    Rip,
    Rflags,
    Cr2,
}

/// Reason the guest exited back to the host, classified the way the
/// dispatch loop needs — not a 1:1 mirror of the raw hardware exit reason.
#[derive(Debug, Clone, Copy)]
pub enum VmExit {
    /// An external interrupt or NMI fired; nothing for the supervisor to
    /// interpret, just resume.
    ExternalInterrupt,
    /// HLT or a pending IRQ woke the vcpu; resume.
    HaltOrIrq,
    /// A page fault. `addr` is the faulting guest linear address.
    PageFault { addr: u64, write: bool, exec: bool },
    /// An EPT violation. `addr` is the faulting guest physical address.
    EptViolation { addr: u64, read: bool, write: bool, exec: bool },
    /// `#UD`. `rip` is where the two-byte instruction begins.
    InvalidOpcode { rip: u64 },
    /// CPUID was trapped; `leaf`/`subleaf` are the requested RAX/RCX.
    Cpuid { leaf: u64, subleaf: u64 },
    /// A hardware exception the supervisor does not attempt to handle
    /// (`#DE`, `#DB`, `#GP`, ...): fatal.
    FatalException { vector: u8 },
    /// VM-entry itself failed or the exit reason is unrecognized.
    EntryFailureOrUnknown { raw_reason: u32 },
}

/// The hardware-virtualization binding: everything the supervisor needs
/// from the VM/vcpu without knowing how it is actually backed.
pub trait Vmm: std::fmt::Debug + Send {
    /// Run the guest until the next VM exit.
    fn run(&mut self) -> Result<VmExit, VmmError>;
    /// Read a general-purpose/control register.
    fn read_register(&self, reg: Register) -> Result<u64, VmmError>;
    /// Write a general-purpose/control register.
    fn write_register(&mut self, reg: Register, value: u64) -> Result<(), VmmError>;
    /// Read a VMCS field by its raw encoding.
    fn read_vmcs(&self, field: u32) -> Result<u64, VmmError>;
    /// Write a VMCS field by its raw encoding.
    fn write_vmcs(&mut self, field: u32, value: u64) -> Result<(), VmmError>;
    /// Read `len` bytes of guest linear memory starting at `addr` (used to
    /// decode the two bytes at RIP for `#UD` classification).
    fn read_guest_memory(&self, addr: u64, buf: &mut [u8]) -> Result<(), VmmError>;
    /// Enable AVX for the guest (XCR0 write) on first encountering a
    /// VEX/AVX-prefixed instruction. Returns `Ok(true)` if this call is
    /// what newly enabled it, `Ok(false)` if it was already enabled (the
    /// caller should then fall through to `SIGILL` — a VEX-prefixed
    /// opcode that still faults with AVX already on is genuinely
    /// malformed, not waiting on a one-time enable).
    fn enable_avx(&mut self) -> Result<bool, VmmError>;
    /// Run the VM-entry self-diagnostic, logging and returning any
    /// inconsistency found rather than panicking.
    fn check_vm_entry(&self) -> Result<(), VmmError> {
        Ok(())
    }
}
