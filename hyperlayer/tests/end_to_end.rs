//! End-to-end scenarios driving real syscall handlers (and, where the
//! scenario is actually about VM-exit classification, the full supervisor
//! loop) against a host-backed filesystem and a scripted virtualization
//! backend.

use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;
use std::sync::Arc;

use hyperlayer::cred::Cred;
use hyperlayer::error::VmmError;
use hyperlayer::proc::{MemoryMap, Process};
use hyperlayer::syscall::context::SyscallContext;
use hyperlayer::syscall::{fs as h_fs, misc as h_misc};
use hyperlayer::task::Task;
use hyperlayer::vfs::hostfs::HostFs;
use hyperlayer::vfs::path;
use hyperlayer::vmm::{Register, VmExit, Vmm};

/// A flat guest-memory region backed by a leaked allocation, standing in
/// for the out-of-scope memory manager. Large enough for every test's
/// buffers; never resized, so the pointer handed out stays valid for the
/// process lifetime.
#[derive(Debug)]
struct TestMemoryMap {
    base: u64,
    len: usize,
    ptr: *mut u8,
}

unsafe impl Send for TestMemoryMap {}
unsafe impl Sync for TestMemoryMap {}

impl TestMemoryMap {
    fn new(base: u64, len: usize) -> Self {
        let buf = vec![0u8; len].into_boxed_slice();
        let ptr = Box::leak(buf).as_mut_ptr();
        Self { base, len, ptr }
    }

    fn poke(&self, addr: u64, bytes: &[u8]) {
        let host = self.guest_to_host(addr).expect("address within test memory map");
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), host, bytes.len()) };
    }
}

impl MemoryMap for TestMemoryMap {
    fn mmap(&self, addr: u64, _len: usize, _prot: i32, _flags: i32) -> hyperlayer::Result<u64> {
        Ok(addr)
    }

    fn munmap(&self, _addr: u64, _len: usize) -> hyperlayer::Result<()> {
        Ok(())
    }

    fn guest_to_host(&self, addr: u64) -> Option<*mut u8> {
        if addr >= self.base && addr < self.base + self.len as u64 {
            Some(unsafe { self.ptr.add((addr - self.base) as usize) })
        } else {
            None
        }
    }

    fn addr_ok(&self, addr: u64, len: usize, _prot: i32) -> bool {
        addr >= self.base && addr.checked_add(len as u64).is_some_and(|end| end <= self.base + self.len as u64)
    }
}

const GUEST_BASE: u64 = 0x2000_0000;
const GUEST_SIZE: usize = 64 * 1024;

fn open_root(dir: &std::path::Path) -> RawFd {
    nix::fcntl::open(dir, nix::fcntl::OFlag::O_DIRECTORY | nix::fcntl::OFlag::O_RDONLY, nix::sys::stat::Mode::empty())
        .expect("open temp dir as vfs root")
}

fn new_process(root: RawFd, pid: i32) -> Arc<Process> {
    Process::new(Arc::new(TestMemoryMap::new(GUEST_BASE, GUEST_SIZE)), Arc::new(HostFs), root, pid)
}

/// A scripted [`Vmm`] driven entirely by a test, independent of the crate's
/// own `#[cfg(test)]`-only fake (which is not visible across the crate
/// boundary an integration test runs in).
#[derive(Debug, Default)]
struct ScriptedVmm {
    registers: HashMap<Register, u64>,
    memory: HashMap<u64, u8>,
    exits: VecDeque<VmExit>,
    avx_enabled: bool,
}

impl ScriptedVmm {
    fn with_exit(mut self, exit: VmExit) -> Self {
        self.exits.push_back(exit);
        self
    }

    fn set_memory_bytes(&mut self, addr: u64, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(addr + i as u64, *b);
        }
    }
}

impl Vmm for ScriptedVmm {
    fn run(&mut self) -> Result<VmExit, VmmError> {
        self.exits.pop_front().ok_or_else(|| VmmError::RegisterAccess("scripted vmm exhausted its exits".into()))
    }

    fn read_register(&self, reg: Register) -> Result<u64, VmmError> {
        Ok(*self.registers.get(&reg).unwrap_or(&0))
    }

    fn write_register(&mut self, reg: Register, value: u64) -> Result<(), VmmError> {
        self.registers.insert(reg, value);
        Ok(())
    }

    fn read_vmcs(&self, _field: u32) -> Result<u64, VmmError> {
        Ok(0)
    }

    fn write_vmcs(&mut self, _field: u32, _value: u64) -> Result<(), VmmError> {
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

fn assert_scripted_vmm_exhausted(result: hyperlayer::Result<()>) {
    match result {
        Err(hyperlayer::EmulatorError::Vmm(VmmError::RegisterAccess(msg))) => {
            assert!(msg.contains("exhausted"), "unexpected vmm error: {msg}");
        }
        other => panic!("expected the scripted vmm to run dry, got {other:?}"),
    }
}

#[test]
fn openat_write_close_round_trips_through_the_host_filesystem() {
    let tempdir = tempfile::tempdir().expect("create temp dir");
    let root = open_root(tempdir.path());
    let proc = new_process(root, 100);
    let task = Task::new(100);
    proc.add_task(&task);

    const PATH_ADDR: u64 = GUEST_BASE;
    const DATA_ADDR: u64 = GUEST_BASE + 0x100;
    const AT_FDCWD: u64 = -100i64 as u64;
    const O_WRONLY: u64 = 0o1;
    const O_CREAT: u64 = 0o100;
    const O_TRUNC: u64 = 0o1000;

    proc.mm.guest_to_host(PATH_ADDR); // sanity: address is in range
    let map = &proc.mm;
    let poke = |addr: u64, bytes: &[u8]| {
        let host = map.guest_to_host(addr).expect("address in test memory");
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), host, bytes.len()) };
    };
    poke(PATH_ADDR, b"hello.txt\0");

    let open_ctx = SyscallContext {
        proc: &proc,
        task: &task,
        args: [AT_FDCWD, PATH_ADDR, O_WRONLY | O_CREAT | O_TRUNC, 0o644, 0, 0],
    };
    let fd = h_fs::sys_openat(&open_ctx);
    assert!(fd >= 0, "openat failed with {fd}");

    let payload = b"hello world\n";
    poke(DATA_ADDR, payload);
    let write_ctx = SyscallContext { proc: &proc, task: &task, args: [fd as u64, DATA_ADDR, payload.len() as u64, 0, 0, 0] };
    let written = h_fs::sys_write(&write_ctx);
    assert_eq!(written, payload.len() as i64);

    let close_ctx = SyscallContext { proc: &proc, task: &task, args: [fd as u64, 0, 0, 0, 0, 0] };
    assert_eq!(h_fs::sys_close(&close_ctx), 0);

    let on_disk = std::fs::read(tempdir.path().join("hello.txt")).expect("file exists on host");
    assert_eq!(on_disk, payload);
}

#[test]
fn circular_symlinks_resolve_to_eloop() {
    let tempdir = tempfile::tempdir().expect("create temp dir");
    std::os::unix::fs::symlink("b", tempdir.path().join("a")).unwrap();
    std::os::unix::fs::symlink("a", tempdir.path().join("b")).unwrap();
    let root = open_root(tempdir.path());

    let fs: Arc<dyn hyperlayer::vfs::fs_ops::FsOps> = Arc::new(HostFs);
    let err = path::resolve(fs, root, None, "a", 0).expect_err("circular symlink must not resolve");
    assert!(
        matches!(err, hyperlayer::EmulatorError::Vfs(hyperlayer::error::VfsError::LoopLimitExceeded)),
        "expected ELOOP, got {err:?}"
    );
}

#[test]
fn pipe2_applies_cloexec_and_nonblock_to_the_host_pipe() {
    let tempdir = tempfile::tempdir().expect("create temp dir");
    let root = open_root(tempdir.path());
    let proc = new_process(root, 200);
    let task = Task::new(200);
    proc.add_task(&task);

    const FDS_ADDR: u64 = GUEST_BASE;
    const O_CLOEXEC: u64 = 0o2000000;
    const O_NONBLOCK: u64 = 0o4000;

    let ctx = SyscallContext { proc: &proc, task: &task, args: [FDS_ADDR, O_CLOEXEC | O_NONBLOCK, 0, 0, 0, 0] };
    assert_eq!(h_fs::sys_pipe2(&ctx), 0);

    let host = proc.mm.guest_to_host(FDS_ADDR).expect("fds buffer in range");
    let read_fd = unsafe { std::ptr::read_unaligned(host.cast::<i32>()) };
    let write_fd = unsafe { std::ptr::read_unaligned(host.add(4).cast::<i32>()) };

    let read_flags = unsafe { libc::fcntl(read_fd, libc::F_GETFD) };
    let write_fl = unsafe { libc::fcntl(write_fd, libc::F_GETFL) };
    assert_ne!(read_flags & libc::FD_CLOEXEC, 0, "read end must carry FD_CLOEXEC");
    assert_ne!(write_fl & libc::O_NONBLOCK, 0, "write end must carry O_NONBLOCK");

    unsafe {
        libc::close(read_fd);
        libc::close(write_fd);
    }
}

#[test]
fn chroot_requires_root_and_then_only_accepts_the_real_root() {
    let tempdir = tempfile::tempdir().expect("create temp dir");
    let root = open_root(tempdir.path());
    let proc = new_process(root, 300);
    let task = Task::new(300);
    proc.add_task(&task);

    let poke = |addr: u64, bytes: &[u8]| {
        let host = proc.mm.guest_to_host(addr).expect("address in test memory");
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), host, bytes.len()) };
    };

    *proc.cred.write().unwrap() = Cred { ruid: 1000, euid: 1000, rgid: 1000, egid: 1000 };
    poke(GUEST_BASE, b"/\0");
    let ctx = SyscallContext { proc: &proc, task: &task, args: [GUEST_BASE, 0, 0, 0, 0, 0] };
    assert_eq!(h_fs::sys_chroot(&ctx), -i64::from(libc::EPERM));

    *proc.cred.write().unwrap() = Cred { ruid: 0, euid: 0, rgid: 0, egid: 0 };
    poke(GUEST_BASE + 0x10, b"/var\0");
    let ctx = SyscallContext { proc: &proc, task: &task, args: [GUEST_BASE + 0x10, 0, 0, 0, 0, 0] };
    assert_eq!(h_fs::sys_chroot(&ctx), -i64::from(libc::EACCES));

    poke(GUEST_BASE + 0x20, b"/\0");
    let ctx = SyscallContext { proc: &proc, task: &task, args: [GUEST_BASE + 0x20, 0, 0, 0, 0, 0] };
    assert_eq!(h_fs::sys_chroot(&ctx), 0);
}

#[test]
fn vsyscall_fault_redirects_to_gettimeofday_and_resumes() {
    let tempdir = tempfile::tempdir().expect("create temp dir");
    let root = open_root(tempdir.path());
    let proc = new_process(root, 400);
    let task = Task::new(400);
    proc.add_task(&task);
    let table = hyperlayer::syscall::build_table();

    let vsyscall_addr = hyperlayer::vsyscall::VSYSCALL_PAGE_ADDR;
    let mut vmm = ScriptedVmm::default().with_exit(VmExit::PageFault { addr: vsyscall_addr, write: false, exec: true }).with_exit(VmExit::InvalidOpcode { rip: vsyscall_addr });
    vmm.registers.insert(Register::Rdi, GUEST_BASE);
    vmm.set_memory_bytes(vsyscall_addr, &[0x0F, 0x05]);

    let result = hyperlayer::main_loop(proc.clone(), task, &table, &mut vmm, false);
    assert_scripted_vmm_exhausted(result);

    assert_eq!(*vmm.registers.get(&Register::Rax).unwrap(), 0, "gettimeofday must report success");
    assert_eq!(*vmm.registers.get(&Register::Rip).unwrap(), vsyscall_addr + 2, "rip advances past the syscall instruction");

    let host = proc.mm.guest_to_host(GUEST_BASE).unwrap();
    let tv_sec = unsafe { std::ptr::read_unaligned(host.cast::<i64>()) };
    assert!(tv_sec > 1_600_000_000, "tv_sec should be a plausible real-world timestamp, got {tv_sec}");
}

#[test]
fn vex_prefixed_instruction_enables_avx_and_does_not_advance_rip() {
    let tempdir = tempfile::tempdir().expect("create temp dir");
    let root = open_root(tempdir.path());
    let proc = new_process(root, 500);
    let task = Task::new(500);
    proc.add_task(&task);
    let table = hyperlayer::syscall::build_table();

    const FAULT_RIP: u64 = 0x4000;
    let mut vmm = ScriptedVmm::default().with_exit(VmExit::InvalidOpcode { rip: FAULT_RIP });
    vmm.set_memory_bytes(FAULT_RIP, &[0xC5, 0xF8]);
    vmm.registers.insert(Register::Rip, FAULT_RIP);

    let result = hyperlayer::main_loop(proc, task, &table, &mut vmm, false);
    assert_scripted_vmm_exhausted(result);

    assert!(vmm.avx_enabled, "vex-prefixed #UD must enable avx");
    assert_eq!(*vmm.registers.get(&Register::Rip).unwrap(), FAULT_RIP, "the faulting instruction itself must re-execute, not be skipped");
}

#[test]
fn getcpu_always_reports_vcpu_zero() {
    let tempdir = tempfile::tempdir().expect("create temp dir");
    let root = open_root(tempdir.path());
    let proc = new_process(root, 600);
    let task = Task::new(600);
    proc.add_task(&task);

    const CPU_ADDR: u64 = GUEST_BASE;
    const NODE_ADDR: u64 = GUEST_BASE + 8;
    let ctx = SyscallContext { proc: &proc, task: &task, args: [CPU_ADDR, NODE_ADDR, 0, 0, 0, 0] };
    assert_eq!(h_misc::sys_getcpu(&ctx), 0);

    let cpu = unsafe { std::ptr::read_unaligned(proc.mm.guest_to_host(CPU_ADDR).unwrap().cast::<u32>()) };
    let node = unsafe { std::ptr::read_unaligned(proc.mm.guest_to_host(NODE_ADDR).unwrap().cast::<u32>()) };
    assert_eq!((cpu, node), (0, 0));
}
