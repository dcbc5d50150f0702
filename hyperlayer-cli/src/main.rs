//! Command-line launcher: parses the virtual-root and log-routing flags,
//! wires up logging, and hands off into the supervisor loop.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Run a Linux x86-64 binary under hardware-virtualization-backed emulation.
#[derive(Parser, Debug)]
#[command(name = "hyperlayer", version, about)]
struct Cli {
    /// Redirect kernel-style informational output (`printk`) to this file
    /// instead of stderr.
    #[arg(short = 'o', long = "printk-path")]
    printk_path: Option<PathBuf>,

    /// Redirect warning-level output to this file instead of stderr.
    #[arg(short = 'w', long = "warning-path")]
    warning_path: Option<PathBuf>,

    /// Redirect syscall trace output (`strace`-style) to this file instead
    /// of stderr.
    #[arg(short = 's', long = "strace-path")]
    strace_path: Option<PathBuf>,

    /// Directory to use as the emulated process's virtual filesystem root.
    #[arg(short = 'm', long = "virtual-root")]
    virtual_root: Option<PathBuf>,

    /// Guest executable to run.
    executable: PathBuf,

    /// Arguments passed through to the guest executable.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

/// Route every log channel to a single file when any of `-o`/`-w`/`-s` is
/// given (a finer per-channel split would need three independent
/// subscribers layered together; this crate's logging is a single
/// `tracing` pipeline, so the first path given wins for all of it), or to
/// stderr otherwise.
fn init_tracing(cli: &Cli) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let chosen = cli.printk_path.as_ref().or(cli.warning_path.as_ref()).or(cli.strace_path.as_ref());

    match chosen {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "hyperlayer.log".into());
            let appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(non_blocking).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// A minimal, not-yet-wired-to-hardware memory manager: the supervisor's
/// `MemoryMap` boundary is owned by a collaborator outside this crate in
/// the full system, but the CLI needs something concrete to hand
/// `Process::new` so the binary links.
#[derive(Debug, Default)]
struct UnbackedMemoryMap;

impl hyperlayer::proc::MemoryMap for UnbackedMemoryMap {
    fn mmap(&self, addr: u64, _len: usize, _prot: i32, _flags: i32) -> hyperlayer::Result<u64> {
        Ok(addr)
    }
    fn munmap(&self, _addr: u64, _len: usize) -> hyperlayer::Result<()> {
        Ok(())
    }
    fn guest_to_host(&self, _addr: u64) -> Option<*mut u8> {
        None
    }
    fn addr_ok(&self, _addr: u64, _len: usize, _prot: i32) -> bool {
        false
    }
}

fn main() {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli);

    let virtual_root = cli
        .virtual_root
        .as_ref()
        .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
        .unwrap_or_else(|| PathBuf::from("/"));

    tracing::info!(?virtual_root, executable = %cli.executable.display(), "starting guest");

    let root_fd = match nix::fcntl::open(&virtual_root, nix::fcntl::OFlag::O_DIRECTORY | nix::fcntl::OFlag::O_RDONLY, nix::sys::stat::Mode::empty()) {
        Ok(fd) => fd,
        Err(e) => {
            tracing::error!(%e, "failed to open virtual root");
            std::process::exit(1);
        }
    };

    let vfs = Arc::new(hyperlayer::vfs::hostfs::HostFs);
    let mm = Arc::new(UnbackedMemoryMap);
    let proc = hyperlayer::Process::new(mm, vfs, root_fd, std::process::id() as i32);
    let task = hyperlayer::Task::new(std::process::id() as i32);
    proc.add_task(&task);

    #[cfg(target_os = "linux")]
    {
        let mut vmm = match hyperlayer::vmm::kvm::KvmVmm::new(256 * 1024 * 1024) {
            Ok(vmm) => vmm,
            Err(e) => {
                tracing::error!(%e, "hardware virtualization unavailable on this host");
                std::process::exit(1);
            }
        };
        if let Err(e) = hyperlayer::main_loop(proc, task, &hyperlayer::syscall::build_table(), &mut vmm, false) {
            tracing::error!(%e, "supervisor loop terminated with an error");
            std::process::exit(1);
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        tracing::error!("hardware virtualization backend is only available on Linux hosts");
        std::process::exit(1);
    }
}
