//! Process credentials and the privilege elevate/drop bracket.

use std::sync::RwLock;

use crate::error::{ProcError, Result};

/// Real/effective uid and gid pair. The supervisor never tracks saved ids
/// or supplementary groups — privilege emulation beyond "is the caller
/// root" is explicitly out of scope.
#[derive(Debug, Clone, Copy)]
pub struct Cred {
    pub ruid: u32,
    pub euid: u32,
    pub rgid: u32,
    pub egid: u32,
}

impl Cred {
    pub fn from_host() -> Self {
        Self {
            ruid: nix::unistd::getuid().as_raw(),
            euid: nix::unistd::geteuid().as_raw(),
            rgid: nix::unistd::getgid().as_raw(),
            egid: nix::unistd::getegid().as_raw(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.euid == 0
    }
}

/// Raise `euid` to 0 for the duration of `f`, holding the credential lock
/// for the whole window so no other thread observes a half-elevated state.
/// The privilege window starts at the real uid and is dropped back to it
/// immediately after launch; this bracket is only used for the handful of
/// operations spec'd as requiring euid 0 (e.g. `chroot`).
pub fn with_elevated_privilege<T>(cred: &RwLock<Cred>, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let guard = cred.write().expect("cred lock poisoned");
    nix::unistd::seteuid(nix::unistd::Uid::from_raw(0)).map_err(|e| {
        ProcError::Privilege(std::io::Error::from_raw_os_error(e as i32))
    })?;
    let result = f();
    let restore = nix::unistd::seteuid(nix::unistd::Uid::from_raw(guard.ruid));
    drop(guard);
    restore.map_err(|e| ProcError::Privilege(std::io::Error::from_raw_os_error(e as i32)))?;
    result
}

/// Drop any elevated privilege back to the real uid permanently — called
/// once at launch after any setup requiring elevated access has completed.
pub fn drop_privilege(cred: &RwLock<Cred>) -> Result<()> {
    let guard = cred.read().expect("cred lock poisoned");
    nix::unistd::seteuid(nix::unistd::Uid::from_raw(guard.ruid))
        .map_err(|e| ProcError::Privilege(std::io::Error::from_raw_os_error(e as i32)).into())
}
