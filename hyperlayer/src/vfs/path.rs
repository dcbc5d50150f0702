//! Path resolution: mount-prefix rewriting and bounded symlink chasing.

use std::os::fd::RawFd;
use std::sync::Arc;

use crate::error::{Result, VfsError};

use super::fs_ops::FsOps;

/// Directories the guest may address with an absolute host path unchanged;
/// everything else absolute gets rewritten relative to the virtual root.
pub const MOUNT_PREFIX_ALLOWLIST: &[&str] = &["/Users", "/Volumes", "/dev", "/tmp"];

/// Hop budget for symlink chasing during path resolution. Exceeding it is
/// `-ELOOP`, matching the original implementation's `LOOP_MAX`.
pub const LOOP_MAX: u32 = 20;

/// `AT_SYMLINK_NOFOLLOW`-equivalent: resolve but do not follow a trailing
/// symlink.
pub const RESOLVE_NOFOLLOW: u32 = 1 << 0;
/// `AT_DIRECTORY`-equivalent hint (presently advisory only; `fstatat`
/// callers use it to require a directory result).
pub const RESOLVE_DIRECTORY: u32 = 1 << 1;

/// A resolved path ready to hand to a filesystem's path-level operation.
/// Transient: it owns no lock and is dropped as soon as the operation
/// completes.
#[derive(Debug)]
pub struct ResolvedPath {
    pub fs: Arc<dyn FsOps>,
    pub dir: RawFd,
    pub subpath: String,
}

fn has_allowed_prefix(path: &str) -> bool {
    MOUNT_PREFIX_ALLOWLIST
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

/// Rewrite an absolute guest path into either a host-absolute path (if it
/// falls under the mount-prefix allowlist) or a path relative to the
/// virtual root (everything else, by dropping the leading `/`).
fn rewrite_absolute(path: &str) -> String {
    if path == "/" {
        ".".to_string()
    } else if has_allowed_prefix(path) {
        path.to_string()
    } else {
        path.trim_start_matches('/').to_string()
    }
}

/// Resolve `(dirfd, path, flags)` into a [`ResolvedPath`], substituting
/// symlinks component-by-component up to [`LOOP_MAX`] hops.
///
/// `dirfd` is `None` for `AT_FDCWD` (resolved by the caller to the host CWD
/// token before calling in), or `Some(host_fd)` for an fd-table slot.
pub fn resolve(
    fs: Arc<dyn FsOps>,
    root: RawFd,
    dirfd: Option<RawFd>,
    path: &str,
    flags: u32,
) -> Result<ResolvedPath> {
    if path.is_empty() {
        return Err(VfsError::EmptyPath.into());
    }

    let base_dir = if path.starts_with('/') {
        root
    } else {
        dirfd.unwrap_or(root)
    };

    let subpath = if path.starts_with('/') {
        rewrite_absolute(path)
    } else {
        path.to_string()
    };

    if flags & RESOLVE_NOFOLLOW != 0 {
        return Ok(ResolvedPath {
            fs,
            dir: base_dir,
            subpath,
        });
    }

    let mut hops = 0u32;
    let subpath = chase_symlinks(&fs, base_dir, &subpath, &mut hops)?;

    Ok(ResolvedPath {
        fs,
        dir: base_dir,
        subpath,
    })
}

/// Walk `start` component by component, `readlinkat`-testing each partial
/// prefix as it is built rather than only the whole remaining path. A
/// symlink found in a non-final component is spliced in immediately and
/// resolution restarts from the top of the (now longer or shorter) path —
/// matching the original resolver's per-component loop, not a single
/// whole-path check, so a symlink can't slip past the mount-prefix
/// rewriting by hiding in the middle of a path.
fn chase_symlinks(fs: &Arc<dyn FsOps>, base_dir: RawFd, start: &str, hops: &mut u32) -> Result<String> {
    let mut subpath = start.to_string();
    'restart: loop {
        let absolute = subpath.starts_with('/');
        let mut resolved = if absolute { String::from("/") } else { String::new() };
        let mut components = subpath.split('/').filter(|c| !c.is_empty()).peekable();

        while let Some(component) = components.next() {
            resolved = append_component(&resolved, component);

            let mut link_buf = [0u8; 4096];
            if let Ok(len) = fs.readlinkat(base_dir, &resolved, &mut link_buf) {
                *hops += 1;
                if *hops > LOOP_MAX {
                    return Err(VfsError::LoopLimitExceeded.into());
                }
                let target = String::from_utf8_lossy(&link_buf[..len]).into_owned();
                let remainder: Vec<&str> = components.collect();
                subpath = splice_link(&resolved, &target, &remainder.join("/"));
                continue 'restart;
            }
        }

        return Ok(resolved);
    }
}

fn append_component(resolved: &str, component: &str) -> String {
    match resolved {
        "" => component.to_string(),
        "/" => format!("/{component}"),
        _ => format!("{resolved}/{component}"),
    }
}

/// Splice a symlink's target, plus whatever path components still remain
/// unresolved after it, into the path under resolution: an absolute target
/// restarts at the root, a relative one replaces the component just
/// appended to `resolved_so_far`.
fn splice_link(resolved_so_far: &str, target: &str, remainder: &str) -> String {
    let combined = if remainder.is_empty() {
        target.to_string()
    } else {
        format!("{target}/{remainder}")
    };
    if let Some(stripped) = combined.strip_prefix('/') {
        rewrite_absolute(&format!("/{stripped}"))
    } else {
        match resolved_so_far.rsplit_once('/') {
            Some(("", _last)) => format!("/{combined}"),
            Some((parent, _last)) => format!("{parent}/{combined}"),
            None => combined,
        }
    }
}

#[cfg(test)]
fn substitute_link(current: &str, target: &str) -> String {
    splice_link(current, target, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_becomes_dot() {
        assert_eq!(rewrite_absolute("/"), ".");
    }

    #[test]
    fn allowed_prefix_stays_absolute() {
        assert_eq!(rewrite_absolute("/tmp/foo"), "/tmp/foo");
        assert_eq!(rewrite_absolute("/dev/null"), "/dev/null");
    }

    #[test]
    fn disallowed_prefix_becomes_root_relative() {
        assert_eq!(rewrite_absolute("/etc/passwd"), "etc/passwd");
    }

    #[test]
    fn relative_link_replaces_last_component() {
        assert_eq!(substitute_link("a/b/c", "d"), "a/b/d");
        assert_eq!(substitute_link("c", "d"), "d");
    }

    #[test]
    fn absolute_link_restarts_at_root() {
        assert_eq!(substitute_link("a/b/c", "/tmp/x"), "/tmp/x");
        assert_eq!(substitute_link("a/b/c", "/etc/x"), "etc/x");
    }

    #[test]
    fn absolute_single_component_link_keeps_leading_slash() {
        // "/tmp" -> "real" (relative target) must become "/real", not
        // "real" — the symlink's parent directory is the root, not cwd.
        assert_eq!(splice_link("/tmp", "real", ""), "/real");
    }

    #[test]
    fn non_final_component_symlink_carries_remainder_forward() {
        // A symlink hit on the first of several components must splice the
        // remaining, not-yet-inspected components onto the target.
        assert_eq!(splice_link("a", "z", "b/c"), "z/b/c");
        assert_eq!(splice_link("a", "/etc/z", "b/c"), "etc/z/b/c");
    }
}
