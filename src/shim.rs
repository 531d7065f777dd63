//! Safety shims wrapped around every import.
//!
//! Third-party modules in a Houdini install optimistically reference
//! optional subsystems at module scope, register shutdown hooks, call the
//! process-exit function outright, or write relative-path files as a side
//! effect of being imported. Imports therefore run inside a scope guard:
//! permissive stand-ins are mounted for absent subsystems, the termination
//! guard intercepts exit attempts, the scripting-extension environment
//! switch is set, and the working directory points at a throwaway
//! write-protected directory so relative-path writes fail loudly instead of
//! littering the filesystem. Every installation is undone on the way out.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::host::Host;

/// Environment switch enabling the host application's scripting extensions.
pub const HOM_EXTENSIONS_VAR: &str = "HOUDINI_ENABLE_HOM_EXTENSIONS";

// Process-wide state (cwd, env) is mutated while shims are installed; the
// pipeline is single-threaded but tests are not.
static SHIM_LOCK: Mutex<()> = Mutex::new(());

/// Process-level shim installation: env override plus sandboxed cwd.
/// Restores everything on drop.
pub struct ProcessShims {
    _lock: MutexGuard<'static, ()>,
    saved_cwd: PathBuf,
    saved_env: Option<std::ffi::OsString>,
    sandbox: PathBuf,
}

impl ProcessShims {
    pub fn install() -> Result<Self> {
        let lock = SHIM_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let saved_cwd = std::env::current_dir().context("Failed to read working directory")?;
        let saved_env = std::env::var_os(HOM_EXTENSIONS_VAR);
        std::env::set_var(HOM_EXTENSIONS_VAR, "1");

        let sandbox = sandbox_dir();
        std::fs::create_dir_all(&sandbox)
            .with_context(|| format!("Failed to create sandbox: {}", sandbox.display()))?;
        std::env::set_current_dir(&sandbox)
            .with_context(|| format!("Failed to enter sandbox: {}", sandbox.display()))?;
        set_writable(&sandbox, false);

        Ok(Self {
            _lock: lock,
            saved_cwd,
            saved_env,
            sandbox,
        })
    }

    /// The write-protected directory imports run in.
    pub fn sandbox(&self) -> &PathBuf {
        &self.sandbox
    }
}

impl Drop for ProcessShims {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.saved_cwd);
        match &self.saved_env {
            Some(v) => std::env::set_var(HOM_EXTENSIONS_VAR, v),
            None => std::env::remove_var(HOM_EXTENSIONS_VAR),
        }
        set_writable(&self.sandbox, true);
        let _ = std::fs::remove_dir_all(&self.sandbox);
    }
}

/// Host-level shim installation: subsystem stubs plus the termination
/// guard. Restored on drop, so an unwinding `f` cannot leave the host
/// guarded or stubs mounted.
struct HostShims<'a, H: Host> {
    host: &'a mut H,
    mounted: Vec<String>,
}

impl<'a, H: Host> HostShims<'a, H> {
    fn install(host: &'a mut H) -> Self {
        let mounted = host.missing_subsystems();
        for path in &mounted {
            host.mount_stub(path);
        }
        host.set_termination_guard(true);
        Self { host, mounted }
    }
}

impl<H: Host> Drop for HostShims<'_, H> {
    fn drop(&mut self) {
        self.host.set_termination_guard(false);
        for path in &self.mounted {
            self.host.unmount_stub(path);
        }
    }
}

/// Run `f` with the full shim set installed: process shims, stand-in stubs
/// for every absent subsystem, and the termination guard. Host state is
/// restored before returning.
pub fn with_shims<H: Host, T>(host: &mut H, f: impl FnOnce(&mut H) -> T) -> Result<T> {
    let _process = ProcessShims::install()?;
    let mut shims = HostShims::install(host);
    Ok(f(&mut *shims.host))
}

/// Serializes tests that install shims: the sandbox chdir and env override
/// are process-global, and the test harness is multi-threaded.
#[cfg(test)]
pub(crate) fn serial_guard() -> MutexGuard<'static, ()> {
    static TEST_LOCK: Mutex<()> = Mutex::new(());
    TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn sandbox_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("houscan-import-{}-{}", std::process::id(), nanos))
}

#[cfg(unix)]
fn set_writable(path: &PathBuf, writable: bool) {
    use std::os::unix::fs::PermissionsExt;
    let mode = if writable { 0o700 } else { 0o500 };
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(mode);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_writable(path: &PathBuf, writable: bool) {
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_readonly(!writable);
        let _ = std::fs::set_permissions(path, perms);
    }
}
