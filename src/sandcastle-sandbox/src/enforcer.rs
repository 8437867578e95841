//! Adapter delegating enforcement to an external program.
//!
//! The enforcer is invoked as
//! `<enforcer> --policy-file <state>/policy.json -- /bin/sh -c <command>`.
//! The policy file lives in a supervisor-private state directory, never in
//! the command's scratch `TMPDIR`, and is rewritten on every update so the
//! enforcer can pick up changes while the command runs. Whether a running
//! command observes an update is up to the enforcer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sandcastle_config::{NetworkPolicy, Policy};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::shell::quote;
use crate::{SandboxAdapter, SandboxError, SandboxResult};

/// Environment variable naming the enforcement program.
pub const ENFORCER_ENV: &str = "SANDCASTLE_ENFORCER";

/// Name of the policy snapshot inside the state directory.
pub const POLICY_FILE_NAME: &str = "policy.json";

const STATE_PREFIX: &str = "sandcastle-state-";

/// Sandbox adapter backed by an optional external enforcement program.
///
/// Without an enforcer the command only gets its scratch `TMPDIR`; no
/// restrictions are applied.
#[derive(Debug)]
pub struct ExternalEnforcerAdapter {
    /// Enforcer as configured (program name or path).
    enforcer: Option<String>,

    /// Enforcer resolved on `PATH` during initialization.
    resolved: Option<PathBuf>,

    scratch_dir: PathBuf,

    /// Effective policy; `None` until initialized.
    policy: RwLock<Option<Policy>>,

    /// Holds the policy snapshot. Removed by `cleanup_after_command`.
    state_dir: Mutex<Option<TempDir>>,

    command_active: AtomicBool,
}

impl ExternalEnforcerAdapter {
    /// Create an adapter using `enforcer`, or no enforcer at all.
    pub fn new(enforcer: Option<String>) -> Self {
        Self {
            enforcer: enforcer.filter(|program| !program.trim().is_empty()),
            resolved: None,
            scratch_dir: std::env::temp_dir(),
            policy: RwLock::new(None),
            state_dir: Mutex::new(None),
            command_active: AtomicBool::new(false),
        }
    }

    /// The enforcer resolved during initialization, if any.
    pub fn enforcer_path(&self) -> Option<&Path> {
        self.resolved.as_deref()
    }

    /// Path of the policy snapshot shared with the enforcer.
    ///
    /// `None` before initialization and after cleanup.
    pub fn policy_file(&self) -> Option<PathBuf> {
        self.state_dir
            .lock()
            .as_ref()
            .map(|dir| dir.path().join(POLICY_FILE_NAME))
    }

    /// The current effective policy.
    pub fn policy(&self) -> Option<Policy> {
        self.policy.read().clone()
    }

    /// Write `policy` to the policy file without exposing a partial file.
    ///
    /// Small synchronous write; callers hold the policy lock so the file
    /// follows the order of updates.
    fn persist(&self, policy: &Policy) -> SandboxResult<()> {
        let Some(path) = self.policy_file() else {
            debug!("Policy file already released, keeping update in memory");
            return Ok(());
        };
        let staging = path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(policy)?;

        std::fs::write(&staging, contents)
            .and_then(|()| std::fs::rename(&staging, &path))
            .map_err(|source| SandboxError::PolicyWrite { path, source })
    }
}

impl Default for ExternalEnforcerAdapter {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SandboxAdapter for ExternalEnforcerAdapter {
    fn name(&self) -> &str {
        "external-enforcer"
    }

    fn set_scratch_directory(&mut self, path: &Path) {
        self.scratch_dir = path.to_path_buf();
    }

    async fn initialize(&mut self, policy: &Policy) -> SandboxResult<()> {
        if self.policy.get_mut().is_some() {
            return Err(SandboxError::AlreadyInitialized);
        }

        match &self.enforcer {
            Some(program) => {
                let resolved =
                    which::which(program).map_err(|e| SandboxError::EnforcerNotFound {
                        program: program.clone(),
                        message: e.to_string(),
                    })?;
                debug!("Using sandbox enforcer {}", resolved.display());
                self.resolved = Some(resolved);
            }
            None => {
                debug!("No sandbox enforcer configured; commands run without restrictions");
            }
        }

        let root = std::env::temp_dir();
        let state_dir = tempfile::Builder::new()
            .prefix(STATE_PREFIX)
            .tempdir_in(&root)
            .map_err(|source| SandboxError::PolicyWrite {
                path: root.clone(),
                source,
            })?;

        let path = state_dir.path().join(POLICY_FILE_NAME);
        let contents = serde_json::to_vec_pretty(policy)?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| SandboxError::PolicyWrite {
                path: path.clone(),
                source,
            })?;

        *self.state_dir.get_mut() = Some(state_dir);
        *self.policy.get_mut() = Some(policy.clone());
        debug!("Sandbox initialized, policy at {}", path.display());
        Ok(())
    }

    fn update_config(&self, policy: &Policy) {
        let mut current = self.policy.write();
        if current.is_none() {
            warn!("Ignoring policy update before sandbox initialization");
            return;
        }

        if let Err(e) = self.persist(policy) {
            warn!("Policy update not shared with enforcer: {}", e);
        }
        *current = Some(policy.clone());
    }

    async fn wrap_command(&self, command: &str) -> SandboxResult<String> {
        if self.policy.read().is_none() {
            return Err(SandboxError::NotInitialized);
        }

        let tmpdir = quote(&self.scratch_dir.to_string_lossy());
        let body = match (&self.resolved, self.policy_file()) {
            (Some(enforcer), Some(policy_file)) => format!(
                "{} --policy-file {} -- /bin/sh -c {}",
                quote(&enforcer.to_string_lossy()),
                quote(&policy_file.to_string_lossy()),
                quote(command)
            ),
            (Some(_), None) => return Err(SandboxError::NotInitialized),
            (None, _) => format!("/bin/sh -c {}", quote(command)),
        };

        self.command_active.store(true, Ordering::SeqCst);
        // `exec` keeps the supervised program as our direct child, so relayed
        // signals and its termination status are not absorbed by the shell.
        Ok(format!("export TMPDIR={tmpdir}; exec {body}"))
    }

    fn cleanup_after_command(&self) {
        if self.command_active.swap(false, Ordering::SeqCst) {
            debug!("Released per-command sandbox state");
        }

        let Some(dir) = self.state_dir.lock().take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            debug!("Failed to remove state directory {}: {}", path.display(), e);
        }
    }

    fn network_restriction(&self) -> Option<NetworkPolicy> {
        self.policy
            .read()
            .as_ref()
            .map(|policy| policy.network.clone())
    }
}
