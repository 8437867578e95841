//! Sandcastle Sandbox - the seam between the supervisor and enforcement.
//!
//! This crate provides:
//! - [`SandboxAdapter`] - the interface the supervisor drives
//! - [`ExternalEnforcerAdapter`] - delegates enforcement to an external program
//! - [`ScratchDir`] - the sandbox-private temporary directory
//! - [`shell`] - POSIX single-quote escaping
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   SandboxAdapter                     │
//! │                     (trait)                          │
//! ├─────────────────────────────────────────────────────┤
//! │  set_scratch_directory → initialize → wrap_command   │
//! │        update_config (any time after initialize)     │
//! │        cleanup_after_command (idempotent)            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Enforcement itself (namespaces, seccomp, proxies) is out of scope for this
//! crate; the adapter only prepares the command and shares the policy.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sandcastle_config::{NetworkPolicy, Policy};

pub mod enforcer;
pub mod scratch;
pub mod shell;

#[cfg(test)]
mod tests;

pub use enforcer::{ENFORCER_ENV, ExternalEnforcerAdapter, POLICY_FILE_NAME};
pub use scratch::{SCRATCH_ROOT_ENV, ScratchDir, scratch_root};

/// Interface between the supervisor and the sandbox enforcement mechanism.
///
/// Call order: [`set_scratch_directory`](Self::set_scratch_directory), then
/// [`initialize`](Self::initialize) exactly once, then any number of
/// [`wrap_command`](Self::wrap_command) and
/// [`update_config`](Self::update_config) calls.
#[async_trait]
pub trait SandboxAdapter: Send + Sync {
    /// Backend name used in diagnostics.
    fn name(&self) -> &str;

    /// Route the command's temporary files through `path`.
    fn set_scratch_directory(&mut self, path: &Path);

    /// One-time setup with the initial policy.
    async fn initialize(&mut self, policy: &Policy) -> SandboxResult<()>;

    /// Apply a new effective policy to running enforcement (best effort).
    fn update_config(&self, policy: &Policy);

    /// Return a shell command string that runs `command` under enforcement.
    async fn wrap_command(&self, command: &str) -> SandboxResult<String>;

    /// Release per-command enforcement state. Safe to call repeatedly.
    fn cleanup_after_command(&self);

    /// Current network restrictions, or `None` before initialization.
    fn network_restriction(&self) -> Option<NetworkPolicy>;
}

/// Possible errors when preparing the sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Sandbox is not initialized")]
    NotInitialized,

    #[error("Sandbox is already initialized")]
    AlreadyInitialized,

    #[error("Sandbox enforcer '{program}' not found: {message}")]
    EnforcerNotFound { program: String, message: String },

    #[error("Failed to create scratch directory {}: {source}", path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write policy file {}: {source}", path.display())]
    PolicyWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize policy: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result of a sandbox operation.
pub type SandboxResult<T> = Result<T, SandboxError>;
