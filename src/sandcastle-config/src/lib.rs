//! Sandcastle Config - sandbox policy model and resolution.
//!
//! This crate provides:
//! - The [`Policy`] data model (network and filesystem restrictions)
//! - Partial [`PolicyUpdate`] fragments received over the control channel
//! - Policy file resolution with built-in defaults
//! - [`ActivePolicy`], the shared cell holding the effective policy
//!
//! # Merge Semantics
//!
//! ```text
//! ┌──────────────┐   resolve    ┌──────────────┐   apply(update)   ┌──────────────┐
//! │ policy file  │ ───────────▶ │ ActivePolicy │ ◀──────────────── │ control line │
//! └──────────────┘  (defaults)  └──────────────┘  (last write wins)└──────────────┘
//! ```
//!
//! Each field named by an update replaces the previous value of that field.
//! Sets are never accumulated across updates.

mod active;
mod error;
pub mod loader;
pub mod policy;


pub use active::ActivePolicy;
pub use error::{ConfigError, Result};
pub use loader::{
    DEFAULT_CONFIG_FILE_NAME, default_config_path, load_policy, parse_policy, resolve,
    resolve_or_default,
};
pub use policy::{
    FilesystemPolicy, FilesystemUpdate, NetworkPolicy, NetworkUpdate, Policy, PolicyUpdate,
};
