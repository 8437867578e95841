//! Sandcastle CLI library module.
//!
//! This module provides the supervisor behind the `sandcastle` binary:
//! - `cli/` - Command-line argument parsing
//! - `logging` - tracing subscriber setup (debug channel on stderr)
//! - `command` - Supervised Command construction
//! - `control` - Live Config Channel (JSON-lines policy updates)
//! - `outcome` - Translation of child termination into exit codes
//! - `shutdown` - Exactly-once teardown shared by every exit path
//! - `supervisor` - The Process Supervisor state machine
//!
//! # Lifecycle
//!
//! ```text
//! Idle ─▶ Initializing ─▶ Wrapping ─▶ Running ─▶ Terminated
//!              │              │           │
//!              └──────────────┴───────────┴──▶ Shutdown::run (always)
//! ```

#[cfg(not(unix))]
compile_error!("sandcastle supports Unix platforms only");

pub mod cli;
pub mod command;
pub mod control;
pub mod logging;
pub mod outcome;
pub mod shutdown;
pub mod supervisor;

pub use supervisor::{Supervisor, SupervisorOptions, SupervisorState};
