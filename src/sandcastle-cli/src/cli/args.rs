//! Command-line arguments.

use std::os::fd::RawFd;
use std::path::PathBuf;

use clap::Parser;
use sandcastle_sandbox::ENFORCER_ENV;

use crate::logging::debug_env_enabled;
use crate::supervisor::SupervisorOptions;

/// Run commands in a sandbox with network and filesystem restrictions.
#[derive(Debug, Parser)]
#[command(name = "sandcastle")]
#[command(version)]
#[command(about = "Run commands in a sandbox with network and filesystem restrictions")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Path to the policy file (default: ~/.srt-settings.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Shell to execute the command with
    #[arg(long, value_name = "SHELL")]
    pub shell: Option<String>,

    /// Scratch directory for the command's temporary files (kept on exit)
    #[arg(long, value_name = "PATH")]
    pub tmpdir: Option<PathBuf>,

    /// Read policy updates from this file descriptor (JSON lines protocol)
    #[arg(
        long = "control-fd",
        value_name = "FD",
        value_parser = clap::value_parser!(i32).range(0..)
    )]
    pub control_fd: Option<RawFd>,

    /// External program enforcing the sandbox policy
    #[arg(long, value_name = "PROGRAM", env = ENFORCER_ENV)]
    pub enforcer: Option<String>,

    /// Command to run in the sandbox
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Whether debug logging is requested by flag or environment.
    pub fn debug_enabled(&self) -> bool {
        self.debug || debug_env_enabled()
    }

    /// Convert the parsed arguments into supervisor options.
    pub fn into_options(self) -> SupervisorOptions {
        SupervisorOptions {
            config_path: self.config,
            shell: self.shell,
            tmpdir: self.tmpdir,
            control_fd: self.control_fd,
            enforcer: self.enforcer,
            command: self.command,
        }
    }
}
