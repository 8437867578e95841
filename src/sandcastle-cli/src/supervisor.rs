//! The Process Supervisor.
//!
//! Drives one command through `Idle → Initializing → Wrapping → Running →
//! Terminated`, relaying SIGINT and SIGTERM to the child and translating its
//! termination into our exit code.

use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use sandcastle_config::{ActivePolicy, Policy, default_config_path, resolve_or_default};
use sandcastle_sandbox::{ExternalEnforcerAdapter, SandboxAdapter, ScratchDir};
use tokio::process::Command;
use tokio::signal::unix::{Signal as SignalStream, SignalKind, signal};
use tracing::debug;

use crate::command::build_command;
use crate::control::ControlChannel;
use crate::outcome::ProcessOutcome;
use crate::shutdown::Shutdown;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Shell used to run the wrapped command.
const SYSTEM_SHELL: &str = "/bin/sh";

/// Inputs of one supervisor invocation.
#[derive(Debug, Clone, Default)]
pub struct SupervisorOptions {
    /// Policy file; `~/.srt-settings.json` when unset.
    pub config_path: Option<PathBuf>,
    /// Shell override for the Supervised Command.
    pub shell: Option<String>,
    /// Explicit scratch directory, kept on exit.
    pub tmpdir: Option<PathBuf>,
    /// Inherited descriptor carrying policy updates.
    pub control_fd: Option<RawFd>,
    /// External enforcer program.
    pub enforcer: Option<String>,
    /// Command tokens.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SupervisorState {
    Idle,
    Initializing,
    Wrapping,
    Running,
    Terminated,
}

#[derive(Debug)]
pub struct Supervisor {
    options: SupervisorOptions,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self {
            options,
            state: SupervisorState::Idle,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Run the command under the external enforcer adapter.
    pub async fn run(&mut self) -> u8 {
        let adapter = ExternalEnforcerAdapter::new(self.options.enforcer.clone());
        self.run_with_adapter(Box::new(adapter)).await
    }

    /// Run the command under `adapter` and return the exit code.
    ///
    /// Teardown has completed by the time this returns, on every path.
    pub async fn run_with_adapter(&mut self, adapter: Box<dyn SandboxAdapter>) -> u8 {
        let mut shutdown = None;

        let code = match self.drive(adapter, &mut shutdown).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {e:#}");
                EXIT_FAILURE
            }
        };

        if let Some(mut shutdown) = shutdown {
            shutdown.run();
        }
        self.transition(SupervisorState::Terminated);
        code
    }

    async fn drive(
        &mut self,
        adapter: Box<dyn SandboxAdapter>,
        shutdown: &mut Option<Shutdown>,
    ) -> anyhow::Result<u8> {
        let command = build_command(&self.options.command, self.options.shell.as_deref())?;

        // Installed first so a stop request during setup still tears down.
        let mut signals = StopSignals::install()?;

        let (adapter, wrapped) = tokio::select! {
            prepared = self.prepare(adapter, &command, shutdown) => prepared?,
            signal = signals.recv() => {
                debug!("Received {} before the command started", signal.as_str());
                return Ok(EXIT_SUCCESS);
            }
        };

        let mut child = match Command::new(SYSTEM_SHELL).arg("-c").arg(&wrapped).spawn() {
            Ok(child) => child,
            Err(e) => {
                eprintln!("Failed to execute command: {e}");
                return Ok(EXIT_FAILURE);
            }
        };

        self.transition(SupervisorState::Running);
        let pid = child.id();

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                signal = signals.recv() => forward_signal(pid, signal),
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                eprintln!("Failed to execute command: {e}");
                return Ok(EXIT_FAILURE);
            }
        };

        self.transition(SupervisorState::Terminated);
        adapter.cleanup_after_command();

        let outcome = ProcessOutcome::from(status);
        debug!("Command finished: {outcome:?}");
        if let Some(report) = outcome.report() {
            eprintln!("{report}");
        }
        Ok(outcome.exit_code())
    }

    /// Initialize the sandbox and wrap `command`.
    ///
    /// Registers every acquired resource with `shutdown` as soon as it exists.
    async fn prepare(
        &mut self,
        mut adapter: Box<dyn SandboxAdapter>,
        command: &str,
        shutdown: &mut Option<Shutdown>,
    ) -> anyhow::Result<(Arc<dyn SandboxAdapter>, String)> {
        self.transition(SupervisorState::Initializing);
        let policy = self.resolve_policy();

        let scratch = ScratchDir::acquire(self.options.tmpdir.as_deref())?;
        debug!(
            "Using scratch directory {} (owned: {})",
            scratch.path().display(),
            scratch.owns_lifecycle()
        );
        adapter.set_scratch_directory(scratch.path());
        let guard = shutdown.insert(Shutdown::new(scratch));

        let initialized = adapter.initialize(&policy).await;
        let adapter: Arc<dyn SandboxAdapter> = Arc::from(adapter);
        guard.attach_adapter(adapter.clone());
        initialized.with_context(|| format!("failed to initialize {} sandbox", adapter.name()))?;

        if let Some(fd) = self.options.control_fd {
            match ControlChannel::open(fd) {
                Ok(channel) => {
                    let handle = channel.spawn(ActivePolicy::new(policy), adapter.clone());
                    guard.attach_control(handle);
                }
                Err(e) => debug!("Control channel unavailable: {e}"),
            }
        }

        self.transition(SupervisorState::Wrapping);
        debug!("Original command: {command}");
        if let Some(network) = adapter.network_restriction() {
            debug!(
                "Network restriction config: {}",
                serde_json::to_string_pretty(&network).unwrap_or_default()
            );
        }

        let wrapped = adapter
            .wrap_command(command)
            .await
            .context("failed to wrap command")?;
        debug!("Wrapped command: {wrapped}");
        Ok((adapter, wrapped))
    }

    fn resolve_policy(&self) -> Policy {
        match self.options.config_path.clone().or_else(default_config_path) {
            Some(path) => resolve_or_default(&path),
            None => {
                debug!("No home directory, using default config");
                Policy::default()
            }
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        if next <= self.state {
            return;
        }
        debug!("Supervisor state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// SIGINT and SIGTERM delivered to the supervisor.
struct StopSignals {
    interrupt: SignalStream,
    terminate: SignalStream,
}

impl StopSignals {
    fn install() -> anyhow::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())
                .context("failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate())
                .context("failed to install SIGTERM handler")?,
        })
    }

    /// Wait for the next stop signal.
    async fn recv(&mut self) -> Signal {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Signal::SIGINT,
            Some(()) = self.terminate.recv() => Signal::SIGTERM,
            else => std::future::pending().await,
        }
    }
}

fn forward_signal(pid: Option<u32>, signal: Signal) {
    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };

    debug!("Forwarding {} to child {pid}", signal.as_str());
    if let Err(e) = kill(Pid::from_raw(pid), signal) {
        debug!("Failed to forward {}: {e}", signal.as_str());
    }
}
