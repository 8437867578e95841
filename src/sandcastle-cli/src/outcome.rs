//! Translation of child termination into the supervisor's exit code.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// How the supervised command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Normal exit. `None` when the platform reported no code.
    Exited(Option<i32>),
    /// Killed by the given signal number.
    Signaled(i32),
}

impl From<ExitStatus> for ProcessOutcome {
    fn from(status: ExitStatus) -> Self {
        match status.signal() {
            Some(signal) => Self::Signaled(signal),
            None => Self::Exited(status.code()),
        }
    }
}

impl ProcessOutcome {
    /// Exit code for the supervisor process.
    ///
    /// Termination by SIGINT or SIGTERM counts as a clean, user-requested
    /// stop. Any other signal is a failure.
    pub fn exit_code(&self) -> u8 {
        match *self {
            Self::Signaled(signal) if is_stop_request(signal) => 0,
            Self::Signaled(_) => 1,
            Self::Exited(Some(code)) => u8::try_from(code).unwrap_or(1),
            Self::Exited(None) => 0,
        }
    }

    /// Diagnostic line for abnormal terminations, if any.
    pub fn report(&self) -> Option<String> {
        match *self {
            Self::Signaled(signal) if !is_stop_request(signal) => {
                Some(format!("Process killed by signal: {}", signal_name(signal)))
            }
            _ => None,
        }
    }
}

fn is_stop_request(signal: i32) -> bool {
    signal == Signal::SIGINT as i32 || signal == Signal::SIGTERM as i32
}

/// Symbolic name for a signal number, e.g. `SIGKILL`.
pub fn signal_name(signal: i32) -> String {
    Signal::try_from(signal)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {signal}"))
}
