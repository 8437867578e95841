//! Exactly-once teardown.
//!
//! Every exit path of the supervisor funnels through [`Shutdown::run`]. The
//! routine runs at most once; dropping the guard runs it if nobody did.

use std::path::Path;
use std::sync::Arc;

use sandcastle_sandbox::{SandboxAdapter, ScratchDir};
use tracing::debug;

use crate::control::ControlHandle;

/// Resources released when the supervisor exits.
///
/// Teardown order: stop the control channel, let the adapter release
/// per-command state, then remove the scratch directory if we own it.
pub struct Shutdown {
    scratch: Option<ScratchDir>,
    adapter: Option<Arc<dyn SandboxAdapter>>,
    control: Option<ControlHandle>,
    done: bool,
}

impl Shutdown {
    pub fn new(scratch: ScratchDir) -> Self {
        Self {
            scratch: Some(scratch),
            adapter: None,
            control: None,
            done: false,
        }
    }

    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(ScratchDir::path)
    }

    pub fn attach_adapter(&mut self, adapter: Arc<dyn SandboxAdapter>) {
        self.adapter = Some(adapter);
    }

    pub fn attach_control(&mut self, control: ControlHandle) {
        self.control = Some(control);
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Release everything. Later calls do nothing.
    pub fn run(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        if let Some(control) = self.control.take() {
            control.close();
        }

        if let Some(adapter) = self.adapter.take() {
            adapter.cleanup_after_command();
        }

        if let Some(scratch) = self.scratch.take() {
            scratch.release();
        }
        debug!("Shutdown complete");
    }
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("scratch", &self.scratch_path())
            .field("adapter", &self.adapter.as_ref().map(|a| a.name().to_string()))
            .field("control", &self.control.is_some())
            .field("done", &self.done)
            .finish()
    }
}
