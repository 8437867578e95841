//! Shared cell holding the effective policy.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Policy, PolicyUpdate};

/// The effective policy of one supervisor invocation.
///
/// Cloning the handle shares the same cell. Updates replace the whole policy
/// under the write lock, so readers only ever observe complete policies.
#[derive(Debug, Clone, Default)]
pub struct ActivePolicy {
    inner: Arc<RwLock<Policy>>,
}

impl ActivePolicy {
    /// Create a cell holding `initial`.
    pub fn new(initial: Policy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Get a copy of the current policy.
    pub fn snapshot(&self) -> Policy {
        self.inner.read().clone()
    }

    /// Merge `update` into the current policy and return the new effective policy.
    pub fn apply(&self, update: PolicyUpdate) -> Policy {
        let mut guard = self.inner.write();
        let next = guard.merged(update);
        *guard = next.clone();
        next
    }
}
