//! Sandbox policy and partial policy updates.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Top-level sections of a policy document.
const SECTIONS: &[&str] = &["network", "filesystem"];

/// Network restrictions enforced on the supervised command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkPolicy {
    /// Domain patterns the command may reach.
    pub allowed_domains: IndexSet<String>,

    /// Domain patterns the command may never reach.
    pub denied_domains: IndexSet<String>,
}

/// Filesystem restrictions enforced on the supervised command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilesystemPolicy {
    /// Paths the command may not read.
    pub deny_read: IndexSet<String>,

    /// Paths the command may write.
    pub allow_write: IndexSet<String>,

    /// Paths the command may not write, even inside `allow_write`.
    pub deny_write: IndexSet<String>,
}

/// A fully resolved sandbox policy. Every section is always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Policy {
    pub network: NetworkPolicy,
    pub filesystem: FilesystemPolicy,
}

impl Policy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for a policy.
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    /// Merge an update into this policy.
    ///
    /// Every field present in `update` replaces the corresponding field
    /// wholesale; absent fields keep their current value.
    pub fn apply(&mut self, update: PolicyUpdate) {
        if let Some(network) = update.network {
            if let Some(allowed) = network.allowed_domains {
                self.network.allowed_domains = allowed;
            }
            if let Some(denied) = network.denied_domains {
                self.network.denied_domains = denied;
            }
        }

        if let Some(filesystem) = update.filesystem {
            if let Some(deny_read) = filesystem.deny_read {
                self.filesystem.deny_read = deny_read;
            }
            if let Some(allow_write) = filesystem.allow_write {
                self.filesystem.allow_write = allow_write;
            }
            if let Some(deny_write) = filesystem.deny_write {
                self.filesystem.deny_write = deny_write;
            }
        }
    }

    /// Return a copy of this policy with `update` merged in.
    pub fn merged(&self, update: PolicyUpdate) -> Self {
        let mut next = self.clone();
        next.apply(update);
        next
    }
}

/// Builder for [`Policy`].
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    policy: Policy,
}

impl PolicyBuilder {
    /// Add an allowed domain pattern.
    pub fn allow_domain(mut self, pattern: impl Into<String>) -> Self {
        self.policy.network.allowed_domains.insert(pattern.into());
        self
    }

    /// Add a denied domain pattern.
    pub fn deny_domain(mut self, pattern: impl Into<String>) -> Self {
        self.policy.network.denied_domains.insert(pattern.into());
        self
    }

    /// Add a path the command may not read.
    pub fn deny_read(mut self, path: impl Into<String>) -> Self {
        self.policy.filesystem.deny_read.insert(path.into());
        self
    }

    /// Add a path the command may write.
    pub fn allow_write(mut self, path: impl Into<String>) -> Self {
        self.policy.filesystem.allow_write.insert(path.into());
        self
    }

    /// Add a path the command may not write.
    pub fn deny_write(mut self, path: impl Into<String>) -> Self {
        self.policy.filesystem.deny_write.insert(path.into());
        self
    }

    /// Build the policy.
    pub fn build(self) -> Policy {
        self.policy
    }
}

/// Partial network section of a [`PolicyUpdate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<IndexSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied_domains: Option<IndexSet<String>>,
}

/// Partial filesystem section of a [`PolicyUpdate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_read: Option<IndexSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_write: Option<IndexSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_write: Option<IndexSet<String>>,
}

/// A partial policy fragment, as carried by one control-channel line.
///
/// A `null` section or field is treated the same as an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkUpdate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemUpdate>,
}

impl PolicyUpdate {
    /// Parse one line of the control protocol.
    ///
    /// Returns `Ok(None)` for blank lines, which carry no update.
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        check_document_shape(&value)?;
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Whether this update names no field at all.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl From<Policy> for PolicyUpdate {
    fn from(policy: Policy) -> Self {
        Self {
            network: Some(NetworkUpdate {
                allowed_domains: Some(policy.network.allowed_domains),
                denied_domains: Some(policy.network.denied_domains),
            }),
            filesystem: Some(FilesystemUpdate {
                deny_read: Some(policy.filesystem.deny_read),
                allow_write: Some(policy.filesystem.allow_write),
                deny_write: Some(policy.filesystem.deny_write),
            }),
        }
    }
}

/// Reject documents whose top level or sections are not JSON objects.
///
/// Serde would otherwise accept arrays in place of structs.
pub(crate) fn check_document_shape(value: &serde_json::Value) -> Result<()> {
    let Some(object) = value.as_object() else {
        return Err(ConfigError::InvalidShape(format!(
            "expected a JSON object, found {}",
            json_kind(value)
        )));
    };

    for section in SECTIONS {
        match object.get(*section) {
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::Object(_)) => {}
            Some(other) => {
                return Err(ConfigError::InvalidShape(format!(
                    "section '{section}' must be an object, found {}",
                    json_kind(other)
                )));
            }
        }
    }

    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
