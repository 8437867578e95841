//! Policy file resolution.
//!
//! A missing or corrupt policy file is never fatal: [`resolve`] reports it as
//! absent and callers fall back to [`Policy::default`]. A corrupt file is
//! treated as wholly absent, never partially merged.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::policy::check_document_shape;
use crate::{ConfigError, Policy, Result};

/// File name of the policy file in the user's home directory.
pub const DEFAULT_CONFIG_FILE_NAME: &str = ".srt-settings.json";

/// Default policy file location (`~/.srt-settings.json`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE_NAME))
}

/// Parse a policy document. Missing sections and fields default to empty.
pub fn parse_policy(text: &str) -> Result<Policy> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    check_document_shape(&value)?;
    Ok(serde_json::from_value(value)?)
}

/// Read and parse the policy file at `path`.
pub fn load_policy(path: &Path) -> Result<Policy> {
    let text = std::fs::read_to_string(path)?;
    parse_policy(&text)
}

/// Resolve the policy at `path`, or `None` if it is missing or unusable.
pub fn resolve(path: &Path) -> Option<Policy> {
    match load_policy(path) {
        Ok(policy) => {
            debug!("Loaded policy from {}", path.display());
            Some(policy)
        }
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No config found at {}", path.display());
            None
        }
        Err(e) => {
            debug!("Ignoring unusable config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the policy at `path`, substituting the built-in default if absent.
pub fn resolve_or_default(path: &Path) -> Policy {
    resolve(path).unwrap_or_else(|| {
        debug!(
            "No usable config at {}, using default config",
            path.display()
        );
        Policy::default()
    })
}
