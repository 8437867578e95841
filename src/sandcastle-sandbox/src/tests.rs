//! Tests for shell quoting, scratch directories and the enforcer adapter.
//!
//! Quoting tests run the quoted strings through a real `/bin/sh`.

use std::fs;
use std::process::Command;

use pretty_assertions::assert_eq;
use sandcastle_config::Policy;
use serial_test::serial;
use tempfile::TempDir;

use super::*;
use crate::shell::{join_quoted, quote};

/// Run `script` with `/bin/sh -c` and return its stdout.
fn sh(script: &str) -> String {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(script)
        .output()
        .expect("failed to run /bin/sh");
    assert!(output.status.success(), "script failed: {script}");
    String::from_utf8(output.stdout).unwrap()
}

// =============================================================================
// Shell quoting
// =============================================================================

#[test]
fn test_quote_leaves_plain_tokens_bare() {
    assert_eq!(quote("echo"), "echo");
    assert_eq!(quote("/usr/bin/env"), "/usr/bin/env");
    assert_eq!(quote("--flag-name"), "--flag-name");
}

#[test]
fn test_quote_wraps_special_tokens() {
    assert_eq!(quote(""), "''");
    assert_eq!(quote("hi there"), "'hi there'");
    assert_eq!(quote("$HOME"), "'$HOME'");
    assert_eq!(quote("it's"), "'it'\\''s'");
    assert_eq!(quote("FOO=bar"), "'FOO=bar'");
}

#[test]
fn test_join_quoted() {
    assert_eq!(join_quoted(&["echo", "hi there"]), "echo 'hi there'");
    assert_eq!(join_quoted::<&str>(&[]), "");
}

#[cfg(unix)]
#[test]
fn test_quote_survives_posix_shell() {
    let tokens = [
        "plain",
        "hi there",
        "it's",
        "''",
        "$HOME and $(whoami)",
        "`date`",
        "*.rs ?[a]",
        "back\\slash",
        "tab\tnew\nline",
        "semi;colon && pipe | amp &",
        "",
        "ünïcödé",
    ];

    for token in tokens {
        let echoed = sh(&format!("printf %s {}", quote(token)));
        assert_eq!(echoed, token);
    }
}

#[cfg(unix)]
#[test]
fn test_quote_is_safe_when_nested() {
    let inner = join_quoted(&["printf", "%s|", "a b", "it's"]);
    let outer = format!("/bin/sh -c {}", quote(&inner));
    assert_eq!(sh(&outer), "a b|it's|");
}

// =============================================================================
// Scratch directories
// =============================================================================

#[test]
fn test_created_scratch_dir_is_owned_and_removed() {
    let root = TempDir::new().unwrap();
    let scratch = ScratchDir::create_in(root.path()).unwrap();

    assert!(scratch.owns_lifecycle());
    assert!(scratch.path().is_dir());
    assert!(scratch.path().is_absolute());
    assert!(scratch.path().starts_with(root.path()));

    let path = scratch.path().to_path_buf();
    fs::write(path.join("leftover.txt"), "data").unwrap();
    fs::create_dir_all(path.join("nested/deeper")).unwrap();

    scratch.release();
    assert!(!path.exists());
}

#[test]
fn test_scratch_dirs_are_unique() {
    let root = TempDir::new().unwrap();
    let a = ScratchDir::create_in(root.path()).unwrap();
    let b = ScratchDir::create_in(root.path()).unwrap();
    assert_ne!(a.path(), b.path());
}

#[test]
fn test_dropped_scratch_dir_is_removed() {
    let root = TempDir::new().unwrap();
    let scratch = ScratchDir::create_in(root.path()).unwrap();
    let path = scratch.path().to_path_buf();

    drop(scratch);
    assert!(!path.exists());
}

#[test]
fn test_adopted_scratch_dir_is_created_and_kept() {
    let root = TempDir::new().unwrap();
    let explicit = root.path().join("a/b/scratch");

    let scratch = ScratchDir::acquire(Some(&explicit)).unwrap();
    assert!(!scratch.owns_lifecycle());
    assert!(explicit.is_dir());

    // Adopting an existing directory is idempotent.
    let again = ScratchDir::acquire(Some(&explicit)).unwrap();
    assert_eq!(again.path(), scratch.path());

    scratch.release();
    again.release();
    assert!(explicit.is_dir());
}

#[test]
fn test_adopt_fails_when_path_is_a_file() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("not-a-dir");
    fs::write(&file, "").unwrap();

    let err = ScratchDir::adopt(&file).unwrap_err();
    assert!(matches!(err, SandboxError::Scratch { .. }));
}

#[test]
#[serial]
fn test_scratch_root_env_override() {
    let root = TempDir::new().unwrap();
    let custom_root = root.path().join("custom-root");

    // SAFETY: tests touching the environment are serialized.
    unsafe { std::env::set_var(SCRATCH_ROOT_ENV, &custom_root) };
    let scratch = ScratchDir::acquire(None);
    unsafe { std::env::remove_var(SCRATCH_ROOT_ENV) };

    let scratch = scratch.unwrap();
    assert!(scratch.owns_lifecycle());
    assert!(scratch.path().starts_with(&custom_root));
    scratch.release();
}

#[test]
#[serial]
fn test_scratch_root_defaults_to_temp_dir() {
    // SAFETY: tests touching the environment are serialized.
    unsafe { std::env::remove_var(SCRATCH_ROOT_ENV) };
    assert_eq!(scratch_root(), std::env::temp_dir());

    unsafe { std::env::set_var(SCRATCH_ROOT_ENV, "") };
    assert_eq!(scratch_root(), std::env::temp_dir());
    unsafe { std::env::remove_var(SCRATCH_ROOT_ENV) };
}

// =============================================================================
// ExternalEnforcerAdapter
// =============================================================================

fn sample_policy() -> Policy {
    Policy::builder()
        .allow_domain("github.com")
        .deny_write(".git")
        .build()
}

#[tokio::test]
async fn test_wrap_before_initialize_fails() {
    let adapter = ExternalEnforcerAdapter::new(None);
    let err = adapter.wrap_command("true").await.unwrap_err();
    assert!(matches!(err, SandboxError::NotInitialized));
    assert!(adapter.network_restriction().is_none());
}

#[tokio::test]
async fn test_initialize_twice_fails() {
    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(None);
    adapter.set_scratch_directory(scratch.path());

    adapter.initialize(&Policy::default()).await.unwrap();
    let err = adapter.initialize(&Policy::default()).await.unwrap_err();
    assert!(matches!(err, SandboxError::AlreadyInitialized));
}

#[tokio::test]
async fn test_initialize_writes_policy_file() {
    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(None);
    adapter.set_scratch_directory(scratch.path());
    assert!(adapter.policy_file().is_none());

    adapter.initialize(&sample_policy()).await.unwrap();

    let policy_file = adapter.policy_file().unwrap();
    let written = fs::read_to_string(&policy_file).unwrap();
    let parsed: Policy = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed, sample_policy());
    assert_eq!(
        adapter.network_restriction(),
        Some(sample_policy().network)
    );
}

#[tokio::test]
async fn test_policy_file_is_outside_scratch_dir() {
    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(None);
    adapter.set_scratch_directory(scratch.path());
    adapter.initialize(&sample_policy()).await.unwrap();

    let policy_file = adapter.policy_file().unwrap();
    assert!(!policy_file.starts_with(scratch.path()));
    assert!(!scratch.path().join(POLICY_FILE_NAME).exists());
}

#[tokio::test]
async fn test_missing_enforcer_is_fatal() {
    let scratch = TempDir::new().unwrap();
    let mut adapter =
        ExternalEnforcerAdapter::new(Some("sandcastle-enforcer-that-does-not-exist".into()));
    adapter.set_scratch_directory(scratch.path());

    let err = adapter.initialize(&Policy::default()).await.unwrap_err();
    assert!(matches!(err, SandboxError::EnforcerNotFound { .. }));
    assert!(adapter.policy().is_none());
}

#[tokio::test]
async fn test_blank_enforcer_means_none() {
    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(Some("  ".into()));
    adapter.set_scratch_directory(scratch.path());

    adapter.initialize(&Policy::default()).await.unwrap();
    assert!(adapter.enforcer_path().is_none());
}

#[tokio::test]
async fn test_wrap_without_enforcer_sets_tmpdir() {
    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(None);
    adapter.set_scratch_directory(scratch.path());
    adapter.initialize(&Policy::default()).await.unwrap();

    let wrapped = adapter.wrap_command("echo 'hi there'").await.unwrap();
    assert_eq!(
        wrapped,
        format!(
            "export TMPDIR={}; exec /bin/sh -c {}",
            quote(&scratch.path().to_string_lossy()),
            quote("echo 'hi there'")
        )
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_wrapped_command_runs_in_shell_with_scratch_tmpdir() {
    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(None);
    adapter.set_scratch_directory(scratch.path());
    adapter.initialize(&Policy::default()).await.unwrap();

    let wrapped = adapter.wrap_command("printf %s \"$TMPDIR\"").await.unwrap();
    assert_eq!(sh(&wrapped), scratch.path().to_string_lossy());
}

#[cfg(unix)]
#[tokio::test]
async fn test_wrap_with_enforcer_invokes_it() {
    use std::os::unix::fs::PermissionsExt;

    let scratch = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();
    let enforcer = bin.path().join("fake-enforcer");
    // Checks the calling convention, then runs the command unrestricted.
    fs::write(
        &enforcer,
        "#!/bin/sh\n\
         [ \"$1\" = --policy-file ] || exit 90\n\
         [ -f \"$2\" ] || exit 91\n\
         [ \"$3\" = -- ] || exit 92\n\
         shift 3\n\
         printf 'enforced:'\n\
         exec \"$@\"\n",
    )
    .unwrap();
    fs::set_permissions(&enforcer, fs::Permissions::from_mode(0o755)).unwrap();

    let mut adapter = ExternalEnforcerAdapter::new(Some(enforcer.to_string_lossy().into_owned()));
    adapter.set_scratch_directory(scratch.path());
    adapter.initialize(&sample_policy()).await.unwrap();
    assert_eq!(adapter.enforcer_path(), Some(enforcer.as_path()));

    let wrapped = adapter
        .wrap_command(&join_quoted(&["printf", "%s", "it's sandboxed"]))
        .await
        .unwrap();
    assert_eq!(sh(&wrapped), "enforced:it's sandboxed");
}

#[tokio::test]
async fn test_update_config_rewrites_policy_file() {
    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(None);
    adapter.set_scratch_directory(scratch.path());
    adapter.initialize(&Policy::default()).await.unwrap();

    let updated = sample_policy();
    adapter.update_config(&updated);

    let policy_file = adapter.policy_file().unwrap();
    let written = fs::read_to_string(&policy_file).unwrap();
    let parsed: Policy = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed, updated);
    assert_eq!(adapter.policy(), Some(updated));
    assert!(!policy_file.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_update_after_cleanup_stays_in_memory() {
    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(None);
    adapter.set_scratch_directory(scratch.path());
    adapter.initialize(&Policy::default()).await.unwrap();

    let policy_file = adapter.policy_file().unwrap();
    adapter.cleanup_after_command();
    assert!(!policy_file.exists());
    assert!(adapter.policy_file().is_none());

    // Best effort: the in-memory policy still changes.
    adapter.update_config(&sample_policy());
    assert_eq!(adapter.policy(), Some(sample_policy()));
    assert!(!policy_file.exists());
}

#[test]
fn test_update_before_initialize_is_ignored() {
    let adapter = ExternalEnforcerAdapter::new(None);
    adapter.update_config(&sample_policy());
    assert!(adapter.policy().is_none());
}

#[tokio::test]
async fn test_cleanup_after_command_is_idempotent() {
    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(None);
    adapter.set_scratch_directory(scratch.path());
    adapter.initialize(&Policy::default()).await.unwrap();
    adapter.wrap_command("true").await.unwrap();

    adapter.cleanup_after_command();
    adapter.cleanup_after_command();
    assert!(adapter.policy_file().is_none());
    // The caller's scratch directory is not the adapter's to remove.
    assert!(scratch.path().is_dir());
    // Cleanup without a wrapped command is also fine.
    ExternalEnforcerAdapter::new(None).cleanup_after_command();
}

#[cfg(unix)]
#[tokio::test]
async fn test_wrapped_command_keeps_signal_status() {
    use std::os::unix::process::ExitStatusExt;

    let scratch = TempDir::new().unwrap();
    let mut adapter = ExternalEnforcerAdapter::new(None);
    adapter.set_scratch_directory(scratch.path());
    adapter.initialize(&Policy::default()).await.unwrap();

    let inner = join_quoted(&["sh", "-c", "kill -KILL $$"]);
    let wrapped = adapter.wrap_command(&inner).await.unwrap();
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(&wrapped)
        .status()
        .unwrap();

    // No intermediate shell turns the signal into exit code 137.
    assert_eq!(status.signal(), Some(9));
    assert_eq!(status.code(), None);
}

#[test]
fn test_sandbox_error_display() {
    let err = SandboxError::EnforcerNotFound {
        program: "srt-enforce".to_string(),
        message: "cannot find binary path".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Sandbox enforcer 'srt-enforce' not found: cannot find binary path"
    );
}
