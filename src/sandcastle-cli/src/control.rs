//! Live Config Channel.
//!
//! The parent process may hand the supervisor a readable descriptor carrying
//! newline-delimited JSON policy fragments. Each line is merged into the
//! [`ActivePolicy`] and pushed to the adapter. Bad lines are skipped without
//! ending the stream.

use std::fs::File;
use std::os::fd::{FromRawFd, RawFd};
use std::sync::Arc;

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, fcntl};
use sandcastle_config::{ActivePolicy, Policy, PolicyUpdate};
use sandcastle_sandbox::SandboxAdapter;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control descriptor {fd} is not open: {source}")]
    InvalidDescriptor {
        fd: RawFd,
        #[source]
        source: Errno,
    },

    #[error("control channel read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters for the lines seen by one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub applied: usize,
    pub ignored: usize,
    pub rejected: usize,
}

impl ChannelStats {
    fn record(&mut self, outcome: LineOutcome) {
        match outcome {
            LineOutcome::Applied => self.applied += 1,
            LineOutcome::Ignored => self.ignored += 1,
            LineOutcome::Rejected => self.rejected += 1,
        }
    }
}

/// What happened to a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Merged into the active policy and forwarded to the adapter.
    Applied,
    /// Blank line.
    Ignored,
    /// Not UTF-8, not JSON, or not an object.
    Rejected,
}

/// An opened control stream that has not started reading yet.
pub struct ControlChannel {
    label: String,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl ControlChannel {
    /// Adopt the inherited descriptor `fd`.
    ///
    /// Fails if `fd` is not an open descriptor. On success the channel owns
    /// it and closes it when reading ends.
    pub fn open(fd: RawFd) -> Result<Self, ControlError> {
        fcntl(fd, FcntlArg::F_GETFD)
            .map_err(|source| ControlError::InvalidDescriptor { fd, source })?;

        // SAFETY: `fd` is open and was handed to this process for our
        // exclusive use; nothing else in the process closes it.
        let file = unsafe { File::from_raw_fd(fd) };

        Ok(Self {
            label: format!("fd {fd}"),
            reader: Box::new(tokio::fs::File::from_std(file)),
        })
    }

    /// Wrap an arbitrary byte stream.
    pub fn from_reader(
        label: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            reader: Box::new(reader),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Start reading in a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self, policy: ActivePolicy, adapter: Arc<dyn SandboxAdapter>) -> ControlHandle {
        let Self { label, reader } = self;
        debug!("Listening for config updates on control {label}");

        let task = tokio::spawn(async move {
            let stats = process_lines(BufReader::new(reader), &policy, &adapter).await;
            debug!(
                "Control {label} finished: {} applied, {} ignored, {} rejected",
                stats.applied, stats.ignored, stats.rejected
            );
            stats
        });

        ControlHandle { task }
    }
}

/// Handle to a running control reader.
#[derive(Debug)]
pub struct ControlHandle {
    task: JoinHandle<ChannelStats>,
}

impl ControlHandle {
    /// Stop reading. Lines not yet processed are dropped.
    pub fn close(self) {
        self.task.abort();
    }

    /// Wait for the stream to reach end-of-file.
    pub async fn wait(self) -> Option<ChannelStats> {
        self.task.await.ok()
    }
}

/// Read lines from `reader` until end-of-file or a read error.
///
/// Lines are applied strictly in arrival order. The adapter receives each
/// update on the blocking pool, since it may write files.
pub async fn process_lines<R>(
    mut reader: R,
    policy: &ActivePolicy,
    adapter: &Arc<dyn SandboxAdapter>,
) -> ChannelStats
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ChannelStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match next_line(&mut reader, &mut buf).await {
            Ok(true) => {
                let (outcome, next) = merge_line(&buf, policy);
                if let Some(next) = next {
                    push_update(adapter, next).await;
                }
                stats.record(outcome);
            }
            Ok(false) => {
                debug!("Control channel reached end of stream");
                break;
            }
            Err(e) => {
                debug!("{e}");
                break;
            }
        }
    }

    stats
}

async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool, ControlError>
where
    R: AsyncBufRead + Unpin,
{
    let read = reader.read_until(b'\n', buf).await?;
    Ok(read > 0)
}

async fn push_update(adapter: &Arc<dyn SandboxAdapter>, policy: Policy) {
    let adapter = Arc::clone(adapter);
    if let Err(e) = tokio::task::spawn_blocking(move || adapter.update_config(&policy)).await {
        debug!("Policy update was not delivered: {e}");
    }
}

/// Apply one raw line (with or without its terminator).
pub fn apply_line(raw: &[u8], policy: &ActivePolicy, adapter: &dyn SandboxAdapter) -> LineOutcome {
    let (outcome, next) = merge_line(raw, policy);
    if let Some(next) = next {
        adapter.update_config(&next);
    }
    outcome
}

/// Parse one raw line and merge it into `policy`.
///
/// Returns the new effective policy when the line was applied.
fn merge_line(raw: &[u8], policy: &ActivePolicy) -> (LineOutcome, Option<Policy>) {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

    let Ok(line) = std::str::from_utf8(raw) else {
        debug!(
            "Invalid config on control fd (ignored): {}",
            String::from_utf8_lossy(raw)
        );
        return (LineOutcome::Rejected, None);
    };

    match PolicyUpdate::parse_line(line) {
        Ok(None) => (LineOutcome::Ignored, None),
        Ok(Some(update)) => {
            let next = policy.apply(update);
            debug!(
                "Config updated from control fd: {}",
                serde_json::to_string(&next).unwrap_or_default()
            );
            (LineOutcome::Applied, Some(next))
        }
        Err(e) => {
            debug!("Invalid config on control fd (ignored): {line} ({e})");
            (LineOutcome::Rejected, None)
        }
    }
}
