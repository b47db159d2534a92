//! Watching a Markdown source for external edits

use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::debug;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Default quiet period before a change is reported
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Reports settled changes to one file, with its new contents
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<()>,
    path: PathBuf,
    debounce: Duration,
    pending_since: Option<Instant>,
}

impl SourceWatcher {
    pub fn new(path: &Path, debounce: Duration) -> Result<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve path: {}", path.display()))?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let target = path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let Ok(event) = res else { return };
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                && event.paths.iter().any(|p| p == &target)
            {
                let _ = tx.send(());
            }
        })
        .context("Failed to create file watcher")?;

        // Editors that save by atomic rename replace the file, so the parent
        // directory is watched as well
        let watch_dir = path.parent().unwrap_or(&path);
        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", watch_dir.display()))?;

        Ok(Self {
            _watcher: watcher,
            events: rx,
            path,
            debounce,
            pending_since: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a change has been seen but has not settled yet
    pub fn has_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Wait up to `timeout` for the file to change and settle, then return
    /// its contents. A change that is still settling when the timeout runs
    /// out is waited for.
    pub fn next_change(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            let wait = match self.pending_since {
                Some(since) => self.debounce.saturating_sub(now.duration_since(since)),
                None if now >= deadline => return Ok(None),
                None => deadline - now,
            };

            match self.events.recv_timeout(wait) {
                // Every event restarts the quiet period
                Ok(()) => self.pending_since = Some(Instant::now()),
                Err(RecvTimeoutError::Timeout) => {
                    if self.pending_since.take().is_some() {
                        debug!("watch: {} changed", self.path.display());
                        let text = std::fs::read_to_string(&self.path).with_context(|| {
                            format!("Failed to read file: {}", self.path.display())
                        })?;
                        return Ok(Some(text));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => bail!("File watcher stopped"),
            }
        }
    }
}
