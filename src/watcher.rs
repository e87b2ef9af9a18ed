use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::CreateKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::infer::WatchedFile;
use crate::notion::NotionApi;
use crate::publish::{PublishOutcome, Publisher};
use crate::settings::SettleSettings;

/// Names of files already handled during this run.
pub trait ProcessedStore {
    fn contains(&self, file_name: &str) -> bool;
    fn mark(&mut self, file_name: String);
}

#[derive(Debug, Default)]
pub struct InMemoryProcessed(HashSet<String>);

impl ProcessedStore for InMemoryProcessed {
    fn contains(&self, file_name: &str) -> bool {
        self.0.contains(file_name)
    }

    fn mark(&mut self, file_name: String) {
        self.0.insert(file_name);
    }
}

/// What happened to one creation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Duplicate,
    Published(String),
    Unreadable,
    MissingPageId,
    Failed,
}

pub fn is_transcript_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".txt"))
        && !path.is_dir()
}

/// Paths in a creation event that look like transcripts.
pub fn transcript_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event
            .paths
            .into_iter()
            .filter(|p| is_transcript_path(p))
            .collect(),
        _ => Vec::new(),
    }
}

/// Wait until the file is non-empty and its length has held for `settle.quiet`.
///
/// Sync clients often create the file empty and fill it later, so an empty
/// file never counts as written. Returns false if the deadline passed first;
/// the caller proceeds anyway.
pub async fn wait_for_settle(path: &Path, settle: &SettleSettings) -> bool {
    let deadline = Instant::now() + settle.timeout;
    let mut last = None;
    let mut unchanged_since = Instant::now();
    loop {
        let len = tokio::fs::metadata(path).await.ok().map(|m| m.len());
        let now = Instant::now();
        if len != last {
            last = len;
            unchanged_since = now;
        } else if len.is_some_and(|n| n > 0) && now - unchanged_since >= settle.quiet {
            return true;
        }
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(settle.poll.min(deadline - now)).await;
    }
}

/// Push the transcript paths of one watcher event to the consumer.
fn forward_event(tx: &UnboundedSender<PathBuf>, res: notify::Result<Event>) {
    match res {
        Ok(event) => {
            for path in transcript_paths(event) {
                if let Err(e) = tx.send(path) {
                    debug!("Dropping event for {}, watcher is shutting down", e.0.display());
                }
            }
        }
        Err(e) => warn!("Watch error: {}", e),
    }
}

pub struct MeetingNotesWatcher<A, S> {
    publisher: Publisher<A>,
    processed: S,
    settle: SettleSettings,
}

impl<A: NotionApi, S: ProcessedStore> MeetingNotesWatcher<A, S> {
    pub fn new(publisher: Publisher<A>, processed: S, settle: SettleSettings) -> Self {
        Self {
            publisher,
            processed,
            settle,
        }
    }

    /// Handle one created file. Never fails: errors are logged and the file is marked handled.
    pub async fn handle_path(&mut self, path: &Path) -> Disposition {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Ignoring path without a UTF-8 file name: {}", path.display());
            return Disposition::Failed;
        };
        if self.processed.contains(file_name) {
            debug!("Skipping already processed file {}", file_name);
            return Disposition::Duplicate;
        }

        info!("New meeting note detected: {}", path.display());
        if !wait_for_settle(path, &self.settle).await {
            warn!(
                "{} still changing after {:?}, reading it anyway",
                file_name, self.settle.timeout
            );
        }

        let disposition = match WatchedFile::inspect(path) {
            Some(file) => match self.publisher.publish(&file).await {
                Ok(PublishOutcome::Published { page_id, chunks }) => {
                    info!(page_id = %page_id, chunks, "Successfully uploaded {} to Notion", file_name);
                    Disposition::Published(page_id)
                }
                Ok(PublishOutcome::Unreadable) => Disposition::Unreadable,
                Ok(PublishOutcome::MissingPageId) => {
                    warn!("Page for {} was created without an id; transcript not appended", file_name);
                    Disposition::MissingPageId
                }
                Err(e) => {
                    error!("Error processing file {}: {}", file_name, e);
                    Disposition::Failed
                }
            },
            None => Disposition::Failed,
        };

        self.processed.mark(file_name.to_string());
        disposition
    }

    /// Drain paths one at a time until the channel closes or `shutdown` resolves.
    ///
    /// Shutdown is only observed between files; a publish in progress finishes first.
    pub async fn consume<F>(&mut self, mut rx: UnboundedReceiver<PathBuf>, shutdown: F)
    where
        F: Future,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopped monitoring.");
                    break;
                }
                next = rx.recv() => match next {
                    Some(path) => {
                        self.handle_path(&path).await;
                    }
                    None => break,
                },
            }
        }
    }

    /// Watch `dir` (non-recursive) until Ctrl-C.
    pub async fn run(mut self, dir: &Path) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| forward_event(&tx, res))
                .context("Failed to create file watcher")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| {
                format!(
                    "Failed to monitor {}. Please make sure it exists and is accessible",
                    dir.display()
                )
            })?;
        info!("Monitoring {} for new meeting notes...", dir.display());

        self.consume(rx, tokio::signal::ctrl_c()).await;
        drop(watcher);
        Ok(())
    }
}

// ── Tests ──
