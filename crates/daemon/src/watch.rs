//! Watch daemon: watermarks images as they land in the uploads directory.
//!
//! Raw `notify` events are merged per path by `notify-debouncer-full` over a
//! short window and forwarded into the tokio runtime over an unbounded
//! channel. Each qualifying path is then debounced again with the configured
//! quiet period, claimed in the [`ProcessedSet`] and handed to the processor
//! on the blocking pool.

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tilemark_config::WatchConfig;
use tokio::sync::mpsc;

use crate::debounce::PathDebouncer;
use crate::processed::{Claim, ProcessedSet};
use crate::processor::ImageProcessor;
use crate::scan::is_image_file;

/// Window over which raw watcher events are merged before scheduling.
const COALESCE_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Watch directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// What happened when a debounced path fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Processed,
    /// Already processed or currently in flight
    Skipped,
    /// File removed before the debounce elapsed
    Vanished,
    Failed,
}

pub struct WatchDaemon<P: ImageProcessor> {
    dir: PathBuf,
    text: Arc<str>,
    processor: Arc<P>,
    processed: Arc<ProcessedSet>,
    debouncer: PathDebouncer,
}

fn is_upload_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

impl<P: ImageProcessor> WatchDaemon<P> {
    pub fn new(dir: PathBuf, text: impl Into<Arc<str>>, processor: Arc<P>, config: &WatchConfig) -> Self {
        Self {
            dir,
            text: text.into(),
            processor,
            processed: Arc::new(ProcessedSet::new(
                Duration::from_secs(config.processed_ttl_secs),
                config.processed_capacity,
            )),
            debouncer: PathDebouncer::new(Duration::from_millis(config.debounce_ms)),
        }
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    pub fn debouncer(&self) -> &PathDebouncer {
        &self.debouncer
    }

    /// Debounce the image paths of a create/modify event.
    ///
    /// Returns how many paths were scheduled.
    pub fn handle_event(&self, event: &Event) -> usize {
        self.handle_events(std::iter::once(event))
    }

    /// Debounce every image path touched by a batch of events, once per path.
    pub fn handle_events<'a, I>(&self, events: I) -> usize
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut paths = BTreeSet::new();
        for event in events {
            if !is_upload_change(&event.kind) {
                continue;
            }
            paths.extend(event.paths.iter().filter(|p| is_image_file(p)).cloned());
        }

        let scheduled = paths.len();
        for path in paths {
            self.schedule(path);
        }
        scheduled
    }

    /// Arm (or re-arm) the debounce timer for `path`.
    pub fn schedule(&self, path: PathBuf) {
        tracing::debug!(path = %path.display(), "change detected");
        let text = self.text.clone();
        let processor = self.processor.clone();
        let processed = self.processed.clone();
        self.debouncer.schedule(path, move |path| async move {
            fire(path, text, processor, processed).await;
        });
    }

    /// Watch until `shutdown` resolves, then release the watch handle.
    ///
    /// Timers still pending at shutdown are dropped.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), WatchError>
    where
        F: Future<Output = ()>,
    {
        if !self.dir.is_dir() {
            return Err(WatchError::DirectoryNotFound(self.dir.clone()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let mut watcher = new_debouncer(COALESCE_WINDOW, None, move |res: DebounceEventResult| {
            // Receiver gone means we are shutting down
            let _ = tx.send(res);
        })?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;

        tracing::info!(dir = %self.dir.display(), "watching for uploads");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                received = rx.recv() => match received {
                    Some(Ok(events)) => {
                        self.handle_events(events.iter().map(|debounced| &debounced.event));
                    }
                    Some(Err(errors)) => {
                        for e in errors {
                            tracing::warn!(error = %e, "watch error");
                        }
                    }
                    None => break,
                },
            }
        }

        drop(watcher);
        self.debouncer.cancel_all();
        tracing::info!("watch stopped");
        Ok(())
    }
}

/// Process one debounced path unless it was already handled.
async fn fire<P: ImageProcessor>(
    path: PathBuf,
    text: Arc<str>,
    processor: Arc<P>,
    processed: Arc<ProcessedSet>,
) -> FireOutcome {
    match processed.try_claim(&path) {
        Claim::Acquired => {}
        claim => {
            tracing::debug!(path = %path.display(), ?claim, "skipping");
            return FireOutcome::Skipped;
        }
    }

    let job_path = path.clone();
    let result = tokio::task::spawn_blocking(move || processor.process(&job_path, &text)).await;

    match result {
        Ok(Ok(_)) => {
            processed.complete(&path);
            FireOutcome::Processed
        }
        Ok(Err(e)) if e.is_not_found() => {
            processed.release(&path);
            tracing::debug!(path = %path.display(), "file removed before processing");
            FireOutcome::Vanished
        }
        Ok(Err(e)) => {
            processed.release(&path);
            tracing::error!(path = %path.display(), error = %e, "watermark failed");
            FireOutcome::Failed
        }
        Err(e) => {
            processed.release(&path);
            tracing::error!(path = %path.display(), error = %e, "watermark task panicked");
            FireOutcome::Failed
        }
    }
}
