//! One-shot batch runner over the uploads directory.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::processor::ImageProcessor;
use crate::scan::{list_images, ScanError};

#[derive(Debug, Error)]
pub enum BatchError {
    /// The directory itself could not be listed; the only fatal batch error
    #[error(transparent)]
    List(#[from] ScanError),
}

/// Per-file result line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub path: PathBuf,
    pub ok: bool,
    pub error: Option<String>,
}

/// Aggregate counts of a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    /// Files present but filtered out by extension
    pub skipped: usize,
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn found(&self) -> usize {
        self.processed + self.failed
    }
}

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchEvent<'a> {
    /// Listing finished; `images` files will be processed.
    Started { images: usize, skipped: usize },
    /// One file finished, successfully or not.
    Item(&'a BatchItem),
}

/// Watermark every supported image directly inside `dir`.
///
/// Files are processed sequentially in file-name order. A failure on one
/// file is logged and counted; the batch continues with the next file.
pub fn run_batch<P: ImageProcessor + ?Sized>(
    dir: &Path,
    text: &str,
    processor: &P,
) -> Result<BatchReport, BatchError> {
    run_batch_with_progress(dir, text, processor, |_| {})
}

/// Same as [`run_batch`], calling `on_event` as soon as each step completes.
pub fn run_batch_with_progress<P, F>(
    dir: &Path,
    text: &str,
    processor: &P,
    mut on_event: F,
) -> Result<BatchReport, BatchError>
where
    P: ImageProcessor + ?Sized,
    F: FnMut(BatchEvent<'_>),
{
    let listing = list_images(dir)?;

    let mut report = BatchReport {
        skipped: listing.skipped.len(),
        ..BatchReport::default()
    };

    tracing::info!(
        dir = %dir.display(),
        images = listing.candidates.len(),
        skipped = report.skipped,
        "starting batch"
    );
    on_event(BatchEvent::Started {
        images: listing.candidates.len(),
        skipped: report.skipped,
    });

    for candidate in listing.candidates {
        let item = match processor.process(&candidate.path, text) {
            Ok(_) => {
                report.processed += 1;
                BatchItem {
                    path: candidate.path,
                    ok: true,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(path = %candidate.path.display(), error = %e, "watermark failed");
                report.failed += 1;
                BatchItem {
                    path: candidate.path,
                    ok: false,
                    error: Some(e.to_string()),
                }
            }
        };
        on_event(BatchEvent::Item(&item));
        report.items.push(item);
    }

    Ok(report)
}
