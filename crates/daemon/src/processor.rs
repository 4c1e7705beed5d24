//! Single-file processor shared by the batch runner, the watch daemon and
//! the HTTP handler.
//!
//! A run is: extension gate -> read -> inspect -> generate overlay -> composite
//! -> write. The default destination is the source itself, so re-running on
//! the same file stacks another layer of marks.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tilemark_config::WatermarkConfig;

use crate::compositor::{composite, read_info, CompositeError, Composited, ImageFormat};
use crate::pattern::{Overlay, PatternError, WatermarkStyle};
use crate::scan::is_image_file;

/// Error type for a single processing run
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Extension is not one of the supported image types
    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedExtension(PathBuf),

    /// File vanished between discovery and read
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// File exists but could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Width/height could not be determined
    #[error("Failed to read image metadata: {0}")]
    Metadata(String),

    /// Content is not a valid supported raster image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Overlay generation or blending failed
    #[error("Failed to composite watermark: {0}")]
    Composite(String),

    /// Destination could not be written
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<CompositeError> for ProcessError {
    fn from(e: CompositeError) -> Self {
        match e {
            CompositeError::Decode(msg) => ProcessError::Decode(msg),
            CompositeError::Metadata(msg) => ProcessError::Metadata(msg),
            other => ProcessError::Composite(other.to_string()),
        }
    }
}

impl From<PatternError> for ProcessError {
    fn from(e: PatternError) -> Self {
        ProcessError::Composite(e.to_string())
    }
}

impl ProcessError {
    /// True when the file disappeared; the watch daemon drops these silently.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessError::NotFound(_))
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Anything that can watermark a file at a path.
///
/// The batch runner, watch daemon and HTTP handler depend on this rather
/// than on [`Processor`] directly.
pub trait ImageProcessor: Send + Sync + 'static {
    /// Watermark `path` in place with `text`.
    fn process(&self, path: &Path, text: &str) -> Result<ProcessReport, ProcessError>;
}

/// Watermarks image files with the configured tile pattern.
#[derive(Debug, Clone)]
pub struct Processor {
    style: WatermarkStyle,
    jpeg_quality: u8,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(WatermarkStyle::default(), 80)
    }
}

impl Processor {
    pub fn new(style: WatermarkStyle, jpeg_quality: u8) -> Self {
        Self {
            style,
            jpeg_quality,
        }
    }

    /// Build a processor from the `[watermark]` config section.
    pub fn from_config(config: &WatermarkConfig) -> Self {
        Self::new(WatermarkStyle::from_config(config), config.jpeg_quality)
    }

    /// Watermark the image bytes without touching the filesystem.
    pub fn watermark_bytes(&self, bytes: &[u8], text: &str) -> Result<Composited, ProcessError> {
        let info = read_info(bytes)?;
        let overlay = Overlay::generate(info.width, info.height, text, &self.style)?;
        Ok(composite(bytes, &overlay, self.jpeg_quality)?)
    }

    /// Watermark `source` and write the result to `destination`.
    ///
    /// `destination` may equal `source` (the in-place default). No backup is
    /// kept.
    pub fn process_to(
        &self,
        source: &Path,
        destination: &Path,
        text: &str,
    ) -> Result<ProcessReport, ProcessError> {
        if !is_image_file(source) {
            return Err(ProcessError::UnsupportedExtension(source.to_path_buf()));
        }

        let bytes = fs::read(source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProcessError::NotFound(source.to_path_buf()),
            _ => ProcessError::Read {
                path: source.to_path_buf(),
                source: e,
            },
        })?;

        let Composited { bytes: output, info } = self.watermark_bytes(&bytes, text)?;

        fs::write(destination, &output).map_err(|e| ProcessError::Write {
            path: destination.to_path_buf(),
            source: e,
        })?;

        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            format = %info.format,
            width = info.width,
            height = info.height,
            "watermarked"
        );

        Ok(ProcessReport {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            format: info.format,
            width: info.width,
            height: info.height,
            bytes_in: bytes.len() as u64,
            bytes_out: output.len() as u64,
        })
    }
}

impl ImageProcessor for Processor {
    fn process(&self, path: &Path, text: &str) -> Result<ProcessReport, ProcessError> {
        self.process_to(path, path, text)
    }
}
