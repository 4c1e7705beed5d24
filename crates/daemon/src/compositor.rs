//! Compositor: applies a rasterised overlay to encoded image bytes.
//!
//! The output keeps the source's container format and dimensions. The
//! format is detected from the data itself, not from the file name.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat as CodecFormat, ImageReader};
use serde::Serialize;
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

use crate::pattern::Overlay;
use crate::render::{rasterize, RenderError};

/// Raster formats the pipeline reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
}

impl ImageFormat {
    fn from_codec(format: CodecFormat) -> Option<Self> {
        match format {
            CodecFormat::Jpeg => Some(ImageFormat::Jpeg),
            CodecFormat::Png => Some(ImageFormat::Png),
            CodecFormat::WebP => Some(ImageFormat::WebP),
            CodecFormat::Gif => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    fn codec(self) -> CodecFormat {
        match self {
            ImageFormat::Jpeg => CodecFormat::Jpeg,
            ImageFormat::Png => CodecFormat::Png,
            ImageFormat::WebP => CodecFormat::WebP,
            ImageFormat::Gif => CodecFormat::Gif,
        }
    }

    /// Detect the format from magic bytes.
    pub fn detect(bytes: &[u8]) -> Result<Self, CompositeError> {
        let guessed = image::guess_format(bytes)
            .map_err(|e| CompositeError::Decode(format!("unrecognised image data: {}", e)))?;
        Self::from_codec(guessed)
            .ok_or_else(|| CompositeError::Decode(format!("unsupported format {:?}", guessed)))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
            ImageFormat::Gif => "gif",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded image metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum CompositeError {
    /// Bytes are not a supported or valid raster image
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Header could be identified but dimensions could not be read
    #[error("Metadata unavailable: {0}")]
    Metadata(String),

    /// Overlay canvas does not match the image; a wiring bug, not bad input
    #[error("Overlay is {overlay_width}x{overlay_height} but image is {image_width}x{image_height}")]
    SizeMismatch {
        overlay_width: u32,
        overlay_height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Overlay rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Output of a successful composite.
#[derive(Debug, Clone)]
pub struct Composited {
    pub bytes: Vec<u8>,
    pub info: ImageInfo,
}

/// Read format and dimensions from the header without decoding pixels.
pub fn read_info(bytes: &[u8]) -> Result<ImageInfo, CompositeError> {
    let format = ImageFormat::detect(bytes)?;
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format.codec())
        .into_dimensions()
        .map_err(|e| CompositeError::Metadata(e.to_string()))?;

    if width == 0 || height == 0 {
        return Err(CompositeError::Metadata(format!(
            "image reports empty canvas {}x{}",
            width, height
        )));
    }

    Ok(ImageInfo {
        format,
        width,
        height,
    })
}

/// Composite `overlay` over the image in `bytes` and re-encode.
///
/// The overlay canvas equals the image canvas, so the centred placement of
/// the overlay is the origin.
///
/// Encoding notes:
/// - alpha is kept only if the source has an alpha channel (never for JPEG)
/// - WebP is written lossless
/// - only the first frame of an animated GIF survives
pub fn composite(
    bytes: &[u8],
    overlay: &Overlay,
    jpeg_quality: u8,
) -> Result<Composited, CompositeError> {
    let format = ImageFormat::detect(bytes)?;
    let source = image::load_from_memory_with_format(bytes, format.codec())
        .map_err(|e| CompositeError::Decode(e.to_string()))?;

    let (width, height) = (source.width(), source.height());
    if (overlay.width, overlay.height) != (width, height) {
        return Err(CompositeError::SizeMismatch {
            overlay_width: overlay.width,
            overlay_height: overlay.height,
            image_width: width,
            image_height: height,
        });
    }

    let has_alpha = source.color().has_alpha();
    let layer = rasterize(overlay)?;
    let mut canvas = source.into_rgba8();
    image::imageops::overlay(&mut canvas, &layer, 0, 0);

    let output = if has_alpha && format != ImageFormat::Jpeg {
        DynamicImage::ImageRgba8(canvas)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).into_rgb8())
    };

    let bytes = encode(&output, format, jpeg_quality)?;
    Ok(Composited {
        bytes,
        info: ImageInfo {
            format,
            width,
            height,
        },
    })
}

fn encode(image: &DynamicImage, format: ImageFormat, jpeg_quality: u8) -> Result<Vec<u8>, CompositeError> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality.clamp(1, 100));
            image
                .write_with_encoder(encoder)
                .map_err(|e| CompositeError::Encode(e.to_string()))?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif => {
            image
                .write_to(&mut Cursor::new(&mut buf), format.codec())
                .map_err(|e| CompositeError::Encode(e.to_string()))?;
        }
    }
    Ok(buf)
}
