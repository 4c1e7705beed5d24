//! Tilemark
//!
//! Tiled, rotated text watermarks for uploaded images, with three entry
//! points sharing one processor: a one-shot batch run, a directory watch
//! daemon and an HTTP endpoint.

pub mod batch;
pub mod compositor;
pub mod debounce;
pub mod pattern;
pub mod processed;
pub mod processor;
pub mod render;
pub mod sandbox;
pub mod scan;
pub mod server;
pub mod watch;

pub use tilemark_config as config;
pub use tilemark_config::Config;
pub use batch::{run_batch, run_batch_with_progress, BatchError, BatchEvent, BatchItem, BatchReport};
pub use compositor::{composite, read_info, CompositeError, Composited, ImageFormat, ImageInfo};
pub use debounce::PathDebouncer;
pub use pattern::{Overlay, PatternError, Tile, WatermarkStyle};
pub use processed::{Claim, ProcessedSet};
pub use processor::{ImageProcessor, ProcessError, ProcessReport, Processor};
pub use render::{rasterize, RenderError};
pub use sandbox::{SandboxError, SandboxPolicy};
pub use scan::{has_image_extension, is_image_file, list_images, ScanError, ScanResult, IMAGE_EXTENSIONS};
pub use server::{
    create_router, run_server, serve, AppState, ErrorResponse, ServerError, WatermarkRequest,
    WatermarkResponse, PROCESS_FAILURE_MESSAGE,
};
pub use watch::{FireOutcome, WatchDaemon, WatchError};
