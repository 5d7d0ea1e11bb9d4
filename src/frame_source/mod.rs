//! FrameSource - Video Frame Capture
//!
//! ## Responsibilities
//!
//! - Open a camera source URI into an async frame reader
//! - Deliver decoded RGB frames in capture order
//! - Release the capture handle (process, socket) on drop
//!
//! Opening is cancel-safe: dropping the `open` future before it resolves
//! releases whatever the attempt had acquired.

mod ffmpeg;
mod scripted;

pub use ffmpeg::FfmpegOpener;
pub use scripted::{ScriptedOpener, SourceScript};

use async_trait::async_trait;
use image::RgbImage;

/// One decoded frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Source-assigned sequence number, starting at 1
    pub sequence: u64,
    image: RgbImage,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self { sequence, image }
    }

    /// Build from a packed rgb24 buffer; `None` if the length mismatches
    pub fn from_rgb24(sequence: u64, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|image| Self { sequence, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Open stream of frames
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame; `Ok(None)` at end of stream
    async fn read_frame(&mut self) -> crate::Result<Option<Frame>>;
}

/// Resolves camera source URIs to frame sources
#[async_trait]
pub trait SourceOpener: Send + Sync {
    /// Open `uri` for `camera_id`; callers bound this with the connect timeout
    async fn open(&self, camera_id: &str, uri: &str) -> crate::Result<Box<dyn FrameSource>>;
}
