//! Video frames and per-frame processing state

use std::fmt;
use std::time::Duration;

use crate::config::PROCESSING_FLOOR;

/// A video frame exchanged with the pipeline
///
/// Incoming frames are owned by the caller; outgoing frames wrap the surface
/// texture the pipeline rendered into and carry over the incoming timing.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame pixels
    pub texture: wgpu::Texture,
    /// Size the frame is displayed at, if the source reports one
    pub display_size: Option<(u32, u32)>,
    /// Presentation timestamp
    pub timestamp: Duration,
    /// Frame duration, if known
    pub duration: Option<Duration>,
}

impl VideoFrame {
    pub fn new(texture: wgpu::Texture, timestamp: Duration) -> Self {
        Self {
            texture,
            display_size: None,
            timestamp,
            duration: None,
        }
    }

    pub fn with_display_size(mut self, width: u32, height: u32) -> Self {
        self.display_size = Some((width, height));
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Resolution the frame is processed at
    pub fn processing_size(&self) -> (u32, u32) {
        resolve_processing_size(self.display_size)
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }
}

/// Processing resolution for a frame reporting `display_size`
///
/// Frames without a usable display size are processed at [`PROCESSING_FLOOR`].
pub fn resolve_processing_size(display_size: Option<(u32, u32)>) -> (u32, u32) {
    match display_size {
        Some((width, height)) if width > 0 && height > 0 => (width, height),
        _ => PROCESSING_FLOOR,
    }
}

/// Stage of the frame currently being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameStage {
    #[default]
    Idle,
    Importing,
    Downscaling,
    Segmenting,
    MaskReady,
    Blurring,
    Compositing,
    Done,
    Presenting,
}

impl FrameStage {
    pub fn name(&self) -> &'static str {
        match self {
            FrameStage::Idle => "idle",
            FrameStage::Importing => "importing",
            FrameStage::Downscaling => "downscaling",
            FrameStage::Segmenting => "segmenting",
            FrameStage::MaskReady => "mask-ready",
            FrameStage::Blurring => "blurring",
            FrameStage::Compositing => "compositing",
            FrameStage::Done => "done",
            FrameStage::Presenting => "presenting",
        }
    }

    /// Whether `next` is a legal successor of this stage
    pub fn can_advance_to(&self, next: FrameStage) -> bool {
        use FrameStage::*;

        matches!(
            (*self, next),
            (Idle, Importing)
                | (Importing, Downscaling)
                | (Downscaling, Segmenting)
                | (Segmenting, MaskReady)
                | (MaskReady, Blurring)
                | (Blurring, Compositing)
                | (Blurring, Done)
                | (Compositing, Presenting)
                | (Done, Presenting)
                | (Presenting, Idle)
        )
    }
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
