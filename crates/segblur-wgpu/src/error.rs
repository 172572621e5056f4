//! Error types for segblur-wgpu
//!
//! Construction errors ([`InitError`], [`ConfigError`], [`PipelineError`]) are
//! fatal. Everything that can go wrong while a frame is in flight is a
//! [`FrameError`], which the pipeline logs before dropping the frame.

use crate::frame::FrameStage;

/// Errors raised while acquiring an adapter and device
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("No suitable GPU adapter found: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("Failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

/// Invalid pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Segmentation size must be non-zero, got {width}x{height}")]
    EmptySegmentationSize { width: u32, height: u32 },
    #[error("Segmentation size {width}x{height} exceeds the device texture limit of {limit}")]
    SegmentationSizeTooLarge { width: u32, height: u32, limit: u32 },
}

/// Errors aborting pipeline construction
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors reported by a segmentation collaborator
#[derive(Debug, thiserror::Error)]
pub enum SegmenterError {
    #[error("Segmenter does not support {operation}")]
    Unsupported { operation: &'static str },
    #[error("Segmentation inference failed: {0}")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("{0}")]
    Failed(String),
}

/// Errors reported by a blur collaborator
#[derive(Debug, thiserror::Error)]
pub enum BlurError {
    #[error("Blur input dimensions were not set before blurring")]
    DimensionsNotSet,
    #[error("Blur engine failed: {0}")]
    Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("{0}")]
    Failed(String),
}

/// Errors raised by the presentation surface
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("Surface has not been configured")]
    Unconfigured,
    #[error("Surface frame from configuration generation {frame} used after reconfiguration to generation {current}")]
    StaleFrame { frame: u64, current: u64 },
}

/// Errors that cause a single frame to be dropped
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("GPU error during {stage}: {message}")]
    Gpu { stage: FrameStage, message: String },
    #[error("Frame texture must have COPY_SRC usage when zero-copy import is disabled")]
    SourceNotCopyable,
    #[error("Segmenter input buffer holds {actual} bytes, {required} required")]
    InputBufferTooSmall { required: u64, actual: u64 },
    #[error("Segmenter output buffer holds {actual} bytes, {required} required")]
    OutputBufferTooSmall { required: u64, actual: u64 },
    #[error("Segmenter returned an empty {width}x{height} mask")]
    EmptyMask { width: u32, height: u32 },
    #[error("Readback channel closed before the buffer was mapped")]
    ReadbackCancelled,
    #[error(transparent)]
    Segmenter(#[from] SegmenterError),
    #[error(transparent)]
    Blur(#[from] BlurError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("Device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("Buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
}
