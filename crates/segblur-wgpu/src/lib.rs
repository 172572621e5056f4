//! Segmentation-guided background blur for live video on wgpu
//!
//! This crate orchestrates the per-frame GPU work of a background blur
//! effect: the incoming frame is downscaled for a person-segmentation model,
//! the model's mask is materialized as a texture, and a blur engine combines
//! frame and mask into the output, either directly on the presentation
//! surface or through a full-screen compositing pass.
//!
//! The segmentation model and the blur kernel are supplied by the host
//! through the [`Segmenter`] and [`BlurEngine`] traits.
//!
//! ```no_run
//! # use segblur_wgpu::*;
//! # async fn run<S: Segmenter, B: BlurEngine>(segmenter: S, blur: B, frame: VideoFrame) -> Result<(), Box<dyn std::error::Error>> {
//! let context = GpuContext::new(&GpuContextOptions::default()).await?;
//! let surface = OffscreenSurface::new(wgpu::TextureFormat::Rgba8Unorm);
//! let mut pipeline = BlurPipeline::new(context.device, context.queue, surface, segmenter, blur, PipelineConfig::default())?;
//!
//! if let Some(output) = pipeline.render(&frame).await {
//!     assert_eq!(output.timestamp, frame.timestamp);
//! }
//! # Ok(())
//! # }
//! ```

mod blur;
mod compositor;
mod config;
mod context;
mod downscale;
mod error;
mod frame;
mod gpu;
mod pipeline;
mod segmentation;
mod surface;

pub mod readback;
pub mod resource_cache;
pub mod shaders;

pub use blur::BlurEngine;
pub use compositor::QUAD_VERTEX_COUNT;
pub use config::{BLUR_KERNEL_SIZE, DEFAULT_SEGMENTATION_SIZE, OutputRoute, PROCESSING_FLOOR, PipelineConfig, PipelineVariant, SourceBinding};
pub use context::{GpuContext, GpuContextOptions};
pub use downscale::{rgb16f_buffer_size, workgroup_count};
pub use error::{BlurError, ConfigError, FrameError, InitError, PipelineError, SegmenterError, SurfaceError};
pub use frame::{FrameStage, VideoFrame, resolve_processing_size};
pub use pipeline::{BlurPipeline, PipelineStats};
pub use segmentation::{DeviceAffinity, SegmentationRoute, Segmenter, SegmenterCapabilities, select_route};
pub use surface::{OffscreenSurface, SurfaceConfiguration, SurfaceFrame, surface_format, surface_usage};

pub use image;
pub use wgpu;
