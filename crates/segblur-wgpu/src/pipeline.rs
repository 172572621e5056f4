//! Per-frame pipeline orchestration
//!
//! [`BlurPipeline`] drives one frame at a time through import, downscale,
//! segmentation, blur and (optionally) compositing, and hands the result back
//! as a new [`VideoFrame`] with the incoming timing. Any failure drops the
//! frame and leaves the pipeline ready for the next one.

use tracing::Instrument;

use crate::blur::BlurEngine;
use crate::compositor::Compositor;
use crate::config::{BLUR_KERNEL_SIZE, OutputRoute, PROCESSING_FLOOR, PipelineConfig, PipelineVariant, SourceBinding};
use crate::error::{FrameError, PipelineError};
use crate::frame::{FrameStage, VideoFrame};
use crate::gpu::GpuState;
use crate::resource_cache::CacheStats;
use crate::segmentation::{SegmentationBridge, SegmentationOutcome, Segmenter, select_route};
use crate::surface::{OffscreenSurface, SurfaceConfiguration, surface_format, surface_usage};

/// Counters describing the work a pipeline has done
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_rendered: u64,
    pub frames_dropped: u64,
    pub downscale_dispatches: u64,
    pub blur_invocations: u64,
    pub composite_draws: u64,
    pub cpu_readbacks: u64,
    pub gpu_inferences: u64,
    pub surface_reconfigurations: u64,
    /// Texture cache statistics
    pub textures: CacheStats,
    /// Buffer cache statistics
    pub buffers: CacheStats,
}

/// Segmentation-guided blur pipeline for a single video stream
pub struct BlurPipeline<S: Segmenter, B: BlurEngine> {
    gpu: GpuState,
    surface: OffscreenSurface,
    segmenter: S,
    blur: B,
    bridge: SegmentationBridge,
    compositor: Compositor,
    config: PipelineConfig,
    variant: PipelineVariant,
    stats: PipelineStats,
}

impl<S: Segmenter, B: BlurEngine> BlurPipeline<S, B> {
    /// Creates a pipeline rendering into `surface`
    ///
    /// # Arguments
    /// * `device` - Device all pipeline resources are created on
    /// * `queue` - Queue of `device`
    /// * `surface` - Presentation surface, configured at 1280x720 until the first frame arrives
    /// * `segmenter` - Person-segmentation model
    /// * `blur` - Masked blur implementation
    /// * `config` - Session configuration
    ///
    /// # Errors
    /// Returns [`PipelineError::Config`] if the segmentation size is empty or
    /// exceeds the device's texture limit.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, mut surface: OffscreenSurface, segmenter: S, blur: B, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate(device.limits().max_texture_dimension_2d)?;
        let variant = config.variant();

        let features = device.features();
        if variant.output == OutputRoute::Direct
            && surface.preferred_format() == wgpu::TextureFormat::Bgra8Unorm
            && !features.contains(wgpu::Features::BGRA8UNORM_STORAGE)
        {
            tracing::warn!("device lacks BGRA8UNORM_STORAGE; direct output into a Bgra8Unorm surface will fail");
        }

        surface.configure(SurfaceConfiguration {
            width: PROCESSING_FLOOR.0,
            height: PROCESSING_FLOOR.1,
            format: surface_format(surface.preferred_format(), variant.output),
            usage: surface_usage(variant.output),
        });

        tracing::info!(
            source = variant.source.name(),
            output = variant.output.name(),
            segmentation_width = config.segmentation_width,
            segmentation_height = config.segmentation_height,
            "blur pipeline created"
        );

        let compositor = Compositor::new(&device);

        Ok(Self {
            gpu: GpuState::new(device, queue),
            surface,
            segmenter,
            blur,
            bridge: SegmentationBridge::new(config.segmentation_size()),
            compositor,
            config,
            variant,
            stats: PipelineStats::default(),
        })
    }

    /// Renders one frame
    ///
    /// Returns `None` if the frame was dropped; the reason is logged and
    /// counted in [`PipelineStats::frames_dropped`].
    pub async fn render(&mut self, frame: &VideoFrame) -> Option<VideoFrame> {
        let span = tracing::debug_span!("frame", timestamp = ?frame.timestamp);

        match self.render_frame(frame).instrument(span.clone()).await {
            Ok(output) => {
                self.stats.frames_rendered += 1;
                Some(output)
            }
            Err(error) => {
                span.in_scope(|| tracing::warn!(stage = %self.gpu.stage(), %error, "dropping frame"));
                self.gpu.unwind_scopes().await;
                self.gpu.reset();
                self.stats.frames_dropped += 1;
                None
            }
        }
    }

    async fn render_frame(&mut self, frame: &VideoFrame) -> Result<VideoFrame, FrameError> {
        self.gpu.advance(FrameStage::Importing);

        let processing_size = frame.processing_size();
        self.ensure_surface(processing_size);
        self.blur.set_input_dimensions(processing_size.0, processing_size.1);

        self.gpu.begin_scope();
        let source = match self.variant.source {
            SourceBinding::Imported => frame.texture.clone(),
            SourceBinding::Copied => self.copy_source(frame)?,
        };
        self.gpu.end_scope().await?;

        let route = select_route(self.segmenter.capabilities());
        tracing::debug!(route = route.name(), "segmentation route");

        let mut outcome = SegmentationOutcome::default();
        let mask = self
            .bridge
            .run(
                &mut self.gpu,
                &mut self.segmenter,
                route,
                &source,
                self.variant.source,
                self.config.segmentation_size(),
                &mut outcome,
            )
            .await;
        self.stats.downscale_dispatches += outcome.downscale_dispatches;
        self.stats.cpu_readbacks += outcome.cpu_readbacks;
        self.stats.gpu_inferences += outcome.gpu_inferences;
        let mask = mask?;

        self.gpu.advance(FrameStage::Blurring);
        self.gpu.begin_scope();
        let surface_frame = self.surface.acquire(&self.gpu.device)?;
        let destination = match self.variant.output {
            OutputRoute::Direct => surface_frame.texture.clone(),
            OutputRoute::Composited => self.gpu.cached_texture(
                "blur-output",
                processing_size,
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            ),
        };

        let mut encoder = self.gpu.create_encoder("Blur");
        let blurred = self.blur.blur(&mut encoder, &source, &mask, &destination, BLUR_KERNEL_SIZE);
        self.stats.blur_invocations += 1;
        blurred?;
        self.gpu.submit(encoder);
        self.gpu.end_scope().await?;

        match self.variant.output {
            OutputRoute::Composited => {
                self.gpu.advance(FrameStage::Compositing);
                self.gpu.begin_scope();

                let mut encoder = self.gpu.create_encoder("Compositor");
                self.compositor.encode(
                    &self.gpu.device,
                    &self.gpu.queue,
                    &mut self.gpu.shaders,
                    &mut encoder,
                    &destination,
                    &surface_frame.texture,
                );
                self.gpu.submit(encoder);

                self.gpu.end_scope().await?;
                self.stats.composite_draws += 1;
            }
            OutputRoute::Direct => self.gpu.advance(FrameStage::Done),
        }

        self.gpu.advance(FrameStage::Presenting);
        let texture = self.surface.present(surface_frame)?;
        self.gpu.advance(FrameStage::Idle);

        Ok(VideoFrame {
            texture,
            display_size: Some(processing_size),
            timestamp: frame.timestamp,
            duration: frame.duration,
        })
    }

    /// Reconfigures the surface if the processing size changed
    fn ensure_surface(&mut self, (width, height): (u32, u32)) {
        if self.surface.configured_size() == Some((width, height)) {
            return;
        }

        self.surface.configure(SurfaceConfiguration {
            width,
            height,
            format: surface_format(self.surface.preferred_format(), self.variant.output),
            usage: surface_usage(self.variant.output),
        });
        self.stats.surface_reconfigurations += 1;
    }

    /// Copies the whole incoming frame into the persistent `source-copy` texture
    ///
    /// The copy matches the frame texture, not the processing size, so both
    /// source bindings sample the same image.
    fn copy_source(&mut self, frame: &VideoFrame) -> Result<wgpu::Texture, FrameError> {
        if !frame.texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
            return Err(FrameError::SourceNotCopyable);
        }

        let copy = self.gpu.cached_texture(
            "source-copy",
            (frame.width(), frame.height()),
            frame.texture.format(),
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );

        let mut encoder = self.gpu.create_encoder("Source Copy");
        encoder.copy_texture_to_texture(
            frame.texture.as_image_copy(),
            copy.as_image_copy(),
            frame.texture.size(),
        );
        self.gpu.submit(encoder);

        Ok(copy)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            textures: self.gpu.textures.stats(),
            buffers: self.gpu.buffers.stats(),
            ..self.stats
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    pub fn surface(&self) -> &OffscreenSurface {
        &self.surface
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.gpu.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.gpu.queue
    }

    /// Stage of the frame in flight; `Idle` between frames
    pub fn frame_stage(&self) -> FrameStage {
        self.gpu.stage()
    }

    /// Number of shader pipelines compiled so far
    pub fn compiled_pipelines(&self) -> usize {
        self.gpu.shaders.compiled_pipelines()
    }

    pub fn segmenter(&self) -> &S {
        &self.segmenter
    }

    pub fn segmenter_mut(&mut self) -> &mut S {
        &mut self.segmenter
    }

    pub fn blur_engine(&self) -> &B {
        &self.blur
    }

    pub fn blur_engine_mut(&mut self) -> &mut B {
        &mut self.blur
    }
}

impl<S: Segmenter, B: BlurEngine> std::fmt::Debug for BlurPipeline<S, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlurPipeline")
            .field("config", &self.config)
            .field("variant", &self.variant)
            .field("stage", &self.gpu.stage())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
