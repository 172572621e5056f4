//! Segmentation bridge
//!
//! Feeds the downscaled frame to an external [`Segmenter`] and materializes the
//! resulting mask as a texture. Two protocols exist:
//!
//! - **GPU-native**: the downscale pass writes half-float RGB into a buffer
//!   that is copied into the segmenter's own input buffer; the model's f16
//!   output buffer is then copied into the `R16Float` mask texture without
//!   leaving the GPU.
//! - **CPU readback**: the downscale pass writes an `Rgba8Unorm` texture that
//!   is read back into an [`image::RgbaImage`]; the segmenter returns an RGBA
//!   mask of any size, which is uploaded into an `Rgba8Unorm` mask texture.
//!
//! The route is chosen per frame, so a segmenter may change its capabilities
//! between frames. In both cases the mask's red channel is the foreground
//! confidence.

use std::future::Future;

use crate::config::SourceBinding;
use crate::downscale::{DownscaleTarget, rgb16f_buffer_size};
use crate::error::{FrameError, SegmenterError};
use crate::frame::FrameStage;
use crate::gpu::GpuState;
use crate::readback::{RGBA8_BYTES_PER_PIXEL, padded_bytes_per_row, read_rgba8_into};

/// Bytes per texel of the `R16Float` GPU mask
const MASK_F16_BYTES_PER_PIXEL: u32 = 2;

/// Where a segmentation model runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceAffinity {
    Cpu,
    Gpu,
}

/// Capabilities a segmenter reports before every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterCapabilities {
    /// The segmenter accepts and produces GPU buffers
    pub supports_gpu_buffer: bool,
    pub device_affinity: DeviceAffinity,
}

impl SegmenterCapabilities {
    pub const CPU: Self = Self {
        supports_gpu_buffer: false,
        device_affinity: DeviceAffinity::Cpu,
    };

    pub const GPU_BUFFER: Self = Self {
        supports_gpu_buffer: true,
        device_affinity: DeviceAffinity::Gpu,
    };

    /// Whether the segmenter asks for the GPU-native protocol
    pub fn wants_gpu_native(&self) -> bool {
        self.supports_gpu_buffer && self.device_affinity == DeviceAffinity::Gpu
    }
}

/// Segmentation protocol used for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationRoute {
    GpuNative,
    CpuReadback,
}

impl SegmentationRoute {
    pub fn name(&self) -> &'static str {
        match self {
            SegmentationRoute::GpuNative => "gpu-native",
            SegmentationRoute::CpuReadback => "cpu-readback",
        }
    }
}

/// Chooses the segmentation route for a segmenter's current capabilities
pub fn select_route(capabilities: SegmenterCapabilities) -> SegmentationRoute {
    if capabilities.wants_gpu_native() {
        SegmentationRoute::GpuNative
    } else {
        SegmentationRoute::CpuReadback
    }
}

/// An external person-segmentation model
///
/// CPU segmenters only implement [`capabilities`](Segmenter::capabilities) and
/// [`segment`](Segmenter::segment). GPU segmenters additionally provide their
/// input and output buffers and run inference on the device.
pub trait Segmenter {
    fn capabilities(&self) -> SegmenterCapabilities;

    /// Buffer the downscaled half-float RGB image is copied into
    ///
    /// Must hold at least [`rgb16f_buffer_size`](crate::rgb16f_buffer_size)
    /// bytes, i.e. `width * height * 6` rounded up to a multiple of 4, and
    /// have `COPY_DST` usage.
    fn input_buffer(&mut self, device: &wgpu::Device) -> Result<wgpu::Buffer, SegmenterError> {
        let _ = device;
        Err(SegmenterError::Unsupported { operation: "input_buffer" })
    }

    /// Runs the model on the current contents of the input buffer
    fn run_inference(&mut self) -> impl Future<Output = Result<(), SegmenterError>> {
        std::future::ready(Err(SegmenterError::Unsupported { operation: "run_inference" }))
    }

    /// Buffer holding the single-channel f16 mask of the last inference
    ///
    /// Must hold at least `width * height * 2` bytes and have `COPY_SRC` usage.
    fn output_buffer(&mut self) -> Result<wgpu::Buffer, SegmenterError> {
        Err(SegmenterError::Unsupported { operation: "output_buffer" })
    }

    /// Segments an RGBA image at segmentation resolution, returning an RGBA mask of any size
    fn segment(&mut self, pixels: &image::RgbaImage) -> impl Future<Output = Result<image::RgbaImage, SegmenterError>>;
}

/// Counters the bridge reports back to the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SegmentationOutcome {
    pub downscale_dispatches: u64,
    pub cpu_readbacks: u64,
    pub gpu_inferences: u64,
}

/// Runs the downscale stage and one of the two segmentation protocols
#[derive(Debug)]
pub(crate) struct SegmentationBridge {
    pixels: image::RgbaImage,
}

impl SegmentationBridge {
    pub fn new((width, height): (u32, u32)) -> Self {
        Self {
            pixels: image::RgbaImage::new(width, height),
        }
    }

    /// Downscales `source`, runs the segmenter and returns the mask texture
    ///
    /// Expects the frame to be in [`FrameStage::Importing`] and leaves it in
    /// [`FrameStage::MaskReady`].
    #[allow(clippy::too_many_arguments)]
    pub async fn run<S: Segmenter>(
        &mut self,
        gpu: &mut GpuState,
        segmenter: &mut S,
        route: SegmentationRoute,
        source: &wgpu::Texture,
        binding: SourceBinding,
        size: (u32, u32),
        outcome: &mut SegmentationOutcome,
    ) -> Result<wgpu::Texture, FrameError> {
        let mask = match route {
            SegmentationRoute::GpuNative => self.run_gpu_native(gpu, segmenter, source, binding, size, outcome).await?,
            SegmentationRoute::CpuReadback => self.run_cpu_readback(gpu, segmenter, source, binding, size, outcome).await?,
        };
        gpu.advance(FrameStage::MaskReady);
        Ok(mask)
    }

    async fn run_gpu_native<S: Segmenter>(
        &mut self,
        gpu: &mut GpuState,
        segmenter: &mut S,
        source: &wgpu::Texture,
        binding: SourceBinding,
        (width, height): (u32, u32),
        outcome: &mut SegmentationOutcome,
    ) -> Result<wgpu::Texture, FrameError> {
        gpu.advance(FrameStage::Downscaling);
        gpu.begin_scope();

        let input_size = rgb16f_buffer_size(width, height);
        let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Segmentation Input Staging"),
            size: input_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let input = segmenter.input_buffer(&gpu.device)?;
        if input.size() < input_size {
            return Err(FrameError::InputBufferTooSmall {
                required: input_size,
                actual: input.size(),
            });
        }

        let mut encoder = gpu.create_encoder("Downscale F16");
        gpu.downscale.encode(
            &gpu.device,
            &gpu.queue,
            &mut gpu.shaders,
            &mut encoder,
            source,
            binding,
            DownscaleTarget::Buffer(&staging),
            (width, height),
        );
        encoder.copy_buffer_to_buffer(&staging, 0, &input, 0, input_size);
        gpu.submit(encoder);
        drop(staging);

        gpu.end_scope().await?;
        outcome.downscale_dispatches += 1;

        gpu.advance(FrameStage::Segmenting);
        segmenter.run_inference().await?;
        outcome.gpu_inferences += 1;

        let output = segmenter.output_buffer()?;
        let required = width as u64 * height as u64 * MASK_F16_BYTES_PER_PIXEL as u64;
        if output.size() < required {
            return Err(FrameError::OutputBufferTooSmall {
                required,
                actual: output.size(),
            });
        }

        gpu.begin_scope();
        let mask = gpu.cached_texture(
            "mask-gpu",
            (width, height),
            wgpu::TextureFormat::R16Float,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let mut encoder = gpu.create_encoder("Mask Upload");
        copy_f16_mask(&mut encoder, &output, &mask, width, height);
        gpu.submit(encoder);
        drop(output);
        gpu.end_scope().await?;

        Ok(mask)
    }

    async fn run_cpu_readback<S: Segmenter>(
        &mut self,
        gpu: &mut GpuState,
        segmenter: &mut S,
        source: &wgpu::Texture,
        binding: SourceBinding,
        (width, height): (u32, u32),
        outcome: &mut SegmentationOutcome,
    ) -> Result<wgpu::Texture, FrameError> {
        gpu.advance(FrameStage::Downscaling);
        gpu.begin_scope();

        let target = gpu.cached_texture(
            "downscale-rgba8",
            (width, height),
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
        );
        let padded_row = padded_bytes_per_row(width, RGBA8_BYTES_PER_PIXEL);
        let readback = gpu.cached_buffer("readback", padded_row, height, wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST);

        let mut encoder = gpu.create_encoder("Downscale RGBA8");
        gpu.downscale.encode(
            &gpu.device,
            &gpu.queue,
            &mut gpu.shaders,
            &mut encoder,
            source,
            binding,
            DownscaleTarget::Texture(&target),
            (width, height),
        );
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.submit(encoder);
        gpu.end_scope().await?;
        outcome.downscale_dispatches += 1;

        if self.pixels.dimensions() != (width, height) {
            self.pixels = image::RgbaImage::new(width, height);
        }
        read_rgba8_into(&gpu.device, &readback, &mut self.pixels).await?;
        outcome.cpu_readbacks += 1;

        gpu.advance(FrameStage::Segmenting);
        let mask_pixels = segmenter.segment(&self.pixels).await?;
        let (mask_width, mask_height) = mask_pixels.dimensions();
        if mask_width == 0 || mask_height == 0 {
            return Err(FrameError::EmptyMask {
                width: mask_width,
                height: mask_height,
            });
        }

        gpu.begin_scope();
        let mask = gpu.cached_texture(
            "mask-cpu",
            (mask_width, mask_height),
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &mask,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            mask_pixels.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(mask_width * RGBA8_BYTES_PER_PIXEL),
                rows_per_image: Some(mask_height),
            },
            wgpu::Extent3d {
                width: mask_width,
                height: mask_height,
                depth_or_array_layers: 1,
            },
        );
        gpu.end_scope().await?;

        Ok(mask)
    }
}

/// Copies a tightly packed `width` x `height` f16 buffer into an `R16Float` texture
///
/// Buffer-to-texture copies need 256-byte aligned rows, so unaligned widths
/// are copied one row at a time.
fn copy_f16_mask(encoder: &mut wgpu::CommandEncoder, buffer: &wgpu::Buffer, texture: &wgpu::Texture, width: u32, height: u32) {
    let row_bytes = width * MASK_F16_BYTES_PER_PIXEL;

    if row_bytes % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT == 0 {
        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(row_bytes),
                    rows_per_image: Some(height),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        return;
    }

    for row in 0..height {
        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: row as u64 * row_bytes as u64,
                    bytes_per_row: None,
                    rows_per_image: None,
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: row, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
    }
}
