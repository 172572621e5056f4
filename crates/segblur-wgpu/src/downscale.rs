//! Downscale/pack stage
//!
//! Bilinearly resamples the source frame to the segmentation resolution and
//! packs it in the encoding the active segmentation route expects.

use crate::config::SourceBinding;
use crate::shaders::{DownscaleVariant, SegmentationInput, ShaderSet};

/// Compute shader workgroup size in X dimension
const COMPUTE_WORKGROUP_SIZE_X: u32 = 8;
/// Compute shader workgroup size in Y dimension
const COMPUTE_WORKGROUP_SIZE_Y: u32 = 8;

/// Bytes per pixel of the half-float RGB encoding
pub const RGB16F_BYTES_PER_PIXEL: u64 = 3 * 2;

/// Uniform block matching `Dimensions` in the downscale shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DownscaleUniforms {
    width: u32,
    height: u32,
    _pad: [u32; 2],
}

/// Number of workgroups dispatched to cover a `width` x `height` output
pub fn workgroup_count(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(COMPUTE_WORKGROUP_SIZE_X), height.div_ceil(COMPUTE_WORKGROUP_SIZE_Y))
}

/// Size in bytes of the half-float RGB buffer for a `width` x `height` image,
/// rounded up to the buffer copy alignment
pub fn rgb16f_buffer_size(width: u32, height: u32) -> u64 {
    wgpu::util::align_to(width as u64 * height as u64 * RGB16F_BYTES_PER_PIXEL, wgpu::COPY_BUFFER_ALIGNMENT)
}

/// Where the downscaled image is written
#[derive(Debug, Clone, Copy)]
pub enum DownscaleTarget<'a> {
    /// `Rgba8Unorm` storage texture at segmentation resolution
    Texture(&'a wgpu::Texture),
    /// Storage buffer of at least [`rgb16f_buffer_size`] bytes
    Buffer(&'a wgpu::Buffer),
}

impl DownscaleTarget<'_> {
    pub fn encoding(&self) -> SegmentationInput {
        match self {
            DownscaleTarget::Texture(_) => SegmentationInput::Rgba8Texture,
            DownscaleTarget::Buffer(_) => SegmentationInput::Rgb16FloatBuffer,
        }
    }
}

/// Records the downscale compute pass
#[derive(Debug)]
pub struct DownscaleStage {
    uniform_buffer: wgpu::Buffer,
}

impl DownscaleStage {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Downscale Uniforms"),
            size: std::mem::size_of::<DownscaleUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self { uniform_buffer }
    }

    /// Records one dispatch downscaling `source` into `target`
    ///
    /// # Arguments
    /// * `source` - The frame texture, imported or copied according to `binding`
    /// * `binding` - Selects the shader entry point
    /// * `target` - The output texture or buffer, which also selects the encoding
    /// * `size` - Segmentation resolution (width, height)
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        shaders: &mut ShaderSet,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
        binding: SourceBinding,
        target: DownscaleTarget<'_>,
        size: (u32, u32),
    ) {
        let (width, height) = size;
        let encoding = target.encoding();
        let pipeline = shaders.downscale_pipeline(device, DownscaleVariant { input: binding, encoding });

        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&DownscaleUniforms {
                width,
                height,
                _pad: [0; 2],
            }),
        );

        let source_view = source.create_view(&wgpu::TextureViewDescriptor::default());
        let target_view;
        let output_resource = match target {
            DownscaleTarget::Texture(texture) => {
                target_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                wgpu::BindingResource::TextureView(&target_view)
            }
            DownscaleTarget::Buffer(buffer) => buffer.as_entire_binding(),
        };

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Downscale"),
            layout: shaders.downscale_layout(encoding),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(shaders.linear_sampler()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output_resource,
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Downscale"),
            timestamp_writes: None,
        });

        compute_pass.set_pipeline(&pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);

        let (workgroup_x, workgroup_y) = workgroup_count(width, height);
        compute_pass.dispatch_workgroups(workgroup_x, workgroup_y, 1);
    }
}
