//! Per-pipeline GPU state shared by the frame stages

use crate::downscale::DownscaleStage;
use crate::error::FrameError;
use crate::frame::FrameStage;
use crate::resource_cache::{ResourceCache, ResourceKey};
use crate::shaders::ShaderSet;

/// Device handles, caches and stage bookkeeping owned by one pipeline
#[derive(Debug)]
pub(crate) struct GpuState {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub shaders: ShaderSet,
    pub downscale: DownscaleStage,
    pub textures: ResourceCache<wgpu::Texture>,
    pub buffers: ResourceCache<wgpu::Buffer>,
    stage: FrameStage,
    open_scopes: Vec<FrameStage>,
}

impl GpuState {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shaders = ShaderSet::new(&device);
        let downscale = DownscaleStage::new(&device);

        Self {
            device,
            queue,
            shaders,
            downscale,
            textures: ResourceCache::new("textures"),
            buffers: ResourceCache::new("buffers"),
            stage: FrameStage::Idle,
            open_scopes: Vec::new(),
        }
    }

    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    pub fn advance(&mut self, next: FrameStage) {
        debug_assert!(self.stage.can_advance_to(next), "illegal frame transition {} -> {}", self.stage, next);
        tracing::trace!(from = %self.stage, to = %next, "frame stage");
        self.stage = next;
    }

    /// Forces the state machine back to idle after a dropped frame
    pub fn reset(&mut self) {
        self.stage = FrameStage::Idle;
    }

    /// Starts capturing validation errors for the current stage
    pub fn begin_scope(&mut self) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.open_scopes.push(self.stage);
    }

    /// Closes the innermost scope, failing with any error it captured
    pub async fn end_scope(&mut self) -> Result<(), FrameError> {
        let Some(stage) = self.open_scopes.pop() else {
            return Ok(());
        };

        match self.device.pop_error_scope().await {
            Some(error) => Err(FrameError::Gpu {
                stage,
                message: error.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Pops every scope left open by an aborted frame, logging what they captured
    pub async fn unwind_scopes(&mut self) {
        while let Some(stage) = self.open_scopes.pop() {
            if let Some(error) = self.device.pop_error_scope().await {
                tracing::debug!(%stage, %error, "discarding GPU error from aborted frame");
            }
        }
    }

    pub fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Returns the cached 2D texture `name`, (re)allocating it for `size`
    pub fn cached_texture(&mut self, name: &'static str, size: (u32, u32), format: wgpu::TextureFormat, usage: wgpu::TextureUsages) -> wgpu::Texture {
        let device = &self.device;
        self.textures.get_or_create(&ResourceKey::texture(name, size, format, usage), |key| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(key.name),
                size: wgpu::Extent3d {
                    width: key.width,
                    height: key.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        })
    }

    /// Returns the cached buffer `name` holding `rows` rows of `bytes_per_row` bytes
    pub fn cached_buffer(&mut self, name: &'static str, bytes_per_row: u32, rows: u32, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        let device = &self.device;
        self.buffers.get_or_create(&ResourceKey::buffer(name, bytes_per_row, rows, usage), |key| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(key.name),
                size: key.byte_size(),
                usage,
                mapped_at_creation: false,
            })
        })
    }
}
