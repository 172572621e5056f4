//! Offscreen presentation surface
//!
//! Stands in for a swapchain: every acquired [`SurfaceFrame`] is a fresh
//! texture valid for one frame only, stamped with the configuration
//! generation it was acquired under.

use crate::config::OutputRoute;
use crate::error::SurfaceError;

/// Current surface configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfiguration {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

/// A texture acquired from the surface for a single frame
#[derive(Debug)]
pub struct SurfaceFrame {
    pub texture: wgpu::Texture,
    generation: u64,
}

impl SurfaceFrame {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Texture usage of surface frames for the given output route
pub fn surface_usage(route: OutputRoute) -> wgpu::TextureUsages {
    let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC;
    match route {
        OutputRoute::Direct => usage | wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_DST,
        OutputRoute::Composited => usage,
    }
}

/// Surface format for the given output route
///
/// Direct output hands the surface to the blur engine as-is, so it keeps the
/// preferred format. The compositor always renders to `Rgba8Unorm`.
pub fn surface_format(preferred: wgpu::TextureFormat, route: OutputRoute) -> wgpu::TextureFormat {
    match route {
        OutputRoute::Direct => preferred,
        OutputRoute::Composited => wgpu::TextureFormat::Rgba8Unorm,
    }
}

/// A headless drawable
#[derive(Debug)]
pub struct OffscreenSurface {
    preferred_format: wgpu::TextureFormat,
    configuration: Option<SurfaceConfiguration>,
    generation: u64,
}

impl OffscreenSurface {
    pub fn new(preferred_format: wgpu::TextureFormat) -> Self {
        Self {
            preferred_format,
            configuration: None,
            generation: 0,
        }
    }

    pub fn preferred_format(&self) -> wgpu::TextureFormat {
        self.preferred_format
    }

    /// Applies a new configuration, invalidating every previously acquired frame
    pub fn configure(&mut self, configuration: SurfaceConfiguration) {
        self.generation += 1;
        tracing::debug!(
            width = configuration.width,
            height = configuration.height,
            format = ?configuration.format,
            generation = self.generation,
            "surface configured"
        );
        self.configuration = Some(configuration);
    }

    pub fn configuration(&self) -> Option<&SurfaceConfiguration> {
        self.configuration.as_ref()
    }

    pub fn configured_size(&self) -> Option<(u32, u32)> {
        self.configuration.map(|c| (c.width, c.height))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Acquires a fresh texture for the current frame
    pub fn acquire(&self, device: &wgpu::Device) -> Result<SurfaceFrame, SurfaceError> {
        let configuration = self.configuration.ok_or(SurfaceError::Unconfigured)?;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Surface Frame"),
            size: wgpu::Extent3d {
                width: configuration.width,
                height: configuration.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: configuration.format,
            usage: configuration.usage,
            view_formats: &[],
        });

        Ok(SurfaceFrame {
            texture,
            generation: self.generation,
        })
    }

    /// Fails if a frame acquired under `generation` is no longer valid
    pub fn check_generation(&self, generation: u64) -> Result<(), SurfaceError> {
        if self.configuration.is_none() {
            return Err(SurfaceError::Unconfigured);
        }
        if generation != self.generation {
            return Err(SurfaceError::StaleFrame {
                frame: generation,
                current: self.generation,
            });
        }
        Ok(())
    }

    /// Presents an acquired frame, returning its texture for the outgoing video frame
    pub fn present(&self, frame: SurfaceFrame) -> Result<wgpu::Texture, SurfaceError> {
        self.check_generation(frame.generation)?;
        Ok(frame.texture)
    }
}
