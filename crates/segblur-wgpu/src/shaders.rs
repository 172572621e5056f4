//! Compiled shader variants
//!
//! WGSL sources are validated and embedded by the build script. Pipelines are
//! compiled on first use and kept for the lifetime of the [`ShaderSet`]; every
//! size-dependent parameter is a uniform, so nothing is recompiled when the
//! resolution changes.

use std::collections::HashMap;

use crate::config::SourceBinding;

/// Embedded WGSL sources
pub mod source {
    include!(concat!(env!("OUT_DIR"), "/shaders.rs"));
}

/// Encoding the downscale pass produces for the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationInput {
    /// 8-bit RGBA storage texture, read back to the CPU
    Rgba8Texture,
    /// Interleaved half-float RGB storage buffer, handed to a GPU-resident model
    Rgb16FloatBuffer,
}

impl SegmentationInput {
    fn shader(&self) -> &'static str {
        match self {
            SegmentationInput::Rgba8Texture => source::DOWNSCALE_RGBA8,
            SegmentationInput::Rgb16FloatBuffer => source::DOWNSCALE_F16,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SegmentationInput::Rgba8Texture => "Downscale RGBA8",
            SegmentationInput::Rgb16FloatBuffer => "Downscale F16",
        }
    }
}

/// Parameters a downscale pipeline is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownscaleVariant {
    pub input: SourceBinding,
    pub encoding: SegmentationInput,
}

impl DownscaleVariant {
    fn entry_point(&self) -> &'static str {
        match self.input {
            SourceBinding::Imported => "main_imported",
            SourceBinding::Copied => "main",
        }
    }
}

/// Lazily compiled pipelines shared by all passes of a [`crate::BlurPipeline`]
#[derive(Debug)]
pub struct ShaderSet {
    downscale_texture_layout: wgpu::BindGroupLayout,
    downscale_buffer_layout: wgpu::BindGroupLayout,
    compositor_layout: wgpu::BindGroupLayout,
    downscale_pipelines: HashMap<DownscaleVariant, wgpu::ComputePipeline>,
    compositor_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    linear_sampler: wgpu::Sampler,
}

fn sampled_texture_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl ShaderSet {
    pub fn new(device: &wgpu::Device) -> Self {
        let compute = wgpu::ShaderStages::COMPUTE;

        let downscale_texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Downscale RGBA8"),
            entries: &[
                sampled_texture_entry(0, compute),
                sampler_entry(1, compute),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: compute,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
                uniform_entry(3, compute),
            ],
        });

        let downscale_buffer_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Downscale F16"),
            entries: &[
                sampled_texture_entry(0, compute),
                sampler_entry(1, compute),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: compute,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                uniform_entry(3, compute),
            ],
        });

        let fragment = wgpu::ShaderStages::FRAGMENT;
        let compositor_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Compositor"),
            entries: &[sampled_texture_entry(0, fragment), sampler_entry(1, fragment), uniform_entry(2, fragment)],
        });

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 0.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        Self {
            downscale_texture_layout,
            downscale_buffer_layout,
            compositor_layout,
            downscale_pipelines: HashMap::new(),
            compositor_pipelines: HashMap::new(),
            linear_sampler,
        }
    }

    pub fn downscale_layout(&self, encoding: SegmentationInput) -> &wgpu::BindGroupLayout {
        match encoding {
            SegmentationInput::Rgba8Texture => &self.downscale_texture_layout,
            SegmentationInput::Rgb16FloatBuffer => &self.downscale_buffer_layout,
        }
    }

    pub fn compositor_layout(&self) -> &wgpu::BindGroupLayout {
        &self.compositor_layout
    }

    pub fn linear_sampler(&self) -> &wgpu::Sampler {
        &self.linear_sampler
    }

    /// Returns the downscale pipeline for `variant`, compiling it on first use
    pub fn downscale_pipeline(&mut self, device: &wgpu::Device, variant: DownscaleVariant) -> wgpu::ComputePipeline {
        if let Some(pipeline) = self.downscale_pipelines.get(&variant) {
            return pipeline.clone();
        }

        tracing::debug!(input = variant.input.name(), encoding = ?variant.encoding, "compiling downscale pipeline");

        let label = variant.encoding.label();
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(variant.encoding.shader().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[self.downscale_layout(variant.encoding)],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some(variant.entry_point()),
            compilation_options: Default::default(),
            cache: None,
        });

        self.downscale_pipelines.insert(variant, pipeline.clone());
        pipeline
    }

    /// Returns the compositor pipeline rendering to `format`, compiling it on first use
    pub fn compositor_pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> wgpu::RenderPipeline {
        if let Some(pipeline) = self.compositor_pipelines.get(&format) {
            return pipeline.clone();
        }

        tracing::debug!(?format, "compiling compositor pipeline");

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Compositor"),
            source: wgpu::ShaderSource::Wgsl(source::COMPOSITOR.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Compositor"),
            bind_group_layouts: &[&self.compositor_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Compositor"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        self.compositor_pipelines.insert(format, pipeline.clone());
        pipeline
    }

    /// Number of pipelines compiled so far
    pub fn compiled_pipelines(&self) -> usize {
        self.downscale_pipelines.len() + self.compositor_pipelines.len()
    }
}
