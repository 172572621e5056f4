//! Demo segmenter and blur engine
//!
//! Neither is meant for real use: the segmenter treats bright pixels as the
//! person, and the blur is a plain separable box filter.

use segblur_wgpu::image::{Rgba, RgbaImage};
use segblur_wgpu::{BlurEngine, BlurError, SegmenterCapabilities, SegmenterError, Segmenter, wgpu};

/// Segments by luma: pixels brighter than the threshold are foreground
pub struct LumaKeySegmenter {
    threshold: u8,
}

impl LumaKeySegmenter {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }
}

impl Segmenter for LumaKeySegmenter {
    fn capabilities(&self) -> SegmenterCapabilities {
        SegmenterCapabilities::CPU
    }

    async fn segment(&mut self, pixels: &RgbaImage) -> Result<RgbaImage, SegmenterError> {
        let mut mask = RgbaImage::new(pixels.width(), pixels.height());
        for (source, target) in pixels.pixels().zip(mask.pixels_mut()) {
            let [r, g, b, _] = source.0;
            let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000;
            let value = if luma as u8 > self.threshold { 255 } else { 0 };
            *target = Rgba([value, value, value, 255]);
        }
        Ok(mask)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurParams {
    radius: i32,
    _pad: [u32; 3],
}

/// Kernel sizes are mapped to a box radius of `kernel_size / KERNEL_TO_RADIUS`
const KERNEL_TO_RADIUS: u32 = 24;

/// Two-pass box blur mixing the sharp frame back in where the mask is set
pub struct BoxBlur {
    device: wgpu::Device,
    queue: wgpu::Queue,
    horizontal: (wgpu::ComputePipeline, wgpu::BindGroupLayout),
    vertical: (wgpu::ComputePipeline, wgpu::BindGroupLayout),
    sampler: wgpu::Sampler,
    params: wgpu::Buffer,
    intermediate: Option<wgpu::Texture>,
    dimensions: Option<(u32, u32)>,
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba8Unorm,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn common_entries() -> [wgpu::BindGroupLayoutEntry; 3] {
    [
        texture_entry(0),
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
    ]
}

impl BoxBlur {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Box Blur"),
            source: wgpu::ShaderSource::Wgsl(include_str!("box_blur.wgsl").into()),
        });

        let [source_entry, sampler_entry, params_entry] = common_entries();
        let horizontal = Self::create_pipeline(device, &module, "horizontal", &[source_entry, sampler_entry, params_entry, storage_entry(3)]);
        let vertical = Self::create_pipeline(
            device,
            &module,
            "vertical",
            &[source_entry, sampler_entry, params_entry, texture_entry(4), texture_entry(5), storage_entry(6)],
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Box Blur"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Box Blur Params"),
            size: std::mem::size_of::<BlurParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            horizontal,
            vertical,
            sampler,
            params,
            intermediate: None,
            dimensions: None,
        }
    }

    fn create_pipeline(
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        entry_point: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(entry_point),
            entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(entry_point),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&pipeline_layout),
            module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        (pipeline, layout)
    }

    fn intermediate(&mut self, (width, height): (u32, u32)) -> wgpu::Texture {
        if let Some(texture) = &self.intermediate {
            if texture.width() == width && texture.height() == height {
                return texture.clone();
            }
            texture.destroy();
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Box Blur Intermediate"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        self.intermediate = Some(texture.clone());
        texture
    }
}

impl BlurEngine for BoxBlur {
    fn set_input_dimensions(&mut self, width: u32, height: u32) {
        self.dimensions = Some((width, height));
    }

    fn blur(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
        mask: &wgpu::Texture,
        destination: &wgpu::Texture,
        kernel_size: u32,
    ) -> Result<(), BlurError> {
        let dimensions = self.dimensions.ok_or(BlurError::DimensionsNotSet)?;
        if destination.format() != wgpu::TextureFormat::Rgba8Unorm {
            return Err(BlurError::Failed(format!("unsupported destination format {:?}", destination.format())));
        }

        let intermediate = self.intermediate(dimensions);
        let radius = (kernel_size / KERNEL_TO_RADIUS).max(1) as i32;
        self.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&BlurParams { radius, _pad: [0; 3] }));

        let source_view = source.create_view(&wgpu::TextureViewDescriptor::default());
        let intermediate_view = intermediate.create_view(&wgpu::TextureViewDescriptor::default());
        let mask_view = mask.create_view(&wgpu::TextureViewDescriptor::default());
        let destination_view = destination.create_view(&wgpu::TextureViewDescriptor::default());

        let common = [
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&source_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: self.params.as_entire_binding(),
            },
        ];

        let horizontal_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Box Blur Horizontal"),
            layout: &self.horizontal.1,
            entries: &[
                common[0].clone(),
                common[1].clone(),
                common[2].clone(),
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&intermediate_view),
                },
            ],
        });

        let vertical_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Box Blur Vertical"),
            layout: &self.vertical.1,
            entries: &[
                common[0].clone(),
                common[1].clone(),
                common[2].clone(),
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&intermediate_view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&mask_view),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(&destination_view),
                },
            ],
        });

        for (pipeline, bind_group, size) in [
            (&self.horizontal.0, &horizontal_bind_group, dimensions),
            (&self.vertical.0, &vertical_bind_group, (destination.width(), destination.height())),
        ] {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Box Blur"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, bind_group, &[]);
            let (workgroup_x, workgroup_y) = segblur_wgpu::workgroup_count(size.0, size.1);
            compute_pass.dispatch_workgroups(workgroup_x, workgroup_y, 1);
        }

        Ok(())
    }
}
