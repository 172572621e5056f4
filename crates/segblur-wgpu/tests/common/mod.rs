//! Shared fixtures for the GPU integration tests
//!
//! Tests call [`gpu`] first and return early when the machine has no usable
//! adapter, so the suite stays green on headless CI without a software
//! renderer.

#![allow(dead_code)]

use std::collections::HashMap;

use half::f16;
use segblur_wgpu::image::{Rgba, RgbaImage};
use segblur_wgpu::readback::{RGBA8_BYTES_PER_PIXEL, map_for_read, padded_bytes_per_row, read_rgba8_into};
use segblur_wgpu::{BlurEngine, BlurError, DeviceAffinity, GpuContext, GpuContextOptions, SegmenterCapabilities, SegmenterError, Segmenter, wgpu};

/// Solid colour used for test frames
pub const FRAME_COLOR: [u8; 4] = [200, 100, 50, 255];

/// Creates a device with every optional feature the adapter supports
pub fn gpu() -> Option<(wgpu::Device, wgpu::Queue)> {
    for force_fallback_adapter in [false, true] {
        let options = GpuContextOptions {
            backends: wgpu::Backends::all(),
            force_fallback_adapter,
            ..Default::default()
        };
        if let Ok(context) = pollster::block_on(GpuContext::new(&options)) {
            return Some((context.device, context.queue));
        }
    }

    eprintln!("No GPU adapter available, skipping test");
    None
}

/// Creates a device without any optional features
pub fn gpu_without_features() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    for force_fallback_adapter in [false, true] {
        let Ok(adapter) = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter,
        })) else {
            continue;
        };

        if let Ok(pair) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::default(),
            trace: Default::default(),
        })) {
            return Some(pair);
        }
    }

    eprintln!("No GPU adapter available, skipping test");
    None
}

/// Creates a solid `width` x `height` RGBA8 frame texture with `usage`
pub fn solid_texture(device: &wgpu::Device, queue: &wgpu::Queue, width: u32, height: u32, usage: wgpu::TextureUsages) -> wgpu::Texture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Test Frame"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: usage | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let pixels = RgbaImage::from_pixel(width, height, Rgba(FRAME_COLOR));
    queue.write_texture(
        texture.as_image_copy(),
        pixels.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        texture.size(),
    );

    texture
}

/// Colours of the left and right halves of [`split_texture`]
pub const LEFT_COLOR: [u8; 4] = [255, 0, 0, 255];
pub const RIGHT_COLOR: [u8; 4] = [0, 0, 255, 255];

/// Creates a `width` x `height` frame whose left half is [`LEFT_COLOR`] and right half [`RIGHT_COLOR`]
pub fn split_texture(device: &wgpu::Device, queue: &wgpu::Queue, width: u32, height: u32, usage: wgpu::TextureUsages) -> wgpu::Texture {
    let texture = solid_texture(device, queue, width, height, usage);
    let pixels = RgbaImage::from_fn(width, height, |x, _| if x < width / 2 { Rgba(LEFT_COLOR) } else { Rgba(RIGHT_COLOR) });
    queue.write_texture(
        texture.as_image_copy(),
        pixels.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        texture.size(),
    );
    texture
}

/// Standard usage of a caller-owned frame texture
pub fn frame_usage() -> wgpu::TextureUsages {
    wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC
}

/// Reads an `Rgba8Unorm` texture back into an image
pub fn read_texture(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> RgbaImage {
    assert_eq!(texture.format(), wgpu::TextureFormat::Rgba8Unorm);

    let (width, height) = (texture.width(), texture.height());
    let padded_row = padded_bytes_per_row(width, RGBA8_BYTES_PER_PIXEL);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Test Readback"),
        size: padded_row as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        texture.size(),
    );
    queue.submit(std::iter::once(encoder.finish()));

    let mut image = RgbaImage::new(width, height);
    pollster::block_on(read_rgba8_into(device, &buffer, &mut image)).expect("readback failed");
    image
}

/// Copies a `COPY_SRC` buffer into a mappable one and returns its contents
pub fn read_buffer(device: &wgpu::Device, queue: &wgpu::Queue, buffer: &wgpu::Buffer) -> Vec<u8> {
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Test Buffer Readback"),
        size: buffer.size(),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, buffer.size());
    queue.submit(std::iter::once(encoder.finish()));

    pollster::block_on(map_for_read(device, &staging)).expect("readback failed");
    let data = staging.slice(..).get_mapped_range().to_vec();
    staging.unmap();
    data
}

pub fn assert_close(actual: [u8; 4], expected: [u8; 4]) {
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!(a.abs_diff(*e) <= 2, "pixel {actual:?} differs from {expected:?}");
    }
}

/// CPU segmenter returning a constant mask of a fixed size
#[derive(Debug)]
pub struct CpuMaskSegmenter {
    pub capabilities: SegmenterCapabilities,
    pub mask_size: (u32, u32),
    pub mask_value: u8,
    pub fail: bool,
    pub calls: usize,
    pub last_input: Option<RgbaImage>,
}

impl CpuMaskSegmenter {
    pub fn new(mask_size: (u32, u32), mask_value: u8) -> Self {
        Self {
            capabilities: SegmenterCapabilities::CPU,
            mask_size,
            mask_value,
            fail: false,
            calls: 0,
            last_input: None,
        }
    }

    pub fn with_capabilities(mut self, supports_gpu_buffer: bool, device_affinity: DeviceAffinity) -> Self {
        self.capabilities = SegmenterCapabilities {
            supports_gpu_buffer,
            device_affinity,
        };
        self
    }
}

impl Segmenter for CpuMaskSegmenter {
    fn capabilities(&self) -> SegmenterCapabilities {
        self.capabilities
    }

    async fn segment(&mut self, pixels: &RgbaImage) -> Result<RgbaImage, SegmenterError> {
        self.calls += 1;
        self.last_input = Some(pixels.clone());
        if self.fail {
            return Err(SegmenterError::Failed("model unavailable".to_string()));
        }

        let value = self.mask_value;
        Ok(RgbaImage::from_pixel(self.mask_size.0, self.mask_size.1, Rgba([value, value, value, 255])))
    }
}

/// GPU segmenter writing a constant f16 mask into its output buffer
#[derive(Debug)]
pub struct GpuMaskSegmenter {
    queue: wgpu::Queue,
    size: (u32, u32),
    mask_value: f32,
    input: Option<wgpu::Buffer>,
    output: wgpu::Buffer,
    pub inferences: usize,
    pub cpu_segmentations: usize,
}

impl GpuMaskSegmenter {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, size: (u32, u32), mask_value: f32) -> Self {
        let output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Segmenter Output"),
            size: wgpu::util::align_to(size.0 as u64 * size.1 as u64 * 2, wgpu::COPY_BUFFER_ALIGNMENT),
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            queue: queue.clone(),
            size,
            mask_value,
            input: None,
            output,
            inferences: 0,
            cpu_segmentations: 0,
        }
    }
}

impl GpuMaskSegmenter {
    /// Half-float RGB values last copied into the input buffer, three per pixel
    pub fn read_input(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Vec<f32> {
        let input = self.input.as_ref().expect("input buffer never requested");
        let bytes = read_buffer(device, queue, input);
        let pixel_values = (self.size.0 * self.size.1 * 3) as usize;
        bytes.chunks_exact(2).take(pixel_values).map(|half| f16::from_le_bytes([half[0], half[1]]).to_f32()).collect()
    }
}

impl Segmenter for GpuMaskSegmenter {
    fn capabilities(&self) -> SegmenterCapabilities {
        SegmenterCapabilities::GPU_BUFFER
    }

    fn input_buffer(&mut self, device: &wgpu::Device) -> Result<wgpu::Buffer, SegmenterError> {
        let size = segblur_wgpu::rgb16f_buffer_size(self.size.0, self.size.1);
        let buffer = self.input.get_or_insert_with(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Segmenter Input"),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        });
        Ok(buffer.clone())
    }

    async fn run_inference(&mut self) -> Result<(), SegmenterError> {
        self.inferences += 1;

        let mut mask = vec![f16::from_f32(self.mask_value); (self.size.0 * self.size.1) as usize];
        if mask.len() % 2 == 1 {
            mask.push(f16::ZERO);
        }
        self.queue.write_buffer(&self.output, 0, bytemuck::cast_slice(&mask));
        Ok(())
    }

    fn output_buffer(&mut self) -> Result<wgpu::Buffer, SegmenterError> {
        Ok(self.output.clone())
    }

    async fn segment(&mut self, _pixels: &RgbaImage) -> Result<RgbaImage, SegmenterError> {
        self.cpu_segmentations += 1;
        let value = (self.mask_value * 255.0) as u8;
        Ok(RgbaImage::from_pixel(self.size.0, self.size.1, Rgba([value, value, value, 255])))
    }
}

/// A single recorded [`BlurEngine::blur`] call
#[derive(Debug, Clone, PartialEq)]
pub struct BlurCall {
    pub source_size: (u32, u32),
    pub source_usage: wgpu::TextureUsages,
    pub mask_size: (u32, u32),
    pub mask_format: wgpu::TextureFormat,
    pub destination_size: (u32, u32),
    pub destination_format: wgpu::TextureFormat,
    pub kernel_size: u32,
}

/// Blur engine multiplying the source by the mask's red channel
///
/// Can be told to fail, or to build an invalid bind group, on a given call.
#[derive(Debug)]
pub struct RecordingBlur {
    device: wgpu::Device,
    pipelines: HashMap<wgpu::TextureFormat, (wgpu::ComputePipeline, wgpu::BindGroupLayout)>,
    pub input_dimensions: Vec<(u32, u32)>,
    pub calls: Vec<BlurCall>,
    /// 1-based call number that returns an error
    pub fail_on_call: Option<usize>,
    /// 1-based call number that binds the mask as its storage output
    pub invalid_bind_group_on_call: Option<usize>,
}

fn storage_format_name(format: wgpu::TextureFormat) -> &'static str {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => "rgba8unorm",
        wgpu::TextureFormat::Rgba16Float => "rgba16float",
        wgpu::TextureFormat::Bgra8Unorm => "bgra8unorm",
        other => panic!("unsupported test storage format {other:?}"),
    }
}

impl RecordingBlur {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            device: device.clone(),
            pipelines: HashMap::new(),
            input_dimensions: Vec::new(),
            calls: Vec::new(),
            fail_on_call: None,
            invalid_bind_group_on_call: None,
        }
    }

    fn pipeline(&mut self, format: wgpu::TextureFormat) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
        let device = &self.device;
        self.pipelines
            .entry(format)
            .or_insert_with(|| {
                let shader = format!(
                    r#"
@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var mask_texture: texture_2d<f32>;
@group(0) @binding(2) var output_texture: texture_storage_2d<{format}, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{
    let size = textureDimensions(output_texture);
    if (id.x >= size.x || id.y >= size.y) {{
        return;
    }}
    let source_size = textureDimensions(source_texture);
    let mask_size = textureDimensions(mask_texture);
    let source_coord = min(id.xy * source_size / size, source_size - vec2<u32>(1u, 1u));
    let mask_coord = min(id.xy * mask_size / size, mask_size - vec2<u32>(1u, 1u));
    let color = textureLoad(source_texture, source_coord, 0);
    let weight = textureLoad(mask_texture, mask_coord, 0).r;
    textureStore(output_texture, id.xy, vec4<f32>(color.rgb * weight, 1.0));
}}
"#,
                    format = storage_format_name(format)
                );

                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Test Blur"),
                    source: wgpu::ShaderSource::Wgsl(shader.into()),
                });

                let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                };
                let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Test Blur"),
                    entries: &[
                        texture_entry(0),
                        texture_entry(1),
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::StorageTexture {
                                access: wgpu::StorageTextureAccess::WriteOnly,
                                format,
                                view_dimension: wgpu::TextureViewDimension::D2,
                            },
                            count: None,
                        },
                    ],
                });

                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Test Blur"),
                    bind_group_layouts: &[&layout],
                    push_constant_ranges: &[],
                });

                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("Test Blur"),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some("main"),
                    compilation_options: Default::default(),
                    cache: None,
                });

                (pipeline, layout)
            })
            .clone()
    }
}

impl BlurEngine for RecordingBlur {
    fn set_input_dimensions(&mut self, width: u32, height: u32) {
        self.input_dimensions.push((width, height));
    }

    fn blur(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
        mask: &wgpu::Texture,
        destination: &wgpu::Texture,
        kernel_size: u32,
    ) -> Result<(), BlurError> {
        self.calls.push(BlurCall {
            source_size: (source.width(), source.height()),
            source_usage: source.usage(),
            mask_size: (mask.width(), mask.height()),
            mask_format: mask.format(),
            destination_size: (destination.width(), destination.height()),
            destination_format: destination.format(),
            kernel_size,
        });
        let call = self.calls.len();

        if self.fail_on_call == Some(call) {
            return Err(BlurError::Failed(format!("forced failure on call {call}")));
        }

        let (pipeline, layout) = self.pipeline(destination.format());
        let source_view = source.create_view(&wgpu::TextureViewDescriptor::default());
        let mask_view = mask.create_view(&wgpu::TextureViewDescriptor::default());
        let destination_view = destination.create_view(&wgpu::TextureViewDescriptor::default());

        // The mask has no STORAGE_BINDING usage, so this bind group is invalid
        let output_view = if self.invalid_bind_group_on_call == Some(call) { &mask_view } else { &destination_view };

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Test Blur"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&mask_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(output_view),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Test Blur"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        let (x, y) = segblur_wgpu::workgroup_count(destination.width(), destination.height());
        pass.dispatch_workgroups(x, y, 1);

        Ok(())
    }
}
