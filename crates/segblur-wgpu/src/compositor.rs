//! Output compositor
//!
//! Resolves the blurred intermediate texture onto the surface with a single
//! full-screen draw. The quad's six vertices are generated in the vertex
//! shader, so no vertex buffer is bound.

use crate::shaders::ShaderSet;

/// Vertices of the two full-screen triangles
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Uniform block matching `CompositeUniforms` in the compositor shader
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CompositeUniforms {
    size: [f32; 2],
    _pad: [f32; 2],
}

#[derive(Debug)]
pub struct Compositor {
    uniform_buffer: wgpu::Buffer,
}

impl Compositor {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Compositor Uniforms"),
            size: std::mem::size_of::<CompositeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self { uniform_buffer }
    }

    /// Records a render pass drawing `source` over all of `target`
    pub fn encode(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        shaders: &mut ShaderSet,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
        target: &wgpu::Texture,
    ) {
        let pipeline = shaders.compositor_pipeline(device, target.format());

        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&CompositeUniforms {
                size: [target.width() as f32, target.height() as f32],
                _pad: [0.0; 2],
            }),
        );

        let source_view = source.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Compositor"),
            layout: shaders.compositor_layout(),
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
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Compositor"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
    }
}
