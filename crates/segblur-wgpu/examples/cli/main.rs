//! Background blur CLI
//!
//! Runs a single still image through the blur pipeline, treating it as one
//! video frame, and writes the result as an image file. A luma-key segmenter
//! and a box blur stand in for a real segmentation model and blur kernel.
//!
//! # Usage
//! ```bash
//! cargo run --example cli --features serde -- input.png output.png --direct-output
//! RUST_LOG=segblur_wgpu=debug cargo run --example cli --features serde -- input.png output.png --config pipeline.yaml
//! ```

mod collaborators;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use collaborators::{BoxBlur, LumaKeySegmenter};
use segblur_wgpu::readback::{RGBA8_BYTES_PER_PIXEL, padded_bytes_per_row, read_rgba8_into};
use segblur_wgpu::{BlurPipeline, GpuContext, GpuContextOptions, OffscreenSurface, PipelineConfig, VideoFrame, image, wgpu};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the background blur demo
#[derive(Parser)]
#[command(version, about = "Apply a segmentation-guided background blur to an image")]
struct Args {
    /// Input image file path
    input: PathBuf,

    /// Output image file path
    output: PathBuf,

    /// YAML file with pipeline configuration; flags below override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Bind the input texture directly instead of copying it
    #[arg(long)]
    zero_copy: bool,

    /// Blur straight into the surface, skipping the compositor
    #[arg(long)]
    direct_output: bool,

    /// Segmentation resolution as WIDTHxHEIGHT
    #[arg(long, short, value_parser = parse_size)]
    segmentation_size: Option<(u32, u32)>,

    /// Luma above which a pixel counts as foreground
    #[arg(long, short, default_value = "128")]
    threshold: u8,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value.split_once('x').ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = width.parse().map_err(|e| format!("invalid width '{width}': {e}"))?;
    let height = height.parse().map_err(|e| format!("invalid height '{height}': {e}"))?;
    Ok((width, height))
}

fn load_config(args: &Args) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => serde_norway::from_str(&std::fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };

    if args.zero_copy {
        config.zero_copy = true;
    }
    if args.direct_output {
        config.direct_output = true;
    }
    if let Some((width, height)) = args.segmentation_size {
        config = config.with_segmentation_size(width, height);
    }

    Ok(config)
}

/// Uploads an RGBA8 image into a texture usable as a pipeline input frame
fn upload_frame(device: &wgpu::Device, queue: &wgpu::Queue, image: &image::RgbaImage) -> wgpu::Texture {
    let (width, height) = image.dimensions();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Input Frame"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        texture.as_image_copy(),
        image.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * RGBA8_BYTES_PER_PIXEL),
            rows_per_image: Some(height),
        },
        texture.size(),
    );

    texture
}

/// Reads the output frame back into an image
async fn download_frame(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<image::RgbaImage, Box<dyn std::error::Error>> {
    let (width, height) = (texture.width(), texture.height());
    let padded_row = padded_bytes_per_row(width, RGBA8_BYTES_PER_PIXEL);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Output Readback"),
        size: padded_row as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Output Readback") });
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

    let mut image = image::RgbaImage::new(width, height);
    read_rgba8_into(device, &buffer, &mut image).await?;
    Ok(image)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    tracing::info!(input = %args.input.display(), "loading image");
    let input_image = image::open(&args.input)?.to_rgba8();
    let (width, height) = input_image.dimensions();

    let context = GpuContext::new(&GpuContextOptions::default()).await?;
    let device = context.device;
    let queue = context.queue;

    let texture = upload_frame(&device, &queue, &input_image);
    let frame = VideoFrame::new(texture, Duration::ZERO).with_display_size(width, height);

    let mut pipeline = BlurPipeline::new(
        device.clone(),
        queue.clone(),
        OffscreenSurface::new(wgpu::TextureFormat::Rgba8Unorm),
        LumaKeySegmenter::new(args.threshold),
        BoxBlur::new(&device, &queue),
        config,
    )?;

    let output = pipeline.render(&frame).await.ok_or("frame was dropped, see log for details")?;

    let output_image = download_frame(&device, &queue, &output.texture).await?;
    output_image.save(&args.output)?;

    tracing::info!(output = %args.output.display(), stats = ?pipeline.stats(), "done");

    Ok(())
}
