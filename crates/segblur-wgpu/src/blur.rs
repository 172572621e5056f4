//! Blur engine collaborator

use crate::error::BlurError;

/// A masked blur implementation driven by the pipeline
///
/// The engine is told the processing resolution before every frame and then
/// records its passes into the frame's command encoder. `destination` is
/// either the presentation surface texture (direct output) or the pipeline's
/// `Rgba8Unorm` intermediate (composited output); it always has
/// `STORAGE_BINDING` usage.
pub trait BlurEngine {
    /// Sets the resolution of the frames that follow
    fn set_input_dimensions(&mut self, width: u32, height: u32);

    /// Records a blur of `source` weighted by `mask` into `destination`
    ///
    /// # Arguments
    /// * `encoder` - Command encoder of the current frame
    /// * `source` - The frame at processing resolution (or the imported texture)
    /// * `mask` - Segmentation mask; the red channel is foreground confidence
    /// * `destination` - Output texture at processing resolution
    /// * `kernel_size` - Blur kernel size in pixels
    fn blur(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
        mask: &wgpu::Texture,
        destination: &wgpu::Texture,
        kernel_size: u32,
    ) -> Result<(), BlurError>;
}
