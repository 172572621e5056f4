//! GPU to CPU readback helpers
//!
//! Texture-to-buffer copies require rows padded to
//! [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`]; these helpers compute that padding
//! and strip it again when the mapped data is copied into an image.

use crate::error::FrameError;

/// Bytes per pixel of `Rgba8Unorm`
pub const RGBA8_BYTES_PER_PIXEL: u32 = 4;

/// Row pitch of a texture-to-buffer copy for `width` pixels of `bytes_per_pixel`
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    wgpu::util::align_to(width * bytes_per_pixel, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

/// Copies `rows` rows of `row_bytes` bytes out of `padded`, whose rows are `padded_row_bytes` apart
///
/// `destination` must hold exactly `rows * row_bytes` bytes.
pub fn unpad_rows(padded: &[u8], padded_row_bytes: usize, row_bytes: usize, rows: usize, destination: &mut [u8]) {
    debug_assert!(padded_row_bytes >= row_bytes);
    debug_assert_eq!(destination.len(), rows * row_bytes);

    for (dst_row, src_row) in destination.chunks_exact_mut(row_bytes).zip(padded.chunks(padded_row_bytes)).take(rows) {
        dst_row.copy_from_slice(&src_row[..row_bytes]);
    }
}

/// Maps `buffer` for reading and waits until the mapping completes
///
/// The caller must unmap the buffer once it is done with the mapped range.
/// If polling fails the pending mapping is aborted, leaving the buffer
/// unmapped and reusable.
pub async fn map_for_read(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<(), FrameError> {
    let buffer_slice = buffer.slice(..);

    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        // The receiver only disappears if the frame was abandoned
        let _ = sender.send(result);
    });

    if let Err(error) = device.poll(wgpu::PollType::Wait) {
        buffer.unmap();
        return Err(error.into());
    }

    receiver.receive().await.ok_or(FrameError::ReadbackCancelled)??;
    Ok(())
}

/// Reads a padded `Rgba8Unorm` readback buffer into `image`, then unmaps it
///
/// `image` must already have the copied texture's dimensions.
pub async fn read_rgba8_into(device: &wgpu::Device, buffer: &wgpu::Buffer, image: &mut image::RgbaImage) -> Result<(), FrameError> {
    map_for_read(device, buffer).await?;

    {
        let data = buffer.slice(..).get_mapped_range();
        let (width, height) = image.dimensions();
        let row_bytes = (width * RGBA8_BYTES_PER_PIXEL) as usize;
        let padded_row_bytes = padded_bytes_per_row(width, RGBA8_BYTES_PER_PIXEL) as usize;
        unpad_rows(&data, padded_row_bytes, row_bytes, height as usize, &mut **image);
    }

    buffer.unmap();
    Ok(())
}
