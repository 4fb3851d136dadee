use anyhow::{Context, Result};

use crate::frame::RgbFrame;

/// Decode an encoded still image (JPEG or PNG) into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> Result<RgbFrame> {
    let decoded = image::load_from_memory(bytes).context("decode image")?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    RgbFrame::new(rgb.into_raw(), width, height)
}
