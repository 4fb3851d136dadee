//! Decoded frames.
//!
//! Every image and video frame is normalized to a row-major RGB24 buffer
//! before it reaches a detector backend.

use anyhow::{anyhow, Result};

use crate::detect::PoseBackend;
use crate::landmarks::LandmarkSet;

/// Row-major RGB24 frame.
pub struct RgbFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RgbFrame {
    /// Wrap a pixel buffer, checking that it matches the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Uniformly filled frame, mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            data,
            width,
            height,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Run a detector backend on this frame.
    pub fn run_detector(&self, backend: &mut dyn PoseBackend) -> Result<Option<LandmarkSet>> {
        backend.detect(&self.data, self.width, self.height)
    }
}

impl std::fmt::Debug for RgbFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content is never logged.
        f.debug_struct("RgbFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
