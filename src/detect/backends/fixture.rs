use anyhow::{anyhow, Result};

use crate::detect::backend::PoseBackend;
use crate::landmarks::LandmarkSet;

/// Scripted backend for tests and demos.
///
/// Returns the scripted detections in order, one per call, then keeps
/// repeating the last entry. Pixels are validated but otherwise ignored.
pub struct FixtureBackend {
    script: Vec<Option<LandmarkSet>>,
    cursor: usize,
}

impl FixtureBackend {
    pub fn new(script: Vec<Option<LandmarkSet>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Reports the same landmarks for every frame.
    pub fn constant(landmarks: LandmarkSet) -> Self {
        Self::new(vec![Some(landmarks)])
    }

    /// Never finds a body.
    pub fn no_pose() -> Self {
        Self::new(Vec::new())
    }

    /// Number of frames seen so far.
    pub fn frames_seen(&self) -> usize {
        self.cursor
    }
}

impl Default for FixtureBackend {
    fn default() -> Self {
        Self::no_pose()
    }
}

impl PoseBackend for FixtureBackend {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Option<LandmarkSet>> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            ));
        }

        let index = self.cursor.min(self.script.len().saturating_sub(1));
        self.cursor += 1;
        Ok(self.script.get(index).cloned().flatten())
    }
}
