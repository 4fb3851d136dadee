use anyhow::Result;

use crate::landmarks::LandmarkSet;

/// Construction-time settings for a pose detector.
///
/// These are handed to backend factories; the rule evaluator never sees them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorSettings {
    /// Accuracy/complexity tier, 0 (fastest) to 2 (most accurate).
    pub model_complexity: u8,
    /// Minimum pose-presence score for a detection to be reported.
    pub min_detection_confidence: f32,
    /// True for independent still images, false for consecutive video frames.
    pub static_image_mode: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_complexity: 2,
            min_detection_confidence: 0.5,
            static_image_mode: true,
        }
    }
}

impl DetectorSettings {
    pub fn for_video(self) -> Self {
        Self {
            static_image_mode: false,
            ..self
        }
    }
}

/// Pose landmark detector backend.
///
/// A backend is created per request and dropped when the request completes,
/// so implementations may keep per-stream state without synchronization.
pub trait PoseBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a row-major RGB24 frame.
    ///
    /// Returns `Ok(None)` when no body is found. Errors are reserved for
    /// faults (bad input dimensions, model failure), not for empty scenes.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Option<LandmarkSet>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
