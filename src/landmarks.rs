//! Body landmarks as reported by a pose detector.
//!
//! A `LandmarkSet` maps joint names to detected positions. Lookups never fail:
//! a joint the detector did not report resolves to a placeholder with zero
//! visibility, so downstream rules degrade to "not clear" instead of erroring.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::geometry::Point;

/// Number of joints in the detector vocabulary.
pub const LANDMARK_COUNT: usize = 33;

/// Named body joints, in detector output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseLandmark {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl PoseLandmark {
    pub const ALL: [PoseLandmark; LANDMARK_COUNT] = [
        PoseLandmark::Nose,
        PoseLandmark::LeftEyeInner,
        PoseLandmark::LeftEye,
        PoseLandmark::LeftEyeOuter,
        PoseLandmark::RightEyeInner,
        PoseLandmark::RightEye,
        PoseLandmark::RightEyeOuter,
        PoseLandmark::LeftEar,
        PoseLandmark::RightEar,
        PoseLandmark::MouthLeft,
        PoseLandmark::MouthRight,
        PoseLandmark::LeftShoulder,
        PoseLandmark::RightShoulder,
        PoseLandmark::LeftElbow,
        PoseLandmark::RightElbow,
        PoseLandmark::LeftWrist,
        PoseLandmark::RightWrist,
        PoseLandmark::LeftPinky,
        PoseLandmark::RightPinky,
        PoseLandmark::LeftIndex,
        PoseLandmark::RightIndex,
        PoseLandmark::LeftThumb,
        PoseLandmark::RightThumb,
        PoseLandmark::LeftHip,
        PoseLandmark::RightHip,
        PoseLandmark::LeftKnee,
        PoseLandmark::RightKnee,
        PoseLandmark::LeftAnkle,
        PoseLandmark::RightAnkle,
        PoseLandmark::LeftHeel,
        PoseLandmark::RightHeel,
        PoseLandmark::LeftFootIndex,
        PoseLandmark::RightFootIndex,
    ];

    /// Position of this joint in the detector output tensor.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// A single detected joint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Detector confidence that the joint is correctly located, in `[0, 1]`.
    #[serde(default)]
    pub visibility: f32,
}

impl Landmark {
    /// Stand-in for a joint the detector did not report.
    pub const PLACEHOLDER: Landmark = Landmark {
        x: 0.0,
        y: 0.0,
        visibility: 0.0,
    };

    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Joint name → landmark for one image or frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    joints: BTreeMap<PoseLandmark, Landmark>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from detector output ordered by joint index.
    ///
    /// Extra entries beyond the 33-joint vocabulary are ignored.
    pub fn from_ordered(landmarks: impl IntoIterator<Item = Landmark>) -> Self {
        let joints = PoseLandmark::ALL.iter().copied().zip(landmarks).collect();
        Self { joints }
    }

    /// Read a landmark fixture: a JSON object keyed by joint name.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read landmarks {}: {}", path.display(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid landmarks {}: {}", path.display(), e))
    }

    pub fn insert(&mut self, joint: PoseLandmark, landmark: Landmark) {
        self.joints.insert(joint, landmark);
    }

    pub fn with(mut self, joint: PoseLandmark, landmark: Landmark) -> Self {
        self.insert(joint, landmark);
        self
    }

    /// Landmark for `joint`, or the zero-visibility placeholder if absent.
    pub fn get(&self, joint: PoseLandmark) -> Landmark {
        self.joints
            .get(&joint)
            .copied()
            .unwrap_or(Landmark::PLACEHOLDER)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

/// Visibility of each requested joint, in request order. Absent joints yield `0.0`.
pub fn visibilities_for(landmarks: &LandmarkSet, joints: &[PoseLandmark]) -> Vec<f32> {
    joints
        .iter()
        .map(|joint| landmarks.get(*joint).visibility)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_is_index_ordered() {
        assert_eq!(PoseLandmark::ALL.len(), LANDMARK_COUNT);
        for (i, joint) in PoseLandmark::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
            assert_eq!(PoseLandmark::from_index(i), Some(*joint));
        }
        assert_eq!(PoseLandmark::LeftShoulder.index(), 11);
        assert_eq!(PoseLandmark::RightAnkle.index(), 28);
        assert_eq!(PoseLandmark::from_index(LANDMARK_COUNT), None);
    }

    #[test]
    fn missing_joint_has_zero_visibility() {
        let set = LandmarkSet::new()
            .with(PoseLandmark::LeftHip, Landmark::new(0.4, 0.5, 0.9))
            .with(PoseLandmark::RightHip, Landmark::new(0.6, 0.5, 0.7));

        let vis = visibilities_for(
            &set,
            &[
                PoseLandmark::LeftHip,
                PoseLandmark::LeftKnee,
                PoseLandmark::RightHip,
            ],
        );
        assert_eq!(vis, vec![0.9, 0.0, 0.7]);
        assert_eq!(set.get(PoseLandmark::LeftKnee), Landmark::PLACEHOLDER);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn from_ordered_maps_by_index() {
        let set = LandmarkSet::from_ordered(
            (0..40).map(|i| Landmark::new(i as f32 / 100.0, 0.0, 1.0)),
        );
        assert_eq!(set.len(), LANDMARK_COUNT);
        assert_eq!(set.get(PoseLandmark::LeftKnee).x, 0.25);
    }

    #[test]
    fn json_uses_joint_names() -> Result<()> {
        let set: LandmarkSet = serde_json::from_str(
            r#"{"left_knee": {"x": 0.5, "y": 0.7, "visibility": 0.8}, "nose": {"x": 0.5, "y": 0.1}}"#,
        )?;
        assert_eq!(set.get(PoseLandmark::LeftKnee), Landmark::new(0.5, 0.7, 0.8));
        assert_eq!(set.get(PoseLandmark::Nose).visibility, 0.0);
        Ok(())
    }
}
