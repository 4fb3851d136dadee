//! Frame-by-frame video analysis.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::detect::PoseBackend;
use crate::ingest::FrameSource;
use crate::rules::{evaluate, AnalysisResult, Issue};

/// Evaluation of one video frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAnalysis {
    pub frame_index: u64,
    pub has_pose: bool,
    pub issues: Vec<Issue>,
    /// Average visibility of the rule set's required joints.
    pub confidence: f32,
    pub visibilities: Vec<f32>,
}

impl FrameAnalysis {
    pub fn no_pose(frame_index: u64) -> Self {
        Self {
            frame_index,
            has_pose: false,
            issues: vec![Issue::NoPoseDetected],
            confidence: 0.0,
            visibilities: Vec::new(),
        }
    }

    pub fn from_result(frame_index: u64, result: AnalysisResult) -> Self {
        Self {
            frame_index,
            has_pose: true,
            issues: result.issues,
            confidence: result.average_visibility,
            visibilities: result.visibilities,
        }
    }
}

/// Evaluate every frame the source yields, in order, starting at index 0.
///
/// A frame without a detected body is recorded, not treated as a failure.
/// Detector or decoder faults abort the whole run; no partial sequence is
/// returned.
pub fn analyze_frames(
    source: &mut dyn FrameSource,
    backend: &mut dyn PoseBackend,
    exercise: &str,
) -> Result<Vec<FrameAnalysis>> {
    let mut analyses = Vec::new();
    let mut frame_index = 0u64;

    while let Some(frame) = source
        .next_frame()
        .with_context(|| format!("decode video frame {}", frame_index))?
    {
        let landmarks = frame
            .run_detector(backend)
            .with_context(|| format!("detect pose in frame {}", frame_index))?;
        let analysis = match landmarks {
            Some(landmarks) => {
                FrameAnalysis::from_result(frame_index, evaluate(exercise, &landmarks))
            }
            None => {
                log::debug!("frame {}: no pose detected", frame_index);
                FrameAnalysis::no_pose(frame_index)
            }
        };
        analyses.push(analysis);
        frame_index += 1;
    }

    log::info!(
        "video analysis complete: {} frames decoded via {} backend",
        source.stats().frames_decoded,
        backend.name()
    );
    Ok(analyses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::FixtureBackend;
    use crate::frame::RgbFrame;
    use crate::ingest::MemoryFrameSource;
    use crate::landmarks::{Landmark, LandmarkSet, PoseLandmark};

    fn upright_squat() -> LandmarkSet {
        use PoseLandmark::*;
        // Straight shoulder-hip-knee line, knees behind ankles.
        let mut set = LandmarkSet::new();
        for (shoulder, hip, knee, ankle) in [
            (LeftShoulder, LeftHip, LeftKnee, LeftAnkle),
            (RightShoulder, RightHip, RightKnee, RightAnkle),
        ] {
            set.insert(shoulder, Landmark::new(0.5, 0.2, 0.9));
            set.insert(hip, Landmark::new(0.5, 0.5, 0.9));
            set.insert(knee, Landmark::new(0.5, 0.7, 0.9));
            set.insert(ankle, Landmark::new(0.52, 0.9, 0.9));
        }
        set
    }

    fn frames(count: usize) -> MemoryFrameSource {
        MemoryFrameSource::new((0..count).map(|_| RgbFrame::filled(4, 4, [0, 0, 0])))
    }

    #[test]
    fn missing_pose_is_recorded_per_frame() -> Result<()> {
        let script = (0..10)
            .map(|i| if i == 5 { None } else { Some(upright_squat()) })
            .collect();
        let mut backend = FixtureBackend::new(script);
        let mut source = frames(10);

        let analyses = analyze_frames(&mut source, &mut backend, "squat")?;
        assert_eq!(analyses.len(), 10);
        assert_eq!(source.stats().frames_decoded, 10);
        for (i, analysis) in analyses.iter().enumerate() {
            assert_eq!(analysis.frame_index, i as u64);
            if i == 5 {
                assert!(!analysis.has_pose);
                assert_eq!(analysis.issues, vec![Issue::NoPoseDetected]);
                assert_eq!(analysis.confidence, 0.0);
                assert!(analysis.visibilities.is_empty());
            } else {
                assert!(analysis.has_pose);
                assert_eq!(analysis.issues, vec![Issue::GoodPosture]);
                assert!((analysis.confidence - 0.9).abs() < 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn empty_video_yields_no_frames() -> Result<()> {
        let mut backend = FixtureBackend::constant(upright_squat());
        let analyses = analyze_frames(&mut frames(0), &mut backend, "squat")?;
        assert!(analyses.is_empty());
        assert_eq!(backend.frames_seen(), 0);
        Ok(())
    }

    #[test]
    fn invalid_exercise_applies_to_every_posed_frame() -> Result<()> {
        let mut backend = FixtureBackend::new(vec![Some(upright_squat()), None]);
        let analyses = analyze_frames(&mut frames(3), &mut backend, "yoga")?;
        assert_eq!(analyses[0].issues, vec![Issue::InvalidExerciseType]);
        assert!(analyses[0].has_pose);
        assert_eq!(analyses[1].issues, vec![Issue::NoPoseDetected]);
        assert_eq!(analyses[2].issues, vec![Issue::NoPoseDetected]);
        Ok(())
    }

    #[test]
    fn serializes_with_camel_case_keys() -> Result<()> {
        let json = serde_json::to_value(FrameAnalysis::no_pose(3))?;
        assert_eq!(json["frameIndex"], 3);
        assert_eq!(json["hasPose"], false);
        assert_eq!(json["issues"][0], "No pose detected");
        Ok(())
    }
}
