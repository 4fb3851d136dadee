//! Posture rule evaluation.
//!
//! Each exercise context has a fixed rule set: a list of required joints and a
//! `check` that turns joint angles and positions into issues. Evaluation always
//! produces an `AnalysisResult`; unusable input becomes a sentinel issue, never
//! an error crossing this boundary.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::angle_at;
use crate::landmarks::{visibilities_for, LandmarkSet, PoseLandmark};

/// A joint counts as visible at or above this detector confidence.
pub const VISIBILITY_THRESHOLD: f32 = 0.3;
/// Minimum number of visible required joints before any angle is computed.
pub const MIN_VISIBLE_JOINTS: usize = 5;
/// Shoulder-hip-knee angle below which the back is considered bent.
pub const BACK_ANGLE_MIN_DEG: f32 = 130.0;
/// Ear-shoulder-hip angle above which the neck is considered bent.
pub const NECK_ANGLE_MAX_DEG: f32 = 45.0;

/// Human-readable feedback item. Serializes as its message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Issue {
    #[serde(rename = "Good posture!")]
    GoodPosture,
    #[serde(rename = "Pose not clear")]
    PoseNotClear,
    #[serde(rename = "Back bent")]
    BackBent,
    #[serde(rename = "Knee over toe")]
    KneeOverToe,
    #[serde(rename = "Neck bent")]
    NeckBent,
    #[serde(rename = "Back slouched")]
    BackSlouched,
    #[serde(rename = "Invalid exercise type")]
    InvalidExerciseType,
    #[serde(rename = "Error calculating angles")]
    AngleComputationError,
    #[serde(rename = "No pose detected")]
    NoPoseDetected,
    #[serde(rename = "Invalid image data")]
    InvalidImageData,
}

impl Issue {
    pub fn as_str(self) -> &'static str {
        match self {
            Issue::GoodPosture => "Good posture!",
            Issue::PoseNotClear => "Pose not clear",
            Issue::BackBent => "Back bent",
            Issue::KneeOverToe => "Knee over toe",
            Issue::NeckBent => "Neck bent",
            Issue::BackSlouched => "Back slouched",
            Issue::InvalidExerciseType => "Invalid exercise type",
            Issue::AngleComputationError => "Error calculating angles",
            Issue::NoPoseDetected => "No pose detected",
            Issue::InvalidImageData => "Invalid image data",
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Posture context selecting which rule set applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseType {
    Squat,
    Desk,
}

impl ExerciseType {
    /// Case-insensitive lookup. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "squat" => Some(ExerciseType::Squat),
            "desk" => Some(ExerciseType::Desk),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExerciseType::Squat => "squat",
            ExerciseType::Desk => "desk",
        }
    }

    pub fn rules(self) -> &'static dyn PostureRules {
        match self {
            ExerciseType::Squat => &SquatRules,
            ExerciseType::Desk => &DeskRules,
        }
    }
}

/// Outcome of evaluating one image or frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Never empty.
    pub issues: Vec<Issue>,
    pub average_visibility: f32,
    /// One entry per required joint, in rule-set order.
    pub visibilities: Vec<f32>,
}

impl AnalysisResult {
    pub fn invalid_exercise() -> Self {
        Self {
            issues: vec![Issue::InvalidExerciseType],
            average_visibility: 0.0,
            visibilities: Vec::new(),
        }
    }

    pub fn has_issue(&self, issue: Issue) -> bool {
        self.issues.contains(&issue)
    }
}

/// An exercise-specific rule set.
pub trait PostureRules: Sync {
    fn exercise(&self) -> ExerciseType;

    /// Joints whose visibility gates evaluation, in reporting order.
    fn required_joints(&self) -> &'static [PoseLandmark];

    /// Apply the thresholds. Returns an empty list when nothing is wrong.
    fn check(&self, landmarks: &LandmarkSet) -> Result<Vec<Issue>>;
}

/// Squat: back angle and knee travel past the ankle.
pub struct SquatRules;

const SQUAT_JOINTS: [PoseLandmark; 8] = [
    PoseLandmark::LeftShoulder,
    PoseLandmark::LeftHip,
    PoseLandmark::LeftKnee,
    PoseLandmark::LeftAnkle,
    PoseLandmark::RightShoulder,
    PoseLandmark::RightHip,
    PoseLandmark::RightKnee,
    PoseLandmark::RightAnkle,
];

impl PostureRules for SquatRules {
    fn exercise(&self) -> ExerciseType {
        ExerciseType::Squat
    }

    fn required_joints(&self) -> &'static [PoseLandmark] {
        &SQUAT_JOINTS
    }

    fn check(&self, landmarks: &LandmarkSet) -> Result<Vec<Issue>> {
        use PoseLandmark::*;

        let left_back = joint_angle(landmarks, LeftShoulder, LeftHip, LeftKnee)?;
        let right_back = joint_angle(landmarks, RightShoulder, RightHip, RightKnee)?;
        let left_knee = landmarks.get(LeftKnee);
        let left_ankle = landmarks.get(LeftAnkle);
        let right_knee = landmarks.get(RightKnee);
        let right_ankle = landmarks.get(RightAnkle);
        log::debug!(
            "Squat: back angle left={:.2} right={:.2}",
            left_back,
            right_back
        );
        log::debug!(
            "Squat: knee x left={:.2} right={:.2}, ankle x left={:.2} right={:.2}",
            left_knee.x,
            right_knee.x,
            left_ankle.x,
            right_ankle.x
        );

        let mut issues = Vec::new();
        if left_back < BACK_ANGLE_MIN_DEG || right_back < BACK_ANGLE_MIN_DEG {
            issues.push(Issue::BackBent);
        }
        // Raw x comparison; facing direction is not inferred (known limitation).
        if left_knee.x > left_ankle.x || right_knee.x > right_ankle.x {
            issues.push(Issue::KneeOverToe);
        }
        Ok(issues)
    }
}

/// Desk sitting: neck tilt and back slouch.
pub struct DeskRules;

const DESK_JOINTS: [PoseLandmark; 8] = [
    PoseLandmark::LeftEar,
    PoseLandmark::LeftShoulder,
    PoseLandmark::LeftHip,
    PoseLandmark::LeftKnee,
    PoseLandmark::RightEar,
    PoseLandmark::RightShoulder,
    PoseLandmark::RightHip,
    PoseLandmark::RightKnee,
];

impl PostureRules for DeskRules {
    fn exercise(&self) -> ExerciseType {
        ExerciseType::Desk
    }

    fn required_joints(&self) -> &'static [PoseLandmark] {
        &DESK_JOINTS
    }

    fn check(&self, landmarks: &LandmarkSet) -> Result<Vec<Issue>> {
        use PoseLandmark::*;

        let left_neck = joint_angle(landmarks, LeftEar, LeftShoulder, LeftHip)?;
        let right_neck = joint_angle(landmarks, RightEar, RightShoulder, RightHip)?;
        let left_back = joint_angle(landmarks, LeftShoulder, LeftHip, LeftKnee)?;
        let right_back = joint_angle(landmarks, RightShoulder, RightHip, RightKnee)?;
        log::debug!(
            "Desk: neck angle left={:.2} right={:.2}",
            left_neck,
            right_neck
        );
        log::debug!(
            "Desk: back angle left={:.2} right={:.2}",
            left_back,
            right_back
        );

        let mut issues = Vec::new();
        if left_neck > NECK_ANGLE_MAX_DEG || right_neck > NECK_ANGLE_MAX_DEG {
            issues.push(Issue::NeckBent);
        }
        if left_back < BACK_ANGLE_MIN_DEG || right_back < BACK_ANGLE_MIN_DEG {
            issues.push(Issue::BackSlouched);
        }
        Ok(issues)
    }
}

fn joint_angle(
    landmarks: &LandmarkSet,
    a: PoseLandmark,
    vertex: PoseLandmark,
    c: PoseLandmark,
) -> Result<f32> {
    angle_at(
        landmarks.get(a).point(),
        landmarks.get(vertex).point(),
        landmarks.get(c).point(),
    )
}

/// Evaluate `landmarks` against the named exercise (case-insensitive).
pub fn evaluate(exercise: &str, landmarks: &LandmarkSet) -> AnalysisResult {
    match ExerciseType::parse(exercise) {
        Some(exercise) => evaluate_rules(exercise.rules(), landmarks),
        None => {
            log::error!("invalid exercise type: {}", exercise);
            AnalysisResult::invalid_exercise()
        }
    }
}

/// Run the visibility gate and, if it passes, the rule set's checks.
pub fn evaluate_rules(rules: &dyn PostureRules, landmarks: &LandmarkSet) -> AnalysisResult {
    let exercise = rules.exercise().as_str();
    let required = rules.required_joints();
    let visibilities = visibilities_for(landmarks, required);
    let average_visibility = mean(&visibilities);
    let num_visible = visibilities
        .iter()
        .filter(|v| **v >= VISIBILITY_THRESHOLD)
        .count();
    log::debug!("{}: visibilities {:?}", exercise, visibilities);
    log::debug!(
        "{}: average visibility {:.2}, joints above threshold {}/{}",
        exercise,
        average_visibility,
        num_visible,
        required.len()
    );

    if num_visible < MIN_VISIBLE_JOINTS {
        log::warn!("{}: pose not clear, too few visible joints", exercise);
        return AnalysisResult {
            issues: vec![Issue::PoseNotClear],
            average_visibility,
            visibilities,
        };
    }

    let issues = match rules.check(landmarks) {
        Ok(issues) if issues.is_empty() => vec![Issue::GoodPosture],
        Ok(issues) => issues,
        Err(err) => {
            log::error!("{}: error calculating angles: {:#}", exercise, err);
            vec![Issue::AngleComputationError]
        }
    };
    log::info!("{}: issues {:?}", exercise, issues);

    AnalysisResult {
        issues,
        average_visibility,
        visibilities,
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
