//! Image and video analysis requests.
//!
//! Composes payload decoding, a per-request detector backend, and the rule
//! evaluator into the two response shapes served by the API and the CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::detect::{BackendRegistry, PoseBackend};
use crate::frame::RgbFrame;
use crate::ingest::{decode_base64_payload, decode_image, open_video, FrameSource};
use crate::landmarks::{LandmarkSet, PoseLandmark};
use crate::pipeline::{analyze_frames, FrameAnalysis};
use crate::rules::{evaluate, AnalysisResult, Issue};

pub const DEFAULT_EXERCISE: &str = "squat";

/// Joints whose coordinates are logged for every detected image pose.
const LOGGED_JOINTS: [PoseLandmark; 10] = [
    PoseLandmark::LeftShoulder,
    PoseLandmark::RightShoulder,
    PoseLandmark::LeftHip,
    PoseLandmark::RightHip,
    PoseLandmark::LeftKnee,
    PoseLandmark::RightKnee,
    PoseLandmark::LeftAnkle,
    PoseLandmark::RightAnkle,
    PoseLandmark::LeftEar,
    PoseLandmark::RightEar,
];

fn default_exercise() -> String {
    DEFAULT_EXERCISE.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageAnalysisRequest {
    /// Base64 image, optionally as a data URL.
    pub image_data: String,
    #[serde(default = "default_exercise")]
    pub exercise_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoAnalysisRequest {
    /// Base64 video, optionally as a data URL.
    pub video_data: String,
    #[serde(default = "default_exercise")]
    pub exercise_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub average_visibility: f32,
    pub visibilities: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysisResponse {
    pub issues: Vec<Issue>,
    /// Absent when no judgment could be made on the image itself.
    pub metrics: Option<Metrics>,
}

impl ImageAnalysisResponse {
    fn sentinel(issue: Issue) -> Self {
        Self {
            issues: vec![issue],
            metrics: None,
        }
    }
}

impl From<AnalysisResult> for ImageAnalysisResponse {
    /// A failed angle computation carries no metrics, like the other image
    /// sentinels.
    fn from(result: AnalysisResult) -> Self {
        if result.has_issue(Issue::AngleComputationError) {
            return Self::sentinel(Issue::AngleComputationError);
        }
        Self {
            issues: result.issues,
            metrics: Some(Metrics {
                average_visibility: result.average_visibility,
                visibilities: result.visibilities,
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnalysisResponse {
    pub exercise_type: String,
    pub total_frames: u64,
    pub per_frame: Vec<FrameAnalysis>,
}

/// Caller-supplied data that could not be decoded.
#[derive(Clone, Debug)]
pub struct InvalidInputData {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for InvalidInputData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
impl std::error::Error for InvalidInputData {}

/// Request-scoped posture analysis.
///
/// Holds only backend factories; each call acquires its own detector and
/// drops it before returning, whatever the outcome.
#[derive(Clone)]
pub struct PostureService {
    registry: BackendRegistry,
}

impl PostureService {
    pub fn new(registry: BackendRegistry) -> Self {
        Self { registry }
    }

    /// Analyze a base64 image payload.
    ///
    /// Undecodable payloads and empty scenes are sentinel responses; only
    /// detector faults are errors.
    pub fn analyze_image(&self, request: &ImageAnalysisRequest) -> Result<ImageAnalysisResponse> {
        let bytes = match decode_base64_payload(&request.image_data) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("invalid image data: {:#}", err);
                return Ok(ImageAnalysisResponse::sentinel(Issue::InvalidImageData));
            }
        };
        self.analyze_image_bytes(&bytes, &request.exercise_type)
    }

    /// Analyze an encoded (JPEG/PNG) image.
    pub fn analyze_image_bytes(
        &self,
        bytes: &[u8],
        exercise: &str,
    ) -> Result<ImageAnalysisResponse> {
        let frame = match decode_image(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("invalid image data: {:#}", err);
                return Ok(ImageAnalysisResponse::sentinel(Issue::InvalidImageData));
            }
        };
        let mut backend = self.registry.create_default()?;
        analyze_frame(&frame, backend.as_mut(), exercise)
    }

    /// Analyze a base64 video payload frame by frame.
    ///
    /// An undecodable payload fails with an [`InvalidInputData`] error.
    pub fn analyze_video(&self, request: &VideoAnalysisRequest) -> Result<VideoAnalysisResponse> {
        let bytes = decode_base64_payload(&request.video_data).map_err(|err| InvalidInputData {
            code: "invalid_video_data",
            message: format!("{:#}", err),
        })?;
        let mut source = open_video(&bytes).map_err(|err| InvalidInputData {
            code: "invalid_video_data",
            message: format!("could not open video: {:#}", err),
        })?;
        self.analyze_video_source(source.as_mut(), &request.exercise_type)
    }

    /// Analyze frames from an already opened source.
    pub fn analyze_video_source(
        &self,
        source: &mut dyn FrameSource,
        exercise: &str,
    ) -> Result<VideoAnalysisResponse> {
        let mut backend = self.registry.create_default_for_video()?;
        let per_frame = analyze_frames(source, backend.as_mut(), exercise)
            .context("video analysis failed")?;
        Ok(VideoAnalysisResponse {
            exercise_type: exercise.to_string(),
            total_frames: per_frame.len() as u64,
            per_frame,
        })
    }
}

/// Detect and evaluate a single decoded image.
pub fn analyze_frame(
    frame: &RgbFrame,
    backend: &mut dyn PoseBackend,
    exercise: &str,
) -> Result<ImageAnalysisResponse> {
    let landmarks = match frame.run_detector(backend)? {
        Some(landmarks) => landmarks,
        None => {
            log::info!("no pose detected in image");
            return Ok(ImageAnalysisResponse::sentinel(Issue::NoPoseDetected));
        }
    };
    Ok(analyze_landmarks(&landmarks, exercise))
}

/// Evaluate landmarks that were detected elsewhere.
pub fn analyze_landmarks(landmarks: &LandmarkSet, exercise: &str) -> ImageAnalysisResponse {
    for joint in LOGGED_JOINTS {
        let landmark = landmarks.get(joint);
        log::debug!(
            "{:?}: x={:.3}, y={:.3}, vis={:.2}",
            joint,
            landmark.x,
            landmark.y,
            landmark.visibility
        );
    }
    let response = ImageAnalysisResponse::from(evaluate(exercise, landmarks));
    log::info!("final feedback: {:?}", response.issues);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::FixtureBackend;
    use crate::ingest::MemoryFrameSource;
    use crate::landmarks::Landmark;
    use base64::Engine;
    use std::io::Cursor;

    fn png_base64() -> Result<String> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 180, 160]));
        let mut encoded = Vec::new();
        img.write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(encoded))
    }

    fn desk_pose() -> LandmarkSet {
        use PoseLandmark::*;
        // Ear directly above a straight torso; thighs horizontal.
        LandmarkSet::new()
            .with(LeftEar, Landmark::new(0.5, 0.1, 0.8))
            .with(LeftShoulder, Landmark::new(0.5, 0.3, 0.8))
            .with(LeftHip, Landmark::new(0.5, 0.6, 0.8))
            .with(LeftKnee, Landmark::new(0.8, 0.6, 0.8))
            .with(RightEar, Landmark::new(0.5, 0.1, 0.8))
            .with(RightShoulder, Landmark::new(0.5, 0.3, 0.8))
            .with(RightHip, Landmark::new(0.5, 0.6, 0.8))
            .with(RightKnee, Landmark::new(0.8, 0.6, 0.8))
    }

    fn service(backend: impl Fn() -> FixtureBackend + Send + Sync + 'static) -> PostureService {
        let mut registry = BackendRegistry::default();
        registry.register("fixture", move |_| Ok(Box::new(backend())));
        PostureService::new(registry)
    }

    #[test]
    fn image_request_runs_rules() -> Result<()> {
        let svc = service(|| FixtureBackend::constant(desk_pose()));
        let request = ImageAnalysisRequest {
            image_data: format!("data:image/png;base64,{}", png_base64()?),
            exercise_type: "desk".to_string(),
        };
        let response = svc.analyze_image(&request)?;
        // Upright ear-shoulder-hip is 180°, thighs make a 90° hip angle.
        assert_eq!(response.issues, vec![Issue::NeckBent, Issue::BackSlouched]);
        let metrics = response.metrics.expect("metrics");
        assert_eq!(metrics.visibilities, vec![0.8; 8]);
        Ok(())
    }

    #[test]
    fn angle_failure_drops_metrics() -> Result<()> {
        let broken = desk_pose().with(PoseLandmark::LeftEar, Landmark::new(f32::NAN, 0.1, 0.8));
        let svc = service(move || FixtureBackend::constant(broken.clone()));
        let request = ImageAnalysisRequest {
            image_data: png_base64()?,
            exercise_type: "desk".to_string(),
        };
        let response = svc.analyze_image(&request)?;
        assert_eq!(response.issues, vec![Issue::AngleComputationError]);
        assert!(response.metrics.is_none());
        assert_eq!(serde_json::to_value(&response)?["metrics"], serde_json::Value::Null);
        Ok(())
    }

    #[test]
    fn undecodable_image_is_a_sentinel() -> Result<()> {
        let svc = service(|| FixtureBackend::constant(desk_pose()));
        for image_data in ["%%%", "aGVsbG8gd29ybGQ="] {
            let request = ImageAnalysisRequest {
                image_data: image_data.to_string(),
                exercise_type: default_exercise(),
            };
            let response = svc.analyze_image(&request)?;
            assert_eq!(response.issues, vec![Issue::InvalidImageData]);
            assert!(response.metrics.is_none());
        }
        Ok(())
    }

    #[test]
    fn empty_scene_reports_no_pose() -> Result<()> {
        let svc = service(FixtureBackend::no_pose);
        let request = ImageAnalysisRequest {
            image_data: png_base64()?,
            exercise_type: "squat".to_string(),
        };
        let response = svc.analyze_image(&request)?;
        assert_eq!(response.issues, vec![Issue::NoPoseDetected]);
        assert!(response.metrics.is_none());
        Ok(())
    }

    #[test]
    fn request_defaults_to_squat() -> Result<()> {
        let request: ImageAnalysisRequest = serde_json::from_str(r#"{"image_data": "abc"}"#)?;
        assert_eq!(request.exercise_type, "squat");
        Ok(())
    }

    #[test]
    fn video_source_counts_frames() -> Result<()> {
        let svc = service(|| FixtureBackend::new(vec![None, Some(desk_pose())]));
        let mut source =
            MemoryFrameSource::new((0..4).map(|_| RgbFrame::filled(2, 2, [9, 9, 9])));
        let response = svc.analyze_video_source(&mut source, "desk")?;
        assert_eq!(response.total_frames, 4);
        assert!(!response.per_frame[0].has_pose);
        assert!(response.per_frame[1..].iter().all(|f| f.has_pose));

        let json = serde_json::to_value(&response)?;
        assert_eq!(json["totalFrames"], 4);
        assert_eq!(json["perFrame"][0]["frameIndex"], 0);
        assert_eq!(json["exerciseType"], "desk");
        Ok(())
    }

    #[test]
    fn bad_video_payload_is_invalid_input() {
        let svc = service(FixtureBackend::no_pose);
        let request = VideoAnalysisRequest {
            video_data: "!!not-base64!!".to_string(),
            exercise_type: default_exercise(),
        };
        let err = svc.analyze_video(&request).unwrap_err();
        let input = err.downcast_ref::<InvalidInputData>().expect("input error");
        assert_eq!(input.code, "invalid_video_data");
    }
}
