//! Posture Kernel
//!
//! This crate evaluates body posture from pose landmarks for two exercise
//! contexts (squat and desk sitting) and serves the evaluation over HTTP.
//!
//! # Pipeline
//!
//! 1. An image or video payload is decoded into RGB frames.
//! 2. A detector backend turns each frame into a landmark set (or reports no pose).
//! 3. The rule evaluator gates on landmark visibility, computes joint angles,
//!    and returns an ordered list of issues.
//!
//! # Module Structure
//!
//! - `geometry`: 2D points and the three-point joint angle
//! - `landmarks`: joint vocabulary and landmark sets
//! - `rules`: visibility gate, squat and desk rule sets, `evaluate`
//! - `detect`: detector backend trait, registry, fixture/tract backends
//! - `frame`: decoded RGB frames handed to detectors
//! - `ingest`: base64 payloads, still images, video frame sources
//! - `pipeline`: frame-by-frame video analysis
//! - `analysis`: request/response types and the per-request service
//! - `api`: HTTP server
//! - `config`: service configuration (JSON file + environment)

pub mod analysis;
pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod landmarks;
pub mod pipeline;
pub mod rules;

pub use analysis::{
    analyze_frame, analyze_landmarks, ImageAnalysisRequest, ImageAnalysisResponse,
    InvalidInputData, Metrics, PostureService, VideoAnalysisRequest, VideoAnalysisResponse,
};
pub use detect::{BackendRegistry, DetectorSettings, FixtureBackend, PoseBackend};
pub use frame::RgbFrame;
pub use geometry::{angle_at, Point};
pub use landmarks::{visibilities_for, Landmark, LandmarkSet, PoseLandmark};
pub use pipeline::{analyze_frames, FrameAnalysis};
pub use rules::{evaluate, AnalysisResult, ExerciseType, Issue, PostureRules};

