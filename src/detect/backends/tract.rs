#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorSettings, PoseBackend};
use crate::landmarks::{Landmark, LandmarkSet, LANDMARK_COUNT};

/// Values per landmark in the model output: x, y, z, visibility, presence.
const LANDMARK_STRIDE: usize = 5;

/// Tract-based pose landmark backend for ONNX models.
///
/// Expects a single-person landmark model taking a `1x3xSxS` RGB tensor in
/// `[0, 1]`. Output 0 holds 33 landmarks of `x, y, z, visibility, presence`
/// in input pixel units with visibility as a logit; output 1 holds the pose
/// presence score. Frames are resized to the model input before inference.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    settings: DetectorSettings,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: u32,
        settings: DetectorSettings,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract pose backend loaded {} (complexity {}, min confidence {:.2})",
            model_path.display(),
            settings.model_complexity,
            settings.min_detection_confidence
        );

        Ok(Self {
            model,
            input_size,
            settings,
        })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let frame = image::RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))?;
        let resized = image::imageops::resize(
            &frame,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );

        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        });

        Ok(input.into_tensor())
    }

    fn extract_landmarks(&self, outputs: &TVec<TValue>) -> Result<Option<LandmarkSet>> {
        let presence = match outputs.get(1) {
            Some(output) => {
                let scores = output
                    .to_array_view::<f32>()
                    .context("pose presence tensor was not f32")?;
                Some(scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max))
            }
            None => None,
        };
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let raw = output
            .to_array_view::<f32>()
            .context("landmark tensor was not f32")?;
        let values: Vec<f32> = raw.iter().cloned().collect();
        decode_landmarks(
            &values,
            presence,
            self.input_size,
            self.settings.min_detection_confidence,
        )
    }
}

/// Turn raw model output into normalized landmarks.
///
/// `values` holds `x, y, z, visibility, presence` per joint in input pixels.
/// A missing presence score counts as a detection.
fn decode_landmarks(
    values: &[f32],
    presence: Option<f32>,
    input_size: u32,
    min_detection_confidence: f32,
) -> Result<Option<LandmarkSet>> {
    let presence = presence.unwrap_or(1.0);
    if !presence.is_finite() || presence < min_detection_confidence {
        return Ok(None);
    }
    if values.len() < LANDMARK_COUNT * LANDMARK_STRIDE {
        return Err(anyhow!(
            "landmark tensor has {} values, expected at least {}",
            values.len(),
            LANDMARK_COUNT * LANDMARK_STRIDE
        ));
    }

    let side = input_size as f32;
    let landmarks = values
        .chunks_exact(LANDMARK_STRIDE)
        .take(LANDMARK_COUNT)
        .map(|v| Landmark::new(v[0] / side, v[1] / side, sigmoid(v[3])));
    Ok(Some(LandmarkSet::from_ordered(landmarks)))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl PoseBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Option<LandmarkSet>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_landmarks(&outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::PoseLandmark;

    fn tensor(size: f32) -> Vec<f32> {
        (0..LANDMARK_COUNT)
            .flat_map(|i| [i as f32 * 2.0, size / 2.0, 0.0, 0.0, 1.0])
            .collect()
    }

    #[test]
    fn low_presence_is_no_pose() -> Result<()> {
        assert!(decode_landmarks(&tensor(256.0), Some(0.2), 256, 0.5)?.is_none());
        assert!(decode_landmarks(&tensor(256.0), Some(f32::NAN), 256, 0.5)?.is_none());
        Ok(())
    }

    #[test]
    fn coordinates_are_normalized_and_visibility_squashed() -> Result<()> {
        let mut values = tensor(256.0);
        values[PoseLandmark::LeftKnee.index() * LANDMARK_STRIDE + 3] = 20.0;

        let set = decode_landmarks(&values, None, 256, 0.5)?.expect("pose");
        assert_eq!(set.len(), LANDMARK_COUNT);
        let knee = set.get(PoseLandmark::LeftKnee);
        assert!((knee.x - 50.0 / 256.0).abs() < 1e-6);
        assert!((knee.y - 0.5).abs() < 1e-6);
        assert!(knee.visibility > 0.99);
        assert!((set.get(PoseLandmark::Nose).visibility - 0.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn short_tensor_is_an_error() {
        let values = vec![0.0; LANDMARK_STRIDE * 10];
        assert!(decode_landmarks(&values, Some(0.9), 256, 0.5).is_err());
    }
}
