use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::api::{DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_CONNECTIONS};
#[cfg(feature = "backend-tract")]
use crate::detect::TractBackend;
use crate::detect::{BackendRegistry, DetectorSettings, FixtureBackend};
use crate::landmarks::LandmarkSet;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_BACKEND: &str = "fixture";
const DEFAULT_INPUT_SIZE: u32 = 256;
const DEFAULT_MODEL_COMPLEXITY: u8 = 2;
const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    api: Option<ApiConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_body_bytes: Option<usize>,
    max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    fixture_path: Option<PathBuf>,
    input_size: Option<u32>,
    model_complexity: Option<u8>,
    min_detection_confidence: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_addr: String,
    pub max_body_bytes: usize,
    pub max_connections: usize,
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// Landmark JSON replayed by the fixture backend; without it the fixture
    /// backend reports no pose.
    pub fixture_path: Option<PathBuf>,
    pub input_size: u32,
    pub model_complexity: u8,
    pub min_detection_confidence: f32,
}

impl DetectorConfig {
    pub fn settings(&self) -> DetectorSettings {
        DetectorSettings {
            model_complexity: self.model_complexity,
            min_detection_confidence: self.min_detection_confidence,
            ..DetectorSettings::default()
        }
    }

    /// Register every available backend and select the configured default.
    pub fn registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new(self.settings());

        let fixture = match &self.fixture_path {
            Some(path) => Some(LandmarkSet::load(path)?),
            None => None,
        };
        registry.register("fixture", move |_| {
            let backend = match &fixture {
                Some(landmarks) => FixtureBackend::constant(landmarks.clone()),
                None => FixtureBackend::no_pose(),
            };
            Ok(Box::new(backend))
        });

        #[cfg(feature = "backend-tract")]
        {
            if let Some(model_path) = self.model_path.clone() {
                let input_size = self.input_size;
                registry.register("tract", move |settings| {
                    Ok(Box::new(TractBackend::new(&model_path, input_size, settings)?))
                });
            }
        }

        registry.set_default(&self.backend)?;
        Ok(registry)
    }
}

impl ServiceConfig {
    /// Load from the JSON file named by `POSTURE_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POSTURE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_body_bytes: api.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            max_connections: api.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            detector: DetectorConfig {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector.model_path,
                fixture_path: detector.fixture_path,
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                model_complexity: detector
                    .model_complexity
                    .unwrap_or(DEFAULT_MODEL_COMPLEXITY),
                min_detection_confidence: detector
                    .min_detection_confidence
                    .unwrap_or(DEFAULT_MIN_DETECTION_CONFIDENCE),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("POSTURE_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(limit) = std::env::var("POSTURE_MAX_BODY_BYTES") {
            self.max_body_bytes = limit
                .parse()
                .map_err(|_| anyhow!("POSTURE_MAX_BODY_BYTES must be an integer byte count"))?;
        }
        if let Ok(limit) = std::env::var("POSTURE_MAX_CONNECTIONS") {
            self.max_connections = limit
                .parse()
                .map_err(|_| anyhow!("POSTURE_MAX_CONNECTIONS must be an integer"))?;
        }
        if let Ok(backend) = std::env::var("POSTURE_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("POSTURE_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("POSTURE_FIXTURE_PATH") {
            if !path.trim().is_empty() {
                self.detector.fixture_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(confidence) = std::env::var("POSTURE_MIN_DETECTION_CONFIDENCE") {
            self.detector.min_detection_confidence = confidence.parse().map_err(|_| {
                anyhow!("POSTURE_MIN_DETECTION_CONFIDENCE must be a number between 0 and 1")
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let confidence = self.detector.min_detection_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!(
                "min_detection_confidence must be within [0, 1], got {}",
                confidence
            ));
        }
        if self.detector.model_complexity > 2 {
            return Err(anyhow!(
                "model_complexity must be 0, 1 or 2, got {}",
                self.detector.model_complexity
            ));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than zero"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("max_connections must be greater than zero"));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("the tract backend requires detector.model_path"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
