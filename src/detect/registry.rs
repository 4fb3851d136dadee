use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::{DetectorSettings, PoseBackend};

type BackendFactory = dyn Fn(DetectorSettings) -> Result<Box<dyn PoseBackend>> + Send + Sync;

/// Registry of detector backend factories.
///
/// Detectors are expensive and not assumed to be safe for concurrent use, so
/// the registry hands out a fresh instance per request instead of sharing one.
/// Cloning the registry is cheap; factories are reference counted.
#[derive(Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, Arc<BackendFactory>>,
    default_name: Option<String>,
    settings: DetectorSettings,
}

impl BackendRegistry {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
            settings,
        }
    }

    /// Register a factory. The first registered backend becomes the default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(DetectorSettings) -> Result<Box<dyn PoseBackend>> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Construct a new backend instance by name.
    pub fn create(&self, name: &str, settings: DetectorSettings) -> Result<Box<dyn PoseBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("backend '{}' not registered", name))?;
        let mut backend = factory(settings)?;
        backend.warm_up()?;
        Ok(backend)
    }

    /// Construct the default backend for still images.
    pub fn create_default(&self) -> Result<Box<dyn PoseBackend>> {
        self.create(self.default_name()?, self.settings)
    }

    /// Construct the default backend for consecutive video frames.
    pub fn create_default_for_video(&self) -> Result<Box<dyn PoseBackend>> {
        self.create(self.default_name()?, self.settings.for_video())
    }

    fn default_name(&self) -> Result<&str> {
        self.default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no detector backend registered"))
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(DetectorSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::FixtureBackend;
    use crate::landmarks::LandmarkSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn first_registered_is_default() -> Result<()> {
        let mut registry = BackendRegistry::default();
        registry.register("fixture", |_| Ok(Box::new(FixtureBackend::no_pose())));
        registry.register("other", |_| {
            Ok(Box::new(FixtureBackend::constant(LandmarkSet::new())))
        });

        let mut backend = registry.create_default()?;
        assert_eq!(backend.name(), "fixture");
        assert!(backend.detect(&[0, 0, 0], 1, 1)?.is_none());
        assert_eq!(registry.list(), vec!["fixture", "other"]);
        assert!(registry.set_default("missing").is_err());
        Ok(())
    }

    #[test]
    fn each_request_gets_a_fresh_backend() -> Result<()> {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut registry = BackendRegistry::default();
        registry.register("fixture", move |settings| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(!settings.static_image_mode);
            Ok(Box::new(FixtureBackend::no_pose()))
        });

        registry.create_default_for_video()?;
        registry.clone().create_default_for_video()?;
        assert_eq!(built.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn empty_registry_has_no_default() {
        assert!(BackendRegistry::default().create_default().is_err());
    }
}
