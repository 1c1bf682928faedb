use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

type BackendFactory = Box<dyn Fn() -> Box<dyn DetectorBackend> + Send + Sync>;

/// Registry of detector backends, keyed by model name.
///
/// Each session gets a fresh backend instance from the factory: the tracker
/// stage takes ownership of its detector and no detector state survives a
/// stop/start cycle.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend factory. The first registered model becomes the
    /// default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn DetectorBackend> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Set the default model by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("model '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Instantiate a backend for the given model name.
    pub fn create(&self, name: &str) -> Result<Box<dyn DetectorBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("model '{}' not registered", name))?;
        Ok(factory())
    }

    /// Instantiate the default backend.
    pub fn create_default(&self) -> Result<Box<dyn DetectorBackend>> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no models registered"))?;
        self.create(name)
    }

    /// List registered model names.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;

    #[test]
    fn first_registered_model_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register("stub", || Box::new(StubBackend::new()));
        registry.register("stub-2", || Box::new(StubBackend::new()));

        let backend = registry.create_default().expect("default backend");
        assert_eq!(backend.name(), "stub");
    }

    #[test]
    fn unknown_model_is_rejected() {
        let registry = BackendRegistry::new();
        assert!(registry.create("yolo").is_err());
        assert!(registry.create_default().is_err());
    }
}
