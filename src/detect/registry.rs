use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::ScriptedBackend;

type BackendFactory = Box<dyn FnOnce() -> Result<Box<dyn DetectorBackend>>>;

/// Registry of detector backends available in this build.
///
/// Backends are registered as factories so that only the selected one loads
/// its model.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

/// Model settings handed to the `tract` backend.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelOptions {
    pub path: PathBuf,
    pub input_size: u32,
    /// Detections below this score are discarded before NMS.
    pub confidence_floor: f32,
    pub iou_threshold: f32,
}

impl ModelOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            input_size: 640,
            confidence_floor: 0.25,
            iou_threshold: 0.45,
        }
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a backend factory, replacing any previous one of that name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: FnOnce() -> Result<Box<dyn DetectorBackend>> + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Registry with every backend this build knows about.
    ///
    /// `tract` loads the YOLOv8 model described by `model`; it is always
    /// listed so that selecting it in a build without `backend-tract` reports
    /// a clear error. `scripted` never detects anything and is meant for dry
    /// runs.
    pub fn builtin(model: ModelOptions) -> Self {
        let mut registry = Self::new();
        registry.register("tract", move || {
            #[cfg(feature = "backend-tract")]
            {
                let backend = super::backends::TractBackend::new(
                    &model.path,
                    model.input_size,
                    super::labels::LabelTable::coco(),
                )?
                .with_confidence_floor(model.confidence_floor)
                .with_iou_threshold(model.iou_threshold);
                Ok(Box::new(backend) as Box<dyn DetectorBackend>)
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                let _ = model;
                Err(anyhow!("detector backend 'tract' requires the backend-tract feature"))
            }
        });
        registry.register("scripted", || Ok(Box::new(ScriptedBackend::coco())));
        registry
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Build the named backend, consuming the registry.
    pub fn build(mut self, name: &str) -> Result<Box<dyn DetectorBackend>> {
        let available = self.list().join(", ");
        let factory = self.factories.remove(name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                available
            )
        })?;
        factory()
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

    #[test]
    fn only_the_selected_factory_runs() -> Result<()> {
        let mut registry = BackendRegistry::new();
        registry.register("scripted", || Ok(Box::new(ScriptedBackend::coco())));
        registry.register("other", || Err(anyhow!("should not be built")));
        assert_eq!(registry.list(), vec!["other", "scripted"]);

        let backend = registry.build("scripted")?;
        assert_eq!(backend.name(), "scripted");
        Ok(())
    }

    #[test]
    fn builtin_lists_both_backends() -> Result<()> {
        let registry = BackendRegistry::builtin(ModelOptions::new("missing.onnx"));
        assert_eq!(registry.list(), vec!["scripted", "tract"]);
        let backend = registry.build("scripted")?;
        assert_eq!(backend.labels().resolve("person")?.0, 0);
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn tract_without_feature_explains_itself() {
        let registry = BackendRegistry::builtin(ModelOptions::new("missing.onnx"));
        let err = registry.build("tract").err().expect("tract unavailable");
        assert!(err.to_string().contains("backend-tract"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut registry = BackendRegistry::new();
        registry.register("scripted", || Ok(Box::new(ScriptedBackend::coco())));
        let err = registry.build("tract").err().expect("missing backend");
        assert!(err.to_string().contains("available: scripted"));
    }
}
