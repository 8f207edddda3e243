use std::path::Path;

use tracing::info;

use crate::flux::{FluxLoader, FluxVariant};
use crate::{EngineError, Loader, ModelLike, TuningFlags};

/// Enum of supported model families
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelType {
    Flux,
}

impl ModelType {
    /// Detect model type from a model name or file name
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name_upper = model_name.to_uppercase();

        if name_upper.contains("FLUX") {
            Some(ModelType::Flux)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelVariant {
    Flux(FluxVariant),
}

impl ModelVariant {
    /// Detect model variant from a model name or file name
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name_upper = model_name.to_uppercase();

        if name_upper.contains("FLUX") {
            Some(ModelVariant::Flux(if name_upper.contains("DEV") {
                FluxVariant::Dev
            } else {
                FluxVariant::Schnell
            }))
        } else {
            None
        }
    }
}

/// Picks the engine from the model file name on every `load`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoLoader;

impl Loader for AutoLoader {
    fn load(
        &self,
        model_path: &Path,
        flags: &TuningFlags,
    ) -> Result<Box<dyn ModelLike>, EngineError> {
        let model_name = model_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let model_type = ModelType::from_name(&model_name).ok_or_else(|| {
            EngineError::context_init(format!("unsupported model type: {model_name}"))
        })?;

        info!(model = %model_path.display(), ?model_type, "selected engine");

        match model_type {
            ModelType::Flux => FluxLoader.load(model_path, flags),
        }
    }
}
