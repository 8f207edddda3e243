use std::path::Path;

use crate::{EngineError, ImageArtifact, ParameterSet, TuningFlags};

/// An open engine context: loaded weights bound to a device.
///
/// Dropping the value destroys the context and frees its resources.
pub trait ModelLike: Send {
    /// Run one synchronous text-to-image generation.
    ///
    /// `Ok(None)` means the engine finished without producing an image.
    fn generate(&mut self, params: &ParameterSet) -> Result<Option<ImageArtifact>, EngineError>;
}

/// Creates engine contexts from a model file.
pub trait Loader: Send + Sync {
    /// Blocking; may read gigabytes of weights.
    fn load(
        &self,
        model_path: &Path,
        flags: &TuningFlags,
    ) -> Result<Box<dyn ModelLike>, EngineError>;
}
