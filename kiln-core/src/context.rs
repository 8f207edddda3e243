use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::{EngineError, Loader, ModelLike, TuningFlags};

/// A generation context owned by exactly one job.
///
/// The engine context is released by [`GenerationContext::close`] or, on any
/// other exit path, when the value is dropped. Release happens once.
pub struct GenerationContext {
    model: Option<Box<dyn ModelLike>>,
    model_path: PathBuf,
    opened_at: Instant,
}

impl GenerationContext {
    /// Load `model_path` into a fresh engine context.
    ///
    /// # Errors
    /// Any loader failure is reported as [`EngineError::ContextInit`]; nothing
    /// stays allocated in that case.
    pub fn open(
        loader: &dyn Loader,
        model_path: &Path,
        flags: &TuningFlags,
    ) -> Result<Self, EngineError> {
        let started = Instant::now();
        debug!(model = %model_path.display(), ?flags, "opening generation context");

        let model = loader.load(model_path, flags).map_err(|err| {
            warn!(model = %model_path.display(), error = %err, "context init failed");
            match err {
                EngineError::ContextInit(_) => err,
                other => EngineError::context_init(other),
            }
        })?;

        info!(
            model = %model_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation context opened"
        );
        Ok(Self {
            model: Some(model),
            model_path: model_path.to_path_buf(),
            opened_at: Instant::now(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.model.is_some()
    }

    pub(crate) fn model_mut(&mut self) -> Result<&mut (dyn ModelLike + 'static), EngineError> {
        match self.model.as_deref_mut() {
            Some(model) => Ok(model),
            None => Err(EngineError::context_init("context already closed")),
        }
    }

    /// Destroy the engine context.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(model) = self.model.take() {
            drop(model);
            info!(
                model = %self.model_path.display(),
                held_ms = self.opened_at.elapsed().as_millis() as u64,
                "generation context closed"
            );
        }
    }
}

impl Drop for GenerationContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for GenerationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationContext")
            .field("model_path", &self.model_path)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBehavior, MockLoader};

    #[test]
    fn close_releases_exactly_once() {
        let loader = MockLoader::new(MockBehavior::Succeed);
        let ctx = GenerationContext::open(&loader, Path::new("m.safetensors"), &TuningFlags::default())
            .unwrap();
        assert!(ctx.is_open());
        ctx.close();

        let counts = loader.counters().snapshot();
        assert_eq!((counts.opens, counts.closes), (1, 1));
    }

    #[test]
    fn drop_releases_when_close_is_skipped() {
        let loader = MockLoader::new(MockBehavior::Succeed);
        {
            let _ctx =
                GenerationContext::open(&loader, Path::new("m.safetensors"), &TuningFlags::default())
                    .unwrap();
        }
        assert_eq!(loader.counters().snapshot().closes, 1);
    }

    #[test]
    fn failed_open_is_a_context_init_error_and_leaves_nothing_open() {
        let loader = MockLoader::new(MockBehavior::FailOpen);
        let err = GenerationContext::open(&loader, Path::new("m.safetensors"), &TuningFlags::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::ContextInit(_)));

        let counts = loader.counters().snapshot();
        assert_eq!((counts.open_attempts, counts.opens, counts.closes), (1, 0, 0));
    }
}
