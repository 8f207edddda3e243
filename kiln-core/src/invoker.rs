use tracing::{debug, error, warn};

use crate::{EngineError, GenerationContext, ImageArtifact, ParameterSet};

/// Run a single generation on an open context. There is no retry.
///
/// An engine that finishes without pixels yields
/// [`EngineError::GenerationFailed`]; an engine that signals an error has
/// that error passed through. Both end up as the same HTTP failure.
pub fn generate(
    ctx: &mut GenerationContext,
    params: &ParameterSet,
) -> Result<ImageArtifact, EngineError> {
    let model = ctx.model_mut()?;
    match model.generate(params) {
        Ok(Some(artifact)) if !artifact.is_empty() => {
            debug!(
                width = artifact.width,
                height = artifact.height,
                channels = artifact.channels,
                "engine produced image"
            );
            Ok(artifact)
        }
        Ok(_) => {
            warn!("engine returned no image");
            Err(EngineError::GenerationFailed)
        }
        Err(err) => {
            error!(error = %err, "engine signaled a generation failure");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::testing::{MockBehavior, MockLoader};
    use crate::{GenerationDefaults, TuningFlags};

    fn params(seed: i64) -> ParameterSet {
        let map = serde_json::json!({ "prompt": "a cat", "seed": seed, "width": 64, "height": 128 });
        ParameterSet::from_map(map.as_object().unwrap(), &GenerationDefaults::default()).unwrap()
    }

    fn open(loader: &MockLoader) -> GenerationContext {
        GenerationContext::open(loader, Path::new("m.safetensors"), &TuningFlags::default()).unwrap()
    }

    #[test]
    fn same_parameters_give_same_shape() {
        let loader = MockLoader::new(MockBehavior::Succeed);
        let mut ctx = open(&loader);

        let first = generate(&mut ctx, &params(7)).unwrap();
        let second = generate(&mut ctx, &params(7)).unwrap();
        assert_eq!(first.shape(), second.shape());
        assert_eq!(first.shape(), (64, 128, 3));
    }

    #[test]
    fn null_and_empty_results_are_generation_failures() {
        for behavior in [MockBehavior::ReturnNothing, MockBehavior::ReturnEmpty] {
            let loader = MockLoader::new(behavior);
            let mut ctx = open(&loader);
            let err = generate(&mut ctx, &params(1)).unwrap_err();
            assert!(matches!(err, EngineError::GenerationFailed), "{behavior:?}");
        }
    }

    #[test]
    fn signaled_failures_are_passed_through() {
        let loader = MockLoader::new(MockBehavior::FailGenerate);
        let mut ctx = open(&loader);
        let err = generate(&mut ctx, &params(1)).unwrap_err();
        assert!(matches!(err, EngineError::Backend(_)));
        assert_eq!(loader.counters().snapshot().generates, 1);
    }
}
