use std::path::PathBuf;

use tracing::info;

use crate::{invoker, writer, GenerationContext, JobError, Loader, ParameterSet, TuningFlags};

/// Open a context, generate, close the context, then persist the image.
///
/// The context is closed before the image is written and is released on
/// every error path. Returns the path the image was written to.
pub fn execute(
    loader: &dyn Loader,
    flags: &TuningFlags,
    params: &ParameterSet,
) -> Result<PathBuf, JobError> {
    info!(params = %params.summary(), "generating image");

    let artifact = {
        let mut ctx = GenerationContext::open(loader, &params.model_path, flags)?;
        let generated = invoker::generate(&mut ctx, params);
        ctx.close();
        generated?
    };

    writer::write(artifact, &params.output_path)?;
    info!(path = %params.output_path.display(), "image saved");
    Ok(params.output_path.clone())
}
