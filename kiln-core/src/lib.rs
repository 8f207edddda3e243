//! Request-to-job orchestration for text-to-image generation.
//!
//! A request body becomes a [`ParameterSet`], which a [`worker`] turns into an
//! image file: open a [`GenerationContext`], run the engine once, close the
//! context, write the result.

pub mod artifact;
pub mod context;
pub mod device_map;
pub mod error;
pub mod flux;
pub mod invoker;
pub mod job;
pub mod loader;
mod loader_factory;
pub mod params;
pub mod tuning;
mod util;
pub mod worker;
pub mod writer;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use artifact::ImageArtifact;
pub use context::GenerationContext;
pub use device_map::*;
pub use error::*;
pub use flux::FluxLoader;
pub use loader::*;
pub use loader_factory::*;
pub use params::*;
pub use tuning::*;
pub(crate) use util::*;
pub use worker::{JobHandle, WorkerConfig};
