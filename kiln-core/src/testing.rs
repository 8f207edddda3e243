//! Instrumented engine doubles for tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{EngineError, ImageArtifact, Loader, ModelLike, ParameterSet, TuningFlags};

/// How the mock engine reacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockBehavior {
    Succeed,
    /// `load` fails.
    FailOpen,
    /// `generate` returns `Ok(None)`.
    ReturnNothing,
    /// `generate` returns an empty pixel buffer.
    ReturnEmpty,
    /// `generate` signals an error.
    FailGenerate,
    /// `generate` panics.
    Panic,
    /// `generate` succeeds after sleeping.
    Delay(Duration),
}

#[derive(Debug, Default)]
pub struct Counters {
    open_attempts: AtomicUsize,
    opens: AtomicUsize,
    generates: AtomicUsize,
    closes: AtomicUsize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountSnapshot {
    pub open_attempts: usize,
    pub opens: usize,
    pub generates: usize,
    pub closes: usize,
}

impl Counters {
    pub fn snapshot(&self) -> CountSnapshot {
        CountSnapshot {
            open_attempts: self.open_attempts.load(Ordering::SeqCst),
            opens: self.opens.load(Ordering::SeqCst),
            generates: self.generates.load(Ordering::SeqCst),
            closes: self.closes.load(Ordering::SeqCst),
        }
    }
}

/// A [`Loader`] that counts every open, generate and close.
#[derive(Clone)]
pub struct MockLoader {
    behavior: MockBehavior,
    channels: u32,
    counters: Arc<Counters>,
    last_request: Arc<Mutex<Option<(PathBuf, ParameterSet)>>>,
}

impl MockLoader {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            channels: 3,
            counters: Arc::default(),
            last_request: Arc::default(),
        }
    }

    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = channels;
        self
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Model path and parameters of the most recent `generate` call.
    pub fn last_request(&self) -> Option<(PathBuf, ParameterSet)> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Loader for MockLoader {
    fn load(
        &self,
        model_path: &Path,
        _flags: &TuningFlags,
    ) -> Result<Box<dyn ModelLike>, EngineError> {
        self.counters.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.behavior == MockBehavior::FailOpen {
            return Err(EngineError::context_init("mock engine refused to load"));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockModel {
            loader: self.clone(),
            model_path: model_path.to_path_buf(),
        }))
    }
}

struct MockModel {
    loader: MockLoader,
    model_path: PathBuf,
}

impl ModelLike for MockModel {
    fn generate(&mut self, params: &ParameterSet) -> Result<Option<ImageArtifact>, EngineError> {
        self.loader.counters.generates.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.loader.last_request.lock() {
            *last = Some((self.model_path.clone(), params.clone()));
        }

        let channels = self.loader.channels;
        let pixels = || {
            let len = (params.width * params.height * channels) as usize;
            vec![params.seed.rem_euclid(256) as u8; len]
        };
        match self.loader.behavior {
            MockBehavior::Succeed | MockBehavior::FailOpen => Ok(Some(ImageArtifact::new(
                params.width,
                params.height,
                channels,
                pixels(),
            ))),
            MockBehavior::ReturnNothing => Ok(None),
            MockBehavior::ReturnEmpty => {
                Ok(Some(ImageArtifact::new(params.width, params.height, channels, Vec::new())))
            }
            MockBehavior::FailGenerate => Err(EngineError::backend("mock sampler diverged")),
            MockBehavior::Panic => panic!("mock engine crashed"),
            MockBehavior::Delay(delay) => {
                std::thread::sleep(delay);
                Ok(Some(ImageArtifact::new(
                    params.width,
                    params.height,
                    channels,
                    pixels(),
                )))
            }
        }
    }
}

impl Drop for MockModel {
    fn drop(&mut self) {
        self.loader.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}
