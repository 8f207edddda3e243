//! The single generation worker.
//!
//! Handlers never touch the engine directly. They submit a [`ParameterSet`]
//! through a [`JobHandle`]; one dedicated thread drains the queue and runs
//! each job to completion before taking the next, so at most one engine
//! context exists at any time.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::{job, EngineError, JobError, Loader, ParameterSet, TuningFlags};

const WORKER_THREAD_NAME: &str = "kiln-generation";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Jobs that may wait in the queue before `submit` starts to wait.
    pub queue_capacity: usize,
    /// How long a caller waits for its job's result. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            timeout: None,
        }
    }
}

struct Job {
    params: ParameterSet,
    reply_tx: oneshot::Sender<Result<PathBuf, JobError>>,
}

/// Cheap-to-clone submission side of the worker queue.
#[derive(Clone, Debug)]
pub struct JobHandle {
    tx: mpsc::Sender<Job>,
    timeout: Option<Duration>,
}

impl JobHandle {
    /// Queue a job and wait for its outcome.
    ///
    /// # Errors
    /// Besides the job's own failure: [`EngineError::WorkerUnavailable`] when
    /// the worker has stopped, and [`EngineError::Timeout`] when the
    /// configured timeout elapses. The timeout covers waiting for queue space
    /// as well as the job itself. A job that already started keeps running on
    /// the worker and still releases its context; one still queued is skipped.
    pub async fn submit(&self, params: ParameterSet) -> Result<PathBuf, JobError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let round_trip = async {
            self.tx
                .send(Job { params, reply_tx })
                .await
                .map_err(|_| EngineError::WorkerUnavailable)?;
            let reply: Result<PathBuf, JobError> =
                reply_rx.await.map_err(|_| EngineError::WorkerUnavailable)?;
            reply
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, round_trip)
                .await
                .map_err(|_| EngineError::Timeout)?,
            None => round_trip.await,
        }
    }
}

/// Start the worker thread.
///
/// The thread exits once every [`JobHandle`] has been dropped.
pub fn spawn(
    loader: Arc<dyn Loader>,
    flags: TuningFlags,
    config: WorkerConfig,
) -> std::io::Result<JobHandle> {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || run(loader, flags, rx))?;
    info!(
        queue_capacity = config.queue_capacity,
        timeout_secs = config.timeout.map(|t| t.as_secs_f64()),
        "generation worker started"
    );
    Ok(JobHandle {
        tx,
        timeout: config.timeout,
    })
}

fn run(loader: Arc<dyn Loader>, flags: TuningFlags, mut rx: mpsc::Receiver<Job>) {
    while let Some(Job { params, reply_tx }) = rx.blocking_recv() {
        if reply_tx.is_closed() {
            debug!("caller stopped waiting while the job was queued; skipping it");
            continue;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            job::execute(loader.as_ref(), &flags, &params)
        }))
        .unwrap_or_else(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            error!(%reason, "generation engine panicked");
            Err(EngineError::backend(format!("engine panicked: {reason}")).into())
        });

        if reply_tx.send(outcome).is_err() {
            debug!("caller stopped waiting before the job finished");
        }
    }
    info!("generation worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::testing::{MockBehavior, MockLoader};
    use crate::GenerationDefaults;

    fn params(output: PathBuf) -> ParameterSet {
        let defaults = GenerationDefaults {
            output_path: output,
            ..GenerationDefaults::default()
        };
        ParameterSet::from_json(br#"{"prompt":"a cat"}"#, &defaults).unwrap()
    }

    #[tokio::test]
    async fn submitted_job_runs_on_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let loader = MockLoader::new(MockBehavior::Succeed);
        let handle = spawn(Arc::new(loader.clone()), TuningFlags::default(), WorkerConfig::default())
            .unwrap();

        let path = handle.submit(params(dir.path().join("output.png"))).await.unwrap();

        assert!(path.exists());
        let counts = loader.counters().snapshot();
        assert_eq!((counts.opens, counts.closes), (1, 1));
    }

    #[tokio::test]
    async fn concurrent_jobs_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let delay = Duration::from_millis(50);
        let loader = MockLoader::new(MockBehavior::Delay(delay));
        let handle = spawn(Arc::new(loader.clone()), TuningFlags::default(), WorkerConfig::default())
            .unwrap();

        let started = Instant::now();
        let (a, b, c) = tokio::join!(
            handle.submit(params(dir.path().join("a.png"))),
            handle.submit(params(dir.path().join("b.png"))),
            handle.submit(params(dir.path().join("c.png"))),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert!(started.elapsed() >= delay * 3);
        let counts = loader.counters().snapshot();
        assert_eq!((counts.opens, counts.closes), (3, 3));
    }

    #[tokio::test]
    async fn timeout_is_reported_and_the_context_is_still_released() {
        let dir = tempfile::tempdir().unwrap();
        let loader = MockLoader::new(MockBehavior::Delay(Duration::from_millis(200)));
        let config = WorkerConfig {
            timeout: Some(Duration::from_millis(20)),
            ..WorkerConfig::default()
        };
        let handle = spawn(Arc::new(loader.clone()), TuningFlags::default(), config).unwrap();

        let err = handle.submit(params(dir.path().join("output.png"))).await.unwrap_err();
        assert!(matches!(err, JobError::Engine(EngineError::Timeout)));

        tokio::time::sleep(Duration::from_millis(400)).await;
        let counts = loader.counters().snapshot();
        assert_eq!((counts.opens, counts.closes), (1, 1));
    }

    #[tokio::test]
    async fn timeout_covers_waiting_for_queue_space() {
        let dir = tempfile::tempdir().unwrap();
        let loader = MockLoader::new(MockBehavior::Delay(Duration::from_millis(500)));
        let config = WorkerConfig {
            queue_capacity: 1,
            timeout: Some(Duration::from_millis(50)),
        };
        let handle = spawn(Arc::new(loader.clone()), TuningFlags::default(), config).unwrap();

        let started = Instant::now();
        let (a, b, c) = tokio::join!(
            handle.submit(params(dir.path().join("a.png"))),
            handle.submit(params(dir.path().join("b.png"))),
            handle.submit(params(dir.path().join("c.png"))),
        );

        assert!(started.elapsed() < Duration::from_millis(300));
        for result in [a, b, c] {
            assert!(matches!(result, Err(JobError::Engine(EngineError::Timeout))));
        }
    }

    #[tokio::test]
    async fn abandoned_queued_jobs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let loader = MockLoader::new(MockBehavior::Delay(Duration::from_millis(200)));
        let config = WorkerConfig {
            timeout: Some(Duration::from_millis(50)),
            ..WorkerConfig::default()
        };
        let handle = spawn(Arc::new(loader.clone()), TuningFlags::default(), config).unwrap();

        let (a, b, c, d) = tokio::join!(
            handle.submit(params(dir.path().join("a.png"))),
            handle.submit(params(dir.path().join("b.png"))),
            handle.submit(params(dir.path().join("c.png"))),
            handle.submit(params(dir.path().join("d.png"))),
        );
        for result in [a, b, c, d] {
            assert!(matches!(result, Err(JobError::Engine(EngineError::Timeout))));
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        let counts = loader.counters().snapshot();
        assert_eq!((counts.open_attempts, counts.opens, counts.closes), (1, 1, 1));
        assert!(!dir.path().join("b.png").exists());
    }

    #[tokio::test]
    async fn engine_panic_becomes_an_error_and_the_worker_survives() {
        let dir = tempfile::tempdir().unwrap();
        let loader = MockLoader::new(MockBehavior::Panic);
        let handle = spawn(Arc::new(loader.clone()), TuningFlags::default(), WorkerConfig::default())
            .unwrap();

        for _ in 0..2 {
            let err = handle.submit(params(dir.path().join("output.png"))).await.unwrap_err();
            assert!(matches!(err, JobError::Engine(EngineError::Backend(_))));
        }
        let counts = loader.counters().snapshot();
        assert_eq!((counts.opens, counts.closes), (2, 2));
    }
}
