use std::{sync::Arc, time::Duration};

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::time::sleep;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_util::sync::CancellationToken;

use crate::{
    browser_controller::RendererFactory,
    config::{ConfigurationSet, TargetConfig},
    types::WorkerFailure,
    worker::{CaptureWorker, WorkerOptions},
};

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct PoolOptions {
    worker: WorkerOptions,
    // supervised restarts per worker, 0 leaves a failed worker stopped
    #[builder(default = "0")]
    max_restarts: usize,
    // base delay of the exponential restart backoff
    #[builder(default = "Duration::from_secs(5)")]
    restart_delay: Duration,
    #[builder(default = "Duration::from_secs(600)")]
    max_restart_delay: Duration,
}

impl PoolOptions {
    pub fn default_builder() -> PoolOptionsBuilder {
        PoolOptionsBuilder::default()
    }
}

/// How a worker reached its terminal state.
#[derive(Debug)]
pub enum WorkerOutcome {
    Stopped { url: String },
    Failed { failure: WorkerFailure, attempts: u32 },
}

impl WorkerOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, WorkerOutcome::Failed { .. })
    }
}

pub struct WorkerPool {
    options: PoolOptions,
    factory: Arc<dyn RendererFactory>,
}

impl WorkerPool {
    pub fn new(options: PoolOptions, factory: Arc<dyn RendererFactory>) -> Self {
        WorkerPool { options, factory }
    }

    /// Runs one worker per target and waits until every one of them has
    /// stopped or failed. Outcomes are returned in completion order.
    pub async fn run_all(
        &self,
        config: ConfigurationSet,
        should_terminate: CancellationToken,
    ) -> Vec<WorkerOutcome> {
        info!("launching {} capture workers", config.len());

        let mut workers = config
            .into_iter()
            .map(|target| {
                let options = self.options.clone();
                let factory = self.factory.clone();
                let should_terminate = should_terminate.clone();
                tokio::spawn(Self::supervise(target, options, factory, should_terminate))
            })
            .collect::<FuturesUnordered<_>>();

        let mut outcomes = vec![];
        while let Some(joined) = workers.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("capture worker panicked: {}", e);
                    continue;
                }
            };
            match &outcome {
                WorkerOutcome::Stopped { url } => {
                    debug!("capture worker for {} stopped", url)
                }
                WorkerOutcome::Failed { failure, attempts } => {
                    error!(
                        "screenshot job failed after {} attempt(s) with exception: {}",
                        attempts, failure
                    )
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn supervise(
        target: TargetConfig,
        options: PoolOptions,
        factory: Arc<dyn RendererFactory>,
        should_terminate: CancellationToken,
    ) -> WorkerOutcome {
        let url = target.url().to_string();
        let worker = CaptureWorker::new(target, options.worker.clone(), factory);
        let mut attempts = 0;
        let mut backoff = restart_strategy(&options);

        loop {
            attempts += 1;
            let result = tokio::select! {
                _ = should_terminate.cancelled() => Ok(()),
                result = worker.run(should_terminate.clone()) => result,
            };
            let failure = match result {
                Ok(()) => return WorkerOutcome::Stopped { url },
                Err(failure) => failure,
            };

            // only failures with no screenshot in between use up the budget
            if failure.captured > 0 {
                backoff = restart_strategy(&options);
            }
            let delay = match backoff.next() {
                Some(delay) => delay,
                None => return WorkerOutcome::Failed { failure, attempts },
            };

            warn!(
                "capture worker for {} failed, restarting in {:?}: {}",
                url, delay, failure
            );
            tokio::select! {
                _ = should_terminate.cancelled() => {
                    return WorkerOutcome::Failed { failure, attempts };
                }
                _ = sleep(delay) => {}
            }
        }
    }
}

fn restart_strategy(options: &PoolOptions) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(options.restart_delay.as_millis().max(1) as u64 / 2)
        .max_delay(options.max_restart_delay)
        .map(jitter)
        .take(options.max_restarts)
}

/// True when the pool ended on its own because no worker survived.
pub fn every_worker_failed(outcomes: &[WorkerOutcome], cancelled: bool) -> bool {
    !cancelled && outcomes.iter().all(WorkerOutcome::is_failure)
}
