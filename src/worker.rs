use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use chrono_tz::Tz;
use tokio::{task, time::timeout};
use tokio_util::sync::CancellationToken;

use crate::{
    browser_controller::{capture_page, Renderer, RendererFactory},
    config::TargetConfig,
    types::{CaptureError, WorkerFailure},
    utils::screenshot_path,
};

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct WorkerOptions {
    // zone the screenshot file names are formatted in
    #[builder(default = "Tz::UTC")]
    time_zone: Tz,
    // readiness wait ceiling after navigation
    #[builder(default = "Duration::from_secs(10)")]
    ready_timeout: Duration,
    // bound on one whole capture iteration
    #[builder(default = "Duration::from_secs(120)")]
    capture_timeout: Duration,
}

impl WorkerOptions {
    pub fn default_builder() -> WorkerOptionsBuilder {
        WorkerOptionsBuilder::default()
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }
}

pub struct CaptureWorker {
    target: TargetConfig,
    options: WorkerOptions,
    factory: Arc<dyn RendererFactory>,
}

impl CaptureWorker {
    pub fn new(
        target: TargetConfig,
        options: WorkerOptions,
        factory: Arc<dyn RendererFactory>,
    ) -> Self {
        CaptureWorker {
            target,
            options,
            factory,
        }
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// Captures the target every interval, starting immediately, until a
    /// capture fails or `should_terminate` is cancelled.
    ///
    /// Returns `Ok(())` only on cancellation.
    pub async fn run(&self, should_terminate: CancellationToken) -> Result<(), WorkerFailure> {
        let url = self.target.url().to_string();
        info!(
            "starting capture of {} into {:?} every {}s",
            url,
            self.target.path(),
            self.target.interval_secs()
        );

        let renderer = self
            .launch()
            .await
            .map_err(|e| WorkerFailure::new(&url, 0, e))?;

        let mut captured = 0;
        loop {
            if should_terminate.is_cancelled() {
                return Ok(());
            }

            match self.capture_once(renderer.clone(), &should_terminate).await {
                Ok(path) => {
                    captured += 1;
                    info!("screenshot saved to {:?}", path)
                }
                Err(CaptureError::Cancelled) => return Ok(()),
                Err(e) => {
                    error!("screenshot of {} failed: {}", url, e);
                    return Err(WorkerFailure::new(&url, captured, e));
                }
            }

            debug!(
                "waiting {} seconds before capturing {} again",
                self.target.interval_secs(),
                url
            );
            tokio::select! {
                _ = should_terminate.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.target.interval()) => {}
            }
        }
    }

    async fn launch(&self) -> Result<Arc<dyn Renderer>, CaptureError> {
        let factory = self.factory.clone();
        let target = self.target.clone();
        task::spawn_blocking(move || factory.launch(&target))
            .await?
            .map_err(CaptureError::Launch)
    }

    /// One render, name, persist cycle.
    pub async fn capture_once(
        &self,
        renderer: Arc<dyn Renderer>,
        should_terminate: &CancellationToken,
    ) -> Result<PathBuf, CaptureError> {
        let now = Utc::now().with_timezone(&self.options.time_zone);
        let path = screenshot_path(self.target.path(), &now);

        let url = self.target.url().clone();
        let ready_timeout = self.options.ready_timeout;
        let token = should_terminate.clone();
        let render = task::spawn_blocking(move || {
            capture_page(renderer.as_ref(), &url, ready_timeout, &token)
        });

        let png = match timeout(self.options.capture_timeout, render).await {
            Ok(joined) => joined??,
            Err(_) => {
                return Err(CaptureError::Timeout {
                    url: self.target.url().to_string(),
                    timeout: self.options.capture_timeout,
                })
            }
        };

        tokio::fs::write(&path, png)
            .await
            .map_err(|source| CaptureError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_worker_options() {
        let options = WorkerOptions::default_builder().build().unwrap();
        assert_eq!(options.time_zone(), Tz::UTC);
        assert_eq!(options.ready_timeout, Duration::from_secs(10));
        assert_eq!(options.capture_timeout, Duration::from_secs(120));
    }
}
