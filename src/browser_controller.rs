use anyhow::{anyhow, Context, Result};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::protocol::cdp::Target;
use headless_chrome::types::Bounds;
use headless_chrome::Tab;
use headless_chrome::{browser::default_executable, Browser, LaunchOptions};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{config::TargetConfig, types::CaptureError, utils::browser_idle_timeout};

const WIDTH_SCRIPT: &str = "document.body.scrollWidth";
const HEIGHT_SCRIPT: &str = "document.body.scrollHeight";

/// The page rendering capability a capture worker drives.
///
/// Calls block; workers run them on the blocking thread pool.
pub trait Renderer: Send + Sync {
    fn navigate(&self, url: &Url) -> Result<()>;
    /// Full scrollable width and height of the current page.
    fn content_size(&self) -> Result<(u32, u32)>;
    fn resize(&self, width: u32, height: u32) -> Result<()>;
    fn wait_ready(&self, timeout: Duration) -> Result<()>;
    /// PNG bytes of the current surface.
    fn capture(&self) -> Result<Vec<u8>>;
}

/// Creates the renderer a worker owns for its lifetime.
pub trait RendererFactory: Send + Sync {
    fn launch(&self, target: &TargetConfig) -> Result<Arc<dyn Renderer>>;
}

/// Navigates, sizes the surface to the whole page, waits for it to settle
/// and returns the captured image.
pub fn capture_page(
    renderer: &dyn Renderer,
    url: &Url,
    ready_timeout: Duration,
    should_terminate: &CancellationToken,
) -> std::result::Result<Vec<u8>, CaptureError> {
    let check = || {
        if should_terminate.is_cancelled() {
            return Err(CaptureError::Cancelled);
        }
        Ok(())
    };

    renderer.navigate(url).map_err(|cause| CaptureError::Navigate {
        url: url.to_string(),
        cause,
    })?;
    check()?;

    let (width, height) = renderer
        .content_size()
        .map_err(|cause| CaptureError::Measure {
            url: url.to_string(),
            cause,
        })?;
    debug!("page {} measures {}x{}", url, width, height);
    renderer
        .resize(width, height)
        .map_err(|cause| CaptureError::Resize {
            width,
            height,
            cause,
        })?;
    check()?;

    renderer
        .wait_ready(ready_timeout)
        .map_err(|cause| CaptureError::NotReady {
            url: url.to_string(),
            cause,
        })?;
    check()?;

    renderer.capture().map_err(|cause| CaptureError::Capture {
        url: url.to_string(),
        cause,
    })
}

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct ChromeOptions {
    #[builder(default = "(1920, 1080)")]
    window_size: (u32, u32),
    #[builder(default = "false")]
    no_sandbox: bool,
    // bound on one whole capture, used to size the browser idle timeout
    #[builder(default = "Duration::from_secs(120)")]
    capture_timeout: Duration,
}

impl ChromeOptions {
    pub fn default_builder() -> ChromeOptionsBuilder {
        ChromeOptionsBuilder::default()
    }
}

/// Launches one headless Chrome per target.
pub struct ChromeLauncher {
    options: ChromeOptions,
}

impl ChromeLauncher {
    pub fn new(options: ChromeOptions) -> Self {
        ChromeLauncher { options }
    }
}

impl RendererFactory for ChromeLauncher {
    fn launch(&self, target: &TargetConfig) -> Result<Arc<dyn Renderer>> {
        let idle = browser_idle_timeout(target.interval(), self.options.capture_timeout);
        let controller = BrowserController::new(&self.options, idle)?;
        Ok(Arc::new(controller))
    }
}

pub struct BrowserController {
    browser: Browser,
    page: Mutex<Option<OpenPage>>,
}

// the tab of the last capture and the incognito context it lives in
struct OpenPage {
    context_id: String,
    tab: Arc<Tab>,
}

impl BrowserController {
    pub fn new(options: &ChromeOptions, idle_timeout: Duration) -> Result<Self> {
        let is_docker = std::env::var("IN_DOCKER").is_ok();
        let executable = default_executable().map_err(|e| anyhow!(e))?;
        let launch_options = LaunchOptions::default_builder()
            .path(Some(executable))
            .headless(true)
            .window_size(Some(options.window_size))
            .idle_browser_timeout(idle_timeout)
            // warning only do this if in docker env
            .sandbox(!(is_docker || options.no_sandbox))
            .args(vec![
                OsStr::new("--hide-scrollbars"),
                OsStr::new("--disable-dev-shm-usage"),
            ])
            .build()
            .context("invalid chrome launch options")?;
        let browser = Browser::new(launch_options).context("browser launching error")?;

        Ok(BrowserController {
            browser,
            page: Mutex::new(None),
        })
    }

    fn current_tab(&self) -> Result<Arc<Tab>> {
        let guard = self
            .page
            .lock()
            .map_err(|_| anyhow!("page lock poisoned"))?;
        guard
            .as_ref()
            .map(|page| page.tab.clone())
            .context("no page has been opened yet")
    }

    fn dispose_context(&self, context_id: &str) {
        let dispose = Target::DisposeBrowserContext {
            browser_context_id: context_id.to_string(),
        };
        if let Err(e) = self.browser.call_method(dispose) {
            warn!("could not dispose browser context {}: {}", context_id, e);
        }
    }

    /// Number of browser contexts currently open in this Chrome.
    pub fn open_contexts(&self) -> Result<usize> {
        let contexts = self
            .browser
            .call_method(Target::GetBrowserContexts(None))
            .context("could not list browser contexts")?;
        Ok(contexts.browser_context_ids.len())
    }

    fn evaluate_dimension(&self, tab: &Tab, script: &str) -> Result<u32> {
        let value = tab
            .evaluate(script, false)
            .context(format!("could not evaluate {}", script))?
            .value
            .and_then(|v| v.as_u64())
            .context(format!("{} did not return a number", script))?;
        Ok(value.max(1) as u32)
    }

    pub fn kill(&self) -> bool {
        let pid = match self.browser.get_process_id() {
            Some(pid) => pid,
            None => return false,
        };
        let mut s = System::new();
        s.refresh_processes();
        if let Some(process) = s.process(Pid::from_u32(pid)) {
            debug!("killing process with id {}", pid);
            process.kill();
            return true;
        }
        false
    }
}

impl Renderer for BrowserController {
    fn navigate(&self, url: &Url) -> Result<()> {
        // every capture gets a fresh incognito context, the previous one is disposed
        let ctx = self
            .browser
            .new_context()
            .context("could not create incognito context")?;
        let context_id = ctx.get_id().to_string();
        let tab = match ctx.new_tab() {
            Ok(tab) => tab,
            Err(e) => {
                self.dispose_context(&context_id);
                return Err(e.context("could not create new tab"));
            }
        };

        let previous = {
            let mut guard = self
                .page
                .lock()
                .map_err(|_| anyhow!("page lock poisoned"))?;
            guard.replace(OpenPage {
                context_id,
                tab: tab.clone(),
            })
        };
        if let Some(previous) = previous {
            self.dispose_context(&previous.context_id);
        }

        tab.navigate_to(url.as_str())
            .context(format!("could not navigate to {}", url))?;
        Ok(())
    }

    fn content_size(&self) -> Result<(u32, u32)> {
        let tab = self.current_tab()?;
        tab.wait_until_navigated()?;
        let width = self.evaluate_dimension(&tab, WIDTH_SCRIPT)?;
        let height = self.evaluate_dimension(&tab, HEIGHT_SCRIPT)?;
        Ok((width, height))
    }

    fn resize(&self, width: u32, height: u32) -> Result<()> {
        let tab = self.current_tab()?;
        tab.set_bounds(Bounds::Normal {
            left: Some(0),
            top: Some(0),
            width: Some(width as f64),
            height: Some(height as f64),
        })?;
        Ok(())
    }

    fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let tab = self.current_tab()?;
        tab.set_default_timeout(timeout);
        tab.wait_until_navigated()?;
        tab.wait_for_element("body")?;
        Ok(())
    }

    fn capture(&self) -> Result<Vec<u8>> {
        let tab = self.current_tab()?;
        tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .context("screenshot could not be captured")
    }
}

impl Drop for BrowserController {
    fn drop(&mut self) {
        debug!("killing browser process...");
        self.kill();
    }
}
