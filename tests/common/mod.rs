#![allow(dead_code)]

use std::{
    collections::HashSet,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use regex::Regex;
use screenshotter::{
    browser_controller::{Renderer, RendererFactory},
    config::TargetConfig,
};
use url::Url;

#[macro_export]
macro_rules! aw {
    ($e:expr) => {
        tokio_test::block_on($e)
    };
}

// a 1x1 transparent png
pub const PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Renderer that never touches a browser.
pub struct FakeRenderer {
    fail: bool,
    flaky: bool,
    navigations: Arc<AtomicUsize>,
    delay: Duration,
    captures: Arc<AtomicUsize>,
    resized: Arc<AtomicUsize>,
}

impl Renderer for FakeRenderer {
    fn navigate(&self, url: &Url) -> Result<()> {
        if self.fail {
            return Err(anyhow!("connection refused: {}", url));
        }
        // every second navigation fails
        let seen = self.navigations.fetch_add(1, Ordering::SeqCst);
        if self.flaky && seen % 2 == 1 {
            return Err(anyhow!("transient failure loading {}", url));
        }
        Ok(())
    }

    fn content_size(&self) -> Result<(u32, u32)> {
        Ok((1280, 4000))
    }

    fn resize(&self, width: u32, height: u32) -> Result<()> {
        assert_eq!((width, height), (1280, 4000));
        self.resized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_ready(&self, _timeout: Duration) -> Result<()> {
        std::thread::sleep(self.delay);
        Ok(())
    }

    fn capture(&self) -> Result<Vec<u8>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(PNG.to_vec())
    }
}

/// Hands out fake renderers and counts what they do.
#[derive(Default)]
pub struct FakeFactory {
    failing_hosts: HashSet<String>,
    flaky: bool,
    delay: Duration,
    pub navigations: Arc<AtomicUsize>,
    pub launches: AtomicUsize,
    pub captures: Arc<AtomicUsize>,
    pub resized: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(hosts: &[&str]) -> Self {
        FakeFactory {
            failing_hosts: hosts.iter().map(|h| h.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn flaky() -> Self {
        FakeFactory {
            flaky: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        FakeFactory {
            delay,
            ..Self::default()
        }
    }
}

impl RendererFactory for FakeFactory {
    fn launch(&self, target: &TargetConfig) -> Result<Arc<dyn Renderer>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let host = target.url().host_str().unwrap_or_default().to_string();
        Ok(Arc::new(FakeRenderer {
            fail: self.failing_hosts.contains(&host),
            flaky: self.flaky,
            navigations: self.navigations.clone(),
            delay: self.delay,
            captures: self.captures.clone(),
            resized: self.resized.clone(),
        }))
    }
}

pub fn screenshots_in(dir: &Path) -> Vec<String> {
    let pattern = Regex::new(r"^\d{8}_\d{6}\.png$").unwrap();
    let mut names = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| pattern.is_match(name))
        .collect::<Vec<String>>();
    names.sort();
    names
}
