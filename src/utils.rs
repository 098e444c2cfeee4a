use chrono::{DateTime, TimeZone};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub const FORMAT_STRING: &str = "%Y%m%d_%H%M%S";
pub const SCREENSHOT_EXTENSION: &str = "png";
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

pub fn screenshot_file_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}.{}", now.format(FORMAT_STRING), SCREENSHOT_EXTENSION)
}

pub fn screenshot_path<Tz: TimeZone>(dir: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    dir.join(screenshot_file_name(now))
}

// keeps the idle DevTools connection alive across the sleep between captures
pub fn browser_idle_timeout(interval: Duration, capture_timeout: Duration) -> Duration {
    interval + capture_timeout + Duration::from_secs(60)
}
