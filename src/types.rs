use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid format: the configuration file should be a list of mappings")]
    NotASequence,
    #[error("invalid format: the configuration contains no targets")]
    Empty,
    #[error("invalid format: entry {index} should be a mapping")]
    EntryNotAMapping { index: usize },
    #[error("invalid format: entry {index} could not be read: {source}")]
    InvalidEntry {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid format: {key} is not specified in entry {index}")]
    MissingKey { index: usize, key: &'static str },
    #[error("invalid url in entry {index}: {url} ({reason})")]
    InvalidUrl {
        index: usize,
        url: String,
        reason: String,
    },
    #[error("invalid interval in entry {index}: {value} (expected a positive number of seconds)")]
    InvalidInterval { index: usize, value: i64 },
    #[error("invalid path in entry {index}: path must not be empty")]
    InvalidPath { index: usize },
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("directory {path:?} is not writable: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unknown time zone {name:?}")]
    TimeZone { name: String },
}

/// Failure of a single capture iteration.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("could not launch renderer: {0:#}")]
    Launch(anyhow::Error),
    #[error("could not navigate to {url}: {cause:#}")]
    Navigate { url: String, cause: anyhow::Error },
    #[error("could not measure page {url}: {cause:#}")]
    Measure { url: String, cause: anyhow::Error },
    #[error("could not resize surface to {width}x{height}: {cause:#}")]
    Resize {
        width: u32,
        height: u32,
        cause: anyhow::Error,
    },
    #[error("page {url} never became ready: {cause:#}")]
    NotReady { url: String, cause: anyhow::Error },
    #[error("could not capture {url}: {cause:#}")]
    Capture { url: String, cause: anyhow::Error },
    #[error("could not write screenshot to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("capture of {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("capture cancelled")]
    Cancelled,
    #[error("renderer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A worker that stopped capturing because of an error.
#[derive(Error, Debug)]
#[error("capture worker for {url} failed: {source}")]
pub struct WorkerFailure {
    pub url: String,
    // screenshots saved by this run before it failed
    pub captured: usize,
    #[source]
    pub source: CaptureError,
}

impl WorkerFailure {
    pub fn new(url: impl Into<String>, captured: usize, source: CaptureError) -> Self {
        WorkerFailure {
            url: url.into(),
            captured,
            source,
        }
    }
}
