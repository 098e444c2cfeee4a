use std::{
    fs,
    path::{Path, PathBuf},
    slice,
    str::FromStr,
    time::Duration,
};

use chrono_tz::Tz;
use serde::Deserialize;
use serde_yaml::Value;
use url::Url;

use crate::{types::ConfigError, utils::DEFAULT_INTERVAL_SECS};

pub const TIME_ZONE_ENV: &str = "TIME_ZONE";

/// One page to capture: where it lives, where its screenshots go and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    url: Url,
    path: PathBuf,
    interval: u64,
}

impl TargetConfig {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval
    }
}

/// The validated target list, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSet {
    targets: Vec<TargetConfig>,
}

impl ConfigurationSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, TargetConfig> {
        self.targets.iter()
    }
}

impl IntoIterator for ConfigurationSet {
    type Item = TargetConfig;
    type IntoIter = std::vec::IntoIter<TargetConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.into_iter()
    }
}

impl<'a> IntoIterator for &'a ConfigurationSet {
    type Item = &'a TargetConfig;
    type IntoIter = slice::Iter<'a, TargetConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}

#[derive(Deserialize)]
struct RawTarget {
    url: Option<String>,
    path: Option<String>,
    interval: Option<i64>,
}

pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigLoader { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the configuration file.
    ///
    /// Entries are checked in order and the first violation aborts the load.
    /// Output directories of the entries before the failing one have already
    /// been created at that point; later entries are never touched.
    pub fn load(&self) -> Result<ConfigurationSet, ConfigError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        debug!("loaded configuration file {:?}", self.path);
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<ConfigurationSet, ConfigError> {
        let document: Value = serde_yaml::from_str(contents)?;
        let entries = match document {
            Value::Sequence(entries) => entries,
            _ => return Err(ConfigError::NotASequence),
        };
        if entries.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut targets = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            targets.push(Self::validate_entry(index, entry)?);
        }

        Ok(ConfigurationSet { targets })
    }

    fn validate_entry(index: usize, entry: Value) -> Result<TargetConfig, ConfigError> {
        if !entry.is_mapping() {
            return Err(ConfigError::EntryNotAMapping { index });
        }
        let raw: RawTarget = serde_yaml::from_value(entry)
            .map_err(|source| ConfigError::InvalidEntry { index, source })?;

        let url = raw
            .url
            .ok_or(ConfigError::MissingKey { index, key: "url" })?;
        let path = raw
            .path
            .ok_or(ConfigError::MissingKey { index, key: "path" })?;

        let url = parse_target_url(index, &url)?;

        let interval = match raw.interval {
            Some(value) if value <= 0 => {
                return Err(ConfigError::InvalidInterval { index, value });
            }
            Some(value) => value as u64,
            None => DEFAULT_INTERVAL_SECS,
        };

        if path.is_empty() {
            return Err(ConfigError::InvalidPath { index });
        }
        let path = PathBuf::from(path);
        ensure_directory(&path)?;

        Ok(TargetConfig {
            url,
            path,
            interval,
        })
    }
}

fn parse_target_url(index: usize, url: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        index,
        url: url.to_string(),
        reason,
    };
    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(invalid("url must have a host".into())),
    }
}

fn ensure_directory(path: &Path) -> Result<(), ConfigError> {
    if !path.is_dir() {
        debug!("creating output directory {:?}", path);
        fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
            path: path.to_path_buf(),
            source,
        })?;
    }

    // anonymous file, gone as soon as it is dropped
    tempfile::tempfile_in(path).map_err(|source| ConfigError::NotWritable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Parses a time zone name, an empty name meaning UTC.
pub fn parse_time_zone(name: Option<&str>) -> Result<Tz, ConfigError> {
    match name.map(str::trim) {
        None | Some("") => Ok(Tz::UTC),
        Some(name) => Tz::from_str(name).map_err(|_| ConfigError::TimeZone {
            name: name.to_string(),
        }),
    }
}

pub fn time_zone_from_env() -> Result<Tz, ConfigError> {
    let value = std::env::var(TIME_ZONE_ENV).ok();
    parse_time_zone(value.as_deref())
}
