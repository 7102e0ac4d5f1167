//! Runtime settings read from the environment (and `.env`, loaded by the binary).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::calendar::Calendar;
use crate::loader::DEFAULT_CONCURRENCY;

pub const DEFAULT_DATA_DIR: &str = "data/station-capacity";
pub const DEFAULT_FEED_URL: &str = "https://gbfs.baywheels.com/gbfs/en";
pub const DEFAULT_POLL_SECS: u64 = 10;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub feed_url: String,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub calendar: Calendar,
    pub load_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            feed_url: DEFAULT_FEED_URL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            calendar: Calendar::default(),
            load_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}={raw:?}")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source, falling back to the
    /// defaults for anything unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let calendar = match lookup("BIKESHARE_TIMEZONE") {
            Some(name) => Calendar::from_name(name.trim())?,
            None => defaults.calendar,
        };
        let poll_secs = parse_var(&lookup, "BIKESHARE_POLL_SECS", DEFAULT_POLL_SECS)?;
        let timeout_secs =
            parse_var(&lookup, "BIKESHARE_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        let load_concurrency =
            parse_var(&lookup, "BIKESHARE_LOAD_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        anyhow::ensure!(poll_secs > 0, "BIKESHARE_POLL_SECS must be positive");
        anyhow::ensure!(load_concurrency > 0, "BIKESHARE_LOAD_CONCURRENCY must be positive");

        Ok(Self {
            data_dir: lookup("BIKESHARE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            feed_url: lookup("BIKESHARE_FEED_URL").unwrap_or(defaults.feed_url),
            poll_interval: Duration::from_secs(poll_secs),
            fetch_timeout: Duration::from_secs(timeout_secs),
            calendar,
            load_concurrency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data/station-capacity"));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.calendar, Calendar::default());
        assert_eq!(config.load_concurrency, 10);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BIKESHARE_DATA_DIR", "/var/lib/bikeshare"),
            ("BIKESHARE_POLL_SECS", " 5 "),
            ("BIKESHARE_TIMEZONE", "America/New_York"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/bikeshare"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.calendar.tz(), chrono_tz::America::New_York);
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("BIKESHARE_POLL_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BIKESHARE_POLL_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BIKESHARE_TIMEZONE", "Mars/Olympus")])).is_err());
    }
}
