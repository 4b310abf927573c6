use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::timeslot::{DEFAULT_BUSINESS_HOURS, TimeOfDay, TimeRange};

/// Server settings read from `VENUEBOOK_*` environment variables.
/// Unset or unparsable values fall back to the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    /// WAL appends after which the background compactor rewrites the log.
    pub compact_threshold: u64,
    pub business_hours: TimeRange,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5480,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            business_hours: DEFAULT_BUSINESS_HOURS,
            cache_ttl: Duration::from_secs(30),
            cache_capacity: 10_000,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let open: Option<TimeOfDay> = parsed(&lookup, "VENUEBOOK_BUSINESS_OPEN");
        let close: Option<TimeOfDay> = parsed(&lookup, "VENUEBOOK_BUSINESS_CLOSE");
        let business_hours = TimeRange::new(
            open.unwrap_or(defaults.business_hours.start),
            close.unwrap_or(defaults.business_hours.end),
        )
        .unwrap_or_else(|| {
            tracing::warn!("business hours close before they open; using {DEFAULT_BUSINESS_HOURS}");
            DEFAULT_BUSINESS_HOURS
        });

        Self {
            bind: lookup("VENUEBOOK_BIND").unwrap_or(defaults.bind),
            port: parsed(&lookup, "VENUEBOOK_PORT").unwrap_or(defaults.port),
            data_dir: lookup("VENUEBOOK_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            max_connections: parsed(&lookup, "VENUEBOOK_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "VENUEBOOK_COMPACT_THRESHOLD").unwrap_or(defaults.compact_threshold),
            business_hours,
            cache_ttl: parsed(&lookup, "VENUEBOOK_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_capacity: parsed(&lookup, "VENUEBOOK_CACHE_CAPACITY").unwrap_or(defaults.cache_capacity),
            metrics_port: parsed(&lookup, "VENUEBOOK_METRICS_PORT"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("venuebook.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
