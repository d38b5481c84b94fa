//! Server configuration parsed from environment variables.
//!
//! Every knob has a default; a missing or unparseable value falls back to it
//! so the relay always starts.

use std::path::PathBuf;

use tracing::warn;

use crate::store::DEFAULT_MAX_FRAME_AGE_SECS;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_DATA_FILE: &str = "stream_data.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Freshness window in seconds.
    pub max_frame_age: i64,
    pub data_file: PathBuf,
    pub storage: StorageKind,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            port: DEFAULT_PORT,
            max_frame_age: DEFAULT_MAX_FRAME_AGE_SECS,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            storage: StorageKind::File,
        }
    }
}

impl RelayConfig {
    /// Build config from environment variables.
    ///
    /// - `PORT`: listen port, default 3000
    /// - `RELAY_BIND_ADDR`: listen address, default `0.0.0.0`
    /// - `RELAY_MAX_FRAME_AGE_SECS`: freshness window, default 10; negative values are rejected
    /// - `RELAY_DATA_FILE`: record file path, default `stream_data.json`
    /// - `RELAY_STORAGE`: `file` (default) or `memory`
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("RELAY_BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: env_parse("PORT", defaults.port),
            max_frame_age: parse_max_frame_age(
                std::env::var("RELAY_MAX_FRAME_AGE_SECS").ok().as_deref(),
                defaults.max_frame_age,
            ),
            data_file: std::env::var("RELAY_DATA_FILE").map_or(defaults.data_file, PathBuf::from),
            storage: parse_storage(std::env::var("RELAY_STORAGE").ok().as_deref()),
        }
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// A negative window would make every record stale, so it is treated like any other bad value.
fn parse_max_frame_age(raw: Option<&str>, default: i64) -> i64 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<i64>() {
        Ok(secs) if secs >= 0 => secs,
        _ => {
            warn!(value = raw, default, "invalid RELAY_MAX_FRAME_AGE_SECS; using default");
            default
        }
    }
}

fn parse_storage(raw: Option<&str>) -> StorageKind {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("memory" | "mem") => StorageKind::Memory,
        _ => StorageKind::File,
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
