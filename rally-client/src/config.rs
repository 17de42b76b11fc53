use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_PROCESSED_CAPACITY: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where `rally-server` listens, without the `/db` suffix.
    pub base_url: String,
    pub poll_interval_secs: u64,
    /// How many request ids the poller remembers per session.
    pub processed_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            processed_capacity: DEFAULT_PROCESSED_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `RALLY_URL`, `RALLY_POLL_SECS` and `RALLY_PROCESSED_CAPACITY`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = env::var("RALLY_URL") {
            config.base_url = url;
        }
        if let Ok(secs) = env::var("RALLY_POLL_SECS") {
            config.poll_interval_secs = parse_var("RALLY_POLL_SECS", &secs)?;
        }
        if let Ok(capacity) = env::var("RALLY_PROCESSED_CAPACITY") {
            config.processed_capacity = parse_var("RALLY_PROCESSED_CAPACITY", &capacity)?;
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Invalid(format!("{name}={raw:?} is not a valid number")))
}
