use std::time::Duration;

use url::Url;

use crate::backoff::Backoff;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/api/";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Prefix for the `status/`, `run` and `cancel` endpoints.
    pub base_url: Url,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_bytes: 8 * 1024 * 1024,
        }
    }
}

impl ClientSettings {
    /// Builds settings for `base_url`, adding the trailing slash that
    /// `Url::join` needs to keep the last path segment.
    pub fn with_base_url(base_url: &str) -> Result<Self, url::ParseError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        Ok(Self {
            base_url: Url::parse(&normalized)?,
            ..Self::default()
        })
    }
}

/// What to do when a status query fails at the transport level.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Zero keeps the historical behaviour: the first failure ends the loop.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn bounded(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub(crate) fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_delay, self.factor, self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub initial_interval: Duration,
    pub growth_factor: f64,
    pub max_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(1000),
            growth_factor: 1.2,
            max_interval: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
        }
    }
}

impl PollSettings {
    pub(crate) fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_interval, self.growth_factor, self.max_interval)
    }
}
