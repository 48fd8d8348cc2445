//! Per-stream failure counting and the temporary stream blacklist.
//!
//! Each failed watch session increments its stream's counter. Once a counter
//! reaches the retry threshold the stream is blacklisted for the configured
//! timeout and the counter starts over. Counters are reset whenever a new drop
//! begins being pursued; the blacklist is not.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::utils::ExpiringSet;

/// Default number of failures before a stream is blacklisted.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default blacklist timeout (30 minutes).
pub const DEFAULT_BLACKLIST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Configuration for the failure tracker.
#[derive(Debug, Clone)]
pub struct FailureTrackerConfig {
    /// Failures before a stream is blacklisted.
    pub failure_threshold: u32,
    /// How long a blacklisted stream stays excluded.
    pub blacklist_timeout: Duration,
}

impl Default for FailureTrackerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            blacklist_timeout: DEFAULT_BLACKLIST_TIMEOUT,
        }
    }
}

/// Tracks consecutive failures per stream URL and owns the blacklist.
#[derive(Debug)]
pub struct FailureTracker {
    counts: HashMap<String, u32>,
    blacklist: ExpiringSet<String>,
    config: FailureTrackerConfig,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::with_config(FailureTrackerConfig::default())
    }

    pub fn with_config(config: FailureTrackerConfig) -> Self {
        Self {
            counts: HashMap::new(),
            blacklist: ExpiringSet::new(),
            config,
        }
    }

    /// Record a failure for `url` and return the new count.
    ///
    /// When the count reaches the threshold the stream is blacklisted and its
    /// counter cleared.
    pub fn record_failure(&mut self, url: &str) -> u32 {
        let count = self.counts.entry(url.to_string()).or_insert(0);
        *count += 1;
        let failures = *count;

        if failures >= self.config.failure_threshold {
            self.counts.remove(url);
            self.blacklist_now(url);
        } else {
            debug!(
                url = %url,
                failures,
                threshold = self.config.failure_threshold,
                "Stream failure recorded"
            );
        }

        failures
    }

    /// Blacklist `url` immediately, regardless of its counter.
    pub fn blacklist_now(&mut self, url: &str) {
        warn!(
            url = %url,
            timeout_secs = self.config.blacklist_timeout.as_secs(),
            "Blacklisting stream"
        );
        self.counts.remove(url);
        self.blacklist
            .insert(url.to_string(), self.config.blacklist_timeout);
    }

    /// Clear every failure counter. The blacklist is left untouched.
    pub fn reset_all(&mut self) {
        if !self.counts.is_empty() {
            debug!(streams = self.counts.len(), "Clearing stream failure counters");
        }
        self.counts.clear();
    }

    pub fn is_blacklisted(&mut self, url: &str) -> bool {
        self.blacklist.contains(url)
    }

    /// Current consecutive failure count for `url`.
    pub fn failures(&self, url: &str) -> u32 {
        self.counts.get(url).copied().unwrap_or(0)
    }

    pub fn config(&self) -> &FailureTrackerConfig {
        &self.config
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new()
    }
}
