//! Miner configuration.
//!
//! The configuration is supplied once at construction time. It can be parsed
//! from JSON; every field has a default so partial documents are accepted.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "DROPS_MINER_CONFIG";

const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 15;
const DEFAULT_FAILED_STREAM_RETRY: u32 = 3;
const DEFAULT_FAILED_STREAM_TIMEOUT_MINUTES: u64 = 30;
const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROGRESS_POLL_SECS: u64 = 60;
const DEFAULT_STALL_TIMEOUT_MINUTES: u64 = 15;

/// Upper bound for every minute-valued option (one week).
const MAX_MINUTES: u64 = 7 * 24 * 60;

/// Scheduler options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Game ids in priority order. Also acts as the game allow-list.
    pub games: Vec<String>,
    /// Pursue campaigns for games missing from `games`.
    pub watch_unlisted_games: bool,
    /// Game ids that are never pursued.
    pub ignored_games: Vec<String>,
    /// Minutes between campaign refreshes.
    pub refresh_interval_minutes: u64,
    /// Failures before a stream is blacklisted.
    pub failed_stream_retry: u32,
    /// Minutes a blacklisted stream stays excluded.
    pub failed_stream_timeout_minutes: u64,
    /// Page load timeout handed to the page driver.
    pub load_timeout_secs: u64,
    pub hide_video: bool,
    /// Warn when a campaign's account is not linked.
    pub show_account_not_linked_warning: bool,
    /// Pursue drops that cannot finish before they end.
    pub attempt_impossible_campaigns: bool,
    /// Watch a stream for channel points when no campaign is pending.
    pub watch_streams_when_no_campaigns: bool,
    /// Broadcaster logins preferred while idle, in order.
    pub broadcasters: Vec<String>,
    /// Seconds between inventory polls while watching.
    pub progress_poll_secs: u64,
    /// Minutes without drop progress before a session gives up.
    pub stall_timeout_minutes: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            games: Vec::new(),
            watch_unlisted_games: false,
            ignored_games: Vec::new(),
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
            failed_stream_retry: DEFAULT_FAILED_STREAM_RETRY,
            failed_stream_timeout_minutes: DEFAULT_FAILED_STREAM_TIMEOUT_MINUTES,
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT_SECS,
            hide_video: false,
            show_account_not_linked_warning: true,
            attempt_impossible_campaigns: false,
            watch_streams_when_no_campaigns: false,
            broadcasters: Vec::new(),
            progress_poll_secs: DEFAULT_PROGRESS_POLL_SECS,
            stall_timeout_minutes: DEFAULT_STALL_TIMEOUT_MINUTES,
        }
    }
}

impl MinerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_json_str(&contents)
    }

    /// Load the configuration named by [`CONFIG_PATH_ENV`], honouring a `.env` file.
    ///
    /// Falls back to defaults when the variable is unset.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => {
                info!("{} not set, using default configuration", CONFIG_PATH_ENV);
                Ok(Self::default())
            }
        }
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_minutes == 0 {
            return Err(Error::config("refresh_interval_minutes must be greater than 0"));
        }
        if self.failed_stream_retry == 0 {
            return Err(Error::config("failed_stream_retry must be greater than 0"));
        }
        if self.load_timeout_secs == 0 {
            return Err(Error::config("load_timeout_secs must be greater than 0"));
        }
        if self.progress_poll_secs == 0 {
            return Err(Error::config("progress_poll_secs must be greater than 0"));
        }
        for (name, value) in [
            ("refresh_interval_minutes", self.refresh_interval_minutes),
            ("failed_stream_timeout_minutes", self.failed_stream_timeout_minutes),
            ("stall_timeout_minutes", self.stall_timeout_minutes),
        ] {
            if value > MAX_MINUTES {
                return Err(Error::config(format!(
                    "{} must be at most {}",
                    name, MAX_MINUTES
                )));
            }
        }
        for game in self.games.iter().filter(|g| self.ignored_games.contains(g)) {
            warn!(game = %game, "Game is both prioritised and ignored, it will be ignored");
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        minutes(self.refresh_interval_minutes)
    }

    pub fn blacklist_timeout(&self) -> Duration {
        minutes(self.failed_stream_timeout_minutes)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn progress_poll_interval(&self) -> Duration {
        Duration::from_secs(self.progress_poll_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        minutes(self.stall_timeout_minutes)
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}
