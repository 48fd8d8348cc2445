//! Live stream candidates.

use serde::{Deserialize, Serialize};

/// Base URL used to build a channel page URL from a broadcaster login.
pub const CHANNEL_BASE_URL: &str = "https://www.twitch.tv";

/// Tag carried by streams that award drop progress.
pub const DROPS_ENABLED_TAG: &str = "DropsEnabled";

/// A live stream that could be watched. Fetched fresh per scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCandidate {
    pub url: String,
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub tags: Vec<String>,
}

impl StreamCandidate {
    /// Build a candidate for a broadcaster known to be live.
    pub fn for_broadcaster(broadcaster_id: impl Into<String>, login: impl Into<String>) -> Self {
        let login = login.into();
        Self {
            url: format!("{}/{}", CHANNEL_BASE_URL, login.to_lowercase()),
            broadcaster_id: broadcaster_id.into(),
            broadcaster_login: login,
            tags: Vec::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn is_drops_enabled(&self) -> bool {
        self.has_tag(DROPS_ENABLED_TAG)
    }
}

/// Filter passed to the API when listing live streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFilter {
    /// Only return streams tagged as reward-eligible.
    pub drops_enabled: bool,
}

impl StreamFilter {
    pub fn drops_enabled() -> Self {
        Self {
            drops_enabled: true,
        }
    }

    pub fn any() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_broadcaster_builds_url() {
        let candidate = StreamCandidate::for_broadcaster("123", "SomeStreamer");
        assert_eq!(candidate.url, "https://www.twitch.tv/somestreamer");
        assert_eq!(candidate.broadcaster_login, "SomeStreamer");
        assert!(!candidate.is_drops_enabled());
    }

    #[test]
    fn test_drops_tag_case_insensitive() {
        let candidate = StreamCandidate {
            url: "https://www.twitch.tv/a".to_string(),
            broadcaster_id: "1".to_string(),
            broadcaster_login: "a".to_string(),
            tags: vec!["English".to_string(), "dropsenabled".to_string()],
        };
        assert!(candidate.is_drops_enabled());
    }
}
