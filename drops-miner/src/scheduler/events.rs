//! Scheduler events for progress display and observers.
//!
//! Rendering is left to subscribers; the scheduler only publishes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Events emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// The watchdog is about to fetch campaigns.
    WatchdogRefreshing { timestamp: DateTime<Utc> },
    /// The pending queue was rebuilt.
    WatchdogRefreshed {
        pending: usize,
        timestamp: DateTime<Utc>,
    },
    /// A refresh failed; the previous queue is kept.
    WatchdogFailed {
        message: String,
        timestamp: DateTime<Utc>,
    },
    CampaignStarted {
        campaign_id: String,
        campaign_name: String,
        game_name: String,
        timestamp: DateTime<Utc>,
    },
    CampaignFinished {
        campaign_id: String,
        outcome: String,
        timestamp: DateTime<Utc>,
    },
    SessionStarted {
        url: String,
        /// `None` in idle mode.
        campaign_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Periodic progress of the active session.
    Progress {
        url: String,
        drop_name: Option<String>,
        minutes_watched: u32,
        required_minutes: u32,
        viewers: Option<u64>,
    },
    SessionEnded {
        url: String,
        outcome: String,
        timestamp: DateTime<Utc>,
    },
    DropClaimed {
        campaign_id: String,
        drop_id: String,
        drop_name: String,
        timestamp: DateTime<Utc>,
    },
    StreamBlacklisted {
        url: String,
        timestamp: DateTime<Utc>,
    },
}

impl SchedulerEvent {
    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            SchedulerEvent::WatchdogRefreshing { .. } => "Refreshing campaigns".to_string(),
            SchedulerEvent::WatchdogRefreshed { pending, .. } => {
                format!("{} campaign(s) pending", pending)
            }
            SchedulerEvent::WatchdogFailed { message, .. } => {
                format!("Campaign refresh failed: {}", message)
            }
            SchedulerEvent::CampaignStarted {
                campaign_name,
                game_name,
                ..
            } => format!("Pursuing {} ({})", campaign_name, game_name),
            SchedulerEvent::CampaignFinished {
                campaign_id,
                outcome,
                ..
            } => format!("Campaign {} finished: {}", campaign_id, outcome),
            SchedulerEvent::SessionStarted { url, .. } => format!("Watching {}", url),
            SchedulerEvent::Progress {
                drop_name,
                minutes_watched,
                required_minutes,
                viewers,
                ..
            } => {
                let viewers = viewers
                    .map(|v| format!(", {} viewers", v))
                    .unwrap_or_default();
                match drop_name {
                    Some(name) => format!(
                        "{}: {}/{} min{}",
                        name, minutes_watched, required_minutes, viewers
                    ),
                    None => format!("Idle watching{}", viewers),
                }
            }
            SchedulerEvent::SessionEnded { url, outcome, .. } => {
                format!("Stopped watching {}: {}", url, outcome)
            }
            SchedulerEvent::DropClaimed { drop_name, .. } => format!("Claimed {}", drop_name),
            SchedulerEvent::StreamBlacklisted { url, .. } => format!("Blacklisted {}", url),
        }
    }
}

/// Broadcaster for scheduler events.
pub struct SchedulerEventBroadcaster {
    sender: broadcast::Sender<SchedulerEvent>,
}

impl SchedulerEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: SchedulerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SchedulerEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SchedulerEventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_description() {
        let event = SchedulerEvent::Progress {
            url: "https://www.twitch.tv/a".to_string(),
            drop_name: Some("Cape".to_string()),
            minutes_watched: 12,
            required_minutes: 60,
            viewers: Some(340),
        };
        assert_eq!(event.description(), "Cape: 12/60 min, 340 viewers");

        let idle = SchedulerEvent::Progress {
            url: "https://www.twitch.tv/a".to_string(),
            drop_name: None,
            minutes_watched: 0,
            required_minutes: 0,
            viewers: None,
        };
        assert_eq!(idle.description(), "Idle watching");
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = SchedulerEvent::WatchdogRefreshed {
            pending: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "watchdog_refreshed");
        assert_eq!(json["pending"], 2);
    }

    #[tokio::test]
    async fn test_broadcaster() {
        let broadcaster = SchedulerEventBroadcaster::new();
        assert_eq!(
            broadcaster.publish(SchedulerEvent::WatchdogRefreshing {
                timestamp: Utc::now()
            }),
            0
        );

        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        let event = SchedulerEvent::StreamBlacklisted {
            url: "https://www.twitch.tv/a".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(broadcaster.publish(event.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
