//! Periodic campaign refresh.
//!
//! The watchdog runs as its own task. Every interval it fetches the eligible
//! campaigns, keeps the ones the configuration allows, and reports the result
//! to the scheduler over a channel. It never touches scheduler state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::DropsApi;
use crate::config::MinerConfig;
use crate::domain::Campaign;

use super::events::{SchedulerEvent, SchedulerEventBroadcaster};

/// Capacity of the watchdog to scheduler channel.
pub const WATCHDOG_CHANNEL_CAPACITY: usize = 16;

/// Messages sent from the watchdog to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogMessage {
    /// A refresh is starting.
    BeforeRefresh,
    /// Campaigns that passed the filter, in API order.
    Refreshed(Vec<Campaign>),
    /// The refresh failed; the scheduler keeps its current queue.
    Failed(String),
}

/// Which campaigns the scheduler is willing to pursue.
#[derive(Debug, Clone, Default)]
pub struct CampaignFilter {
    games: Vec<String>,
    ignored_games: Vec<String>,
    watch_unlisted_games: bool,
}

impl CampaignFilter {
    pub fn new(
        games: Vec<String>,
        ignored_games: Vec<String>,
        watch_unlisted_games: bool,
    ) -> Self {
        Self {
            games,
            ignored_games,
            watch_unlisted_games,
        }
    }

    pub fn from_config(config: &MinerConfig) -> Self {
        Self::new(
            config.games.clone(),
            config.ignored_games.clone(),
            config.watch_unlisted_games,
        )
    }

    pub fn accepts(&self, campaign: &Campaign) -> bool {
        if !campaign.status.is_schedulable() {
            return false;
        }
        if self.ignored_games.contains(&campaign.game_id) {
            return false;
        }
        self.games.is_empty() || self.watch_unlisted_games || self.games.contains(&campaign.game_id)
    }
}

/// Periodic refresher of the campaign list.
pub struct Watchdog {
    api: Arc<dyn DropsApi>,
    filter: CampaignFilter,
    interval: Duration,
    events: SchedulerEventBroadcaster,
}

impl Watchdog {
    pub fn new(
        api: Arc<dyn DropsApi>,
        filter: CampaignFilter,
        interval: Duration,
        events: SchedulerEventBroadcaster,
    ) -> Self {
        Self {
            api,
            filter,
            interval,
            events,
        }
    }

    /// Spawn the refresh loop. The first refresh happens immediately.
    ///
    /// The task ends when `cancellation_token` is cancelled or the receiver
    /// is dropped.
    pub fn spawn(
        self,
        tx: mpsc::Sender<WatchdogMessage>,
        cancellation_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(tx, cancellation_token).await })
    }

    async fn run(self, tx: mpsc::Sender<WatchdogMessage>, cancellation_token: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Campaign watchdog started"
        );

        loop {
            if !self.send(&tx, WatchdogMessage::BeforeRefresh, &cancellation_token).await {
                break;
            }

            let message = self.refresh().await;
            if !self.send(&tx, message, &cancellation_token).await {
                break;
            }

            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!("Campaign watchdog stopped");
    }

    /// Fetch and filter campaigns once.
    pub async fn refresh(&self) -> WatchdogMessage {
        self.events.publish(SchedulerEvent::WatchdogRefreshing {
            timestamp: Utc::now(),
        });

        match self.api.list_eligible_campaigns().await {
            Ok(campaigns) => {
                let total = campaigns.len();
                let accepted: Vec<Campaign> = campaigns
                    .into_iter()
                    .filter(|c| self.filter.accepts(c))
                    .collect();
                debug!(total, accepted = accepted.len(), "Campaigns refreshed");
                WatchdogMessage::Refreshed(accepted)
            }
            Err(e) => {
                warn!(error = %e, "Campaign refresh failed, keeping current queue");
                self.events.publish(SchedulerEvent::WatchdogFailed {
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
                WatchdogMessage::Failed(e.to_string())
            }
        }
    }

    /// Returns `false` when the loop should stop.
    async fn send(
        &self,
        tx: &mpsc::Sender<WatchdogMessage>,
        message: WatchdogMessage,
        cancellation_token: &CancellationToken,
    ) -> bool {
        tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => false,
            sent = tx.send(message) => sent.is_ok(),
        }
    }
}
