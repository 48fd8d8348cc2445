//! Scheduler service: the campaign orchestrator.
//!
//! The Scheduler keeps exactly one campaign progressing at a time. It owns
//! every piece of scheduling state (pending queue, campaign map, blacklist,
//! failure counters, claim ledger) and is the only thing that mutates it.
//!
//! # Architecture
//!
//! - A `Watchdog` task refreshes campaigns and reports over a channel
//! - The main loop picks work: a campaign, an idle stream, or a sleep
//! - A campaign attempt claims finished drops, then runs watch sessions
//! - While a session runs, refreshes may trigger a higher-priority check
//!   that preempts the session
//!
//! Every wait selects over the cancellation token, the watchdog channel and
//! a timer, so refreshes and shutdown are handled promptly.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{BLANK_PAGE, DropsApi, PageDriver};
use crate::config::MinerConfig;
use crate::domain::{Campaign, DropTarget, StreamCandidate};
use crate::{Error, Result};

use super::claims::ClaimLedger;
use super::events::{SchedulerEvent, SchedulerEventBroadcaster};
use super::failure_tracker::{FailureTracker, FailureTrackerConfig};
use super::queue::{CampaignOrdering, PendingQueue};
use super::selector;
use super::session::{
    CommunityPointsComponent, DropProgressComponent, SessionComponent, SessionContext,
    SessionOutcome, WatchSession,
};
use super::watchdog::{CampaignFilter, WATCHDOG_CHANNEL_CAPACITY, Watchdog, WatchdogMessage};

/// A campaign attempted within this window is not attempted again.
pub const ATTEMPT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Delay between watch session ticks.
pub const SESSION_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How a campaign attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignOutcome {
    /// Every drop is claimed.
    Exhausted,
    /// The campaign cannot be pursued right now.
    Abandoned(String),
    /// No usable live stream was found.
    NoEligibleStreams,
    /// A higher-priority campaign became viable.
    Preempted,
    /// An API call the attempt depends on failed.
    Failed(String),
    /// The scheduler is shutting down.
    Cancelled,
}

impl fmt::Display for CampaignOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "exhausted"),
            Self::Abandoned(reason) => write!(f, "abandoned: {}", reason),
            Self::NoEligibleStreams => write!(f, "no eligible streams"),
            Self::Preempted => write!(f, "preempted"),
            Self::Failed(e) => write!(f, "failed: {}", e),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a watchdog message means for a waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchdogSignal {
    Ignored,
    Refreshed,
    Failed,
}

/// What a watch session is for.
enum SessionMode {
    Campaign {
        campaign_id: String,
        target: DropTarget,
    },
    Idle,
}

/// The campaign scheduler.
pub struct Scheduler {
    api: Arc<dyn DropsApi>,
    driver: Arc<dyn PageDriver>,
    config: MinerConfig,
    /// Campaigns from the latest refresh, by id.
    campaigns: HashMap<String, Campaign>,
    queue: PendingQueue,
    /// Campaigns whose drops are all claimed.
    completed: HashSet<String>,
    /// Last attempt of each campaign.
    attempts: HashMap<String, Instant>,
    failures: FailureTracker,
    claims: ClaimLedger,
    watchdog_rx: Option<mpsc::Receiver<WatchdogMessage>>,
    events: SchedulerEventBroadcaster,
    cancellation_token: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler. Fails if `config` does not validate.
    pub fn new(
        api: Arc<dyn DropsApi>,
        driver: Arc<dyn PageDriver>,
        config: MinerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let failures = FailureTracker::with_config(FailureTrackerConfig {
            failure_threshold: config.failed_stream_retry,
            blacklist_timeout: config.blacklist_timeout(),
        });

        Ok(Self {
            api,
            driver,
            config,
            campaigns: HashMap::new(),
            queue: PendingQueue::new(),
            completed: HashSet::new(),
            attempts: HashMap::new(),
            failures,
            claims: ClaimLedger::new(),
            watchdog_rx: None,
            events: SchedulerEventBroadcaster::new(),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn events(&self) -> &SchedulerEventBroadcaster {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Pending campaign ids in priority order.
    pub fn pending_campaigns(&self) -> Vec<String> {
        self.queue.iter().map(str::to_string).collect()
    }

    /// Run until the cancellation token is cancelled.
    pub async fn run(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::channel(WATCHDOG_CHANNEL_CAPACITY);
        self.watchdog_rx = Some(rx);

        let watchdog_token = self.cancellation_token.child_token();
        let watchdog = Watchdog::new(
            self.api.clone(),
            CampaignFilter::from_config(&self.config),
            self.config.refresh_interval(),
            self.events.clone(),
        )
        .spawn(tx, watchdog_token.clone());

        info!(
            games = self.config.games.len(),
            refresh_interval_secs = self.config.refresh_interval().as_secs(),
            "Scheduler started"
        );

        let result = self.run_loop().await;

        watchdog_token.cancel();
        if let Err(e) = watchdog.await {
            warn!(error = %e, "Campaign watchdog task failed");
        }
        self.watchdog_rx = None;

        info!("Scheduler stopped");
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        if !self.wait_for_first_refresh().await? {
            return Ok(());
        }

        while !self.cancellation_token.is_cancelled() {
            self.select_work().await;
        }
        Ok(())
    }

    /// Returns `Ok(false)` when cancelled first.
    async fn wait_for_first_refresh(&mut self) -> Result<bool> {
        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => return Ok(false),

                message = Self::recv_watchdog(&mut self.watchdog_rx) => {
                    let Some(message) = message else {
                        return Err(Error::Other(
                            "campaign watchdog stopped before the first refresh".to_string(),
                        ));
                    };
                    if self.apply_watchdog_message(message) == WatchdogSignal::Refreshed {
                        return Ok(true);
                    }
                }
            }
        }
    }

    /// Receive from the watchdog, pending forever once it is gone.
    async fn recv_watchdog(
        watchdog_rx: &mut Option<mpsc::Receiver<WatchdogMessage>>,
    ) -> Option<WatchdogMessage> {
        match watchdog_rx {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    fn on_watchdog_closed(&mut self) {
        warn!("Campaign watchdog stopped, no further refreshes");
        self.watchdog_rx = None;
    }

    fn apply_watchdog_message(&mut self, message: WatchdogMessage) -> WatchdogSignal {
        match message {
            WatchdogMessage::BeforeRefresh => {
                debug!("Campaign refresh starting");
                WatchdogSignal::Ignored
            }
            WatchdogMessage::Refreshed(campaigns) => {
                self.apply_refresh(campaigns);
                WatchdogSignal::Refreshed
            }
            WatchdogMessage::Failed(message) => {
                debug!(error = %message, "Campaign refresh failed");
                WatchdogSignal::Failed
            }
        }
    }

    /// Replace the campaign map and rebuild the pending queue from it.
    fn apply_refresh(&mut self, campaigns: Vec<Campaign>) {
        self.campaigns = campaigns.into_iter().map(|c| (c.id.clone(), c)).collect();

        let ids: Vec<String> = self
            .campaigns
            .keys()
            .filter(|id| !self.completed.contains(*id))
            .cloned()
            .collect();
        let ordering = CampaignOrdering::new(&self.campaigns, &self.config.games);
        self.queue.rebuild(ids, &ordering);

        debug!(
            campaigns = self.campaigns.len(),
            pending = self.queue.len(),
            "Pending queue rebuilt"
        );
        self.events.publish(SchedulerEvent::WatchdogRefreshed {
            pending: self.queue.len(),
            timestamp: Utc::now(),
        });
    }

    fn in_cooldown(&self, campaign_id: &str) -> bool {
        self.attempts
            .get(campaign_id)
            .is_some_and(|at| at.elapsed() < ATTEMPT_COOLDOWN)
    }

    /// First pending campaign that is active and out of cool-down.
    fn next_campaign(&self) -> Option<Campaign> {
        self.queue
            .iter()
            .filter(|id| !self.in_cooldown(id))
            .filter_map(|id| self.campaigns.get(id))
            .find(|c| c.is_active())
            .cloned()
    }

    fn pending_game_names(&self) -> Vec<String> {
        let mut games: Vec<String> = Vec::new();
        for campaign in self.queue.iter().filter_map(|id| self.campaigns.get(id)) {
            if !games.contains(&campaign.game_name) {
                games.push(campaign.game_name.clone());
            }
        }
        games
    }

    /// How long to sleep when nothing can be pursued.
    ///
    /// Wakes when the least recently attempted pending campaign leaves its
    /// cool-down, or after a full window when no pending campaign is cooling.
    fn idle_sleep_duration(&self) -> Duration {
        self.queue
            .iter()
            .filter_map(|id| self.attempts.get(id))
            .map(|at| at.elapsed())
            .filter(|elapsed| *elapsed < ATTEMPT_COOLDOWN)
            .max()
            .map_or(ATTEMPT_COOLDOWN, |elapsed| ATTEMPT_COOLDOWN - elapsed)
    }

    /// One pass of the selecting-work state.
    async fn select_work(&mut self) {
        if let Some(campaign) = self.next_campaign() {
            self.pursue_campaign(campaign).await;
            return;
        }

        if self.config.watch_streams_when_no_campaigns {
            let games = self.pending_game_names();
            let stream = selector::select_idle_stream(
                self.api.as_ref(),
                &self.config.broadcasters,
                &games,
                &mut self.failures,
            )
            .await;
            if let Some(stream) = stream {
                info!(url = %stream.url, "No campaign available, idle watching");
                let outcome = self.watch(stream, SessionMode::Idle).await;
                debug!(outcome = %outcome, "Idle session ended");
                return;
            }
        }

        self.sleep().await;
    }

    async fn sleep(&mut self) {
        if let Err(e) = self.driver.navigate(BLANK_PAGE).await {
            warn!(error = %e, "Failed to navigate to blank page");
        }

        let duration = self.idle_sleep_duration();
        info!(
            pending = self.queue.len(),
            sleep_secs = duration.as_secs(),
            "No campaign available, sleeping"
        );
        let deadline = Instant::now() + duration;

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => return,

                message = Self::recv_watchdog(&mut self.watchdog_rx) => match message {
                    Some(message) => {
                        if self.apply_watchdog_message(message) != WatchdogSignal::Ignored {
                            return;
                        }
                    }
                    None => self.on_watchdog_closed(),
                },

                _ = tokio::time::sleep_until(deadline) => return,
            }
        }
    }

    async fn pursue_campaign(&mut self, campaign: Campaign) {
        info!(
            campaign_id = %campaign.id,
            campaign = %campaign.name,
            game = %campaign.game_name,
            "Pursuing campaign"
        );
        self.attempts.insert(campaign.id.clone(), Instant::now());
        self.events.publish(SchedulerEvent::CampaignStarted {
            campaign_id: campaign.id.clone(),
            campaign_name: campaign.name.clone(),
            game_name: campaign.game_name.clone(),
            timestamp: Utc::now(),
        });

        let outcome = self.run_campaign(&campaign).await;
        match &outcome {
            CampaignOutcome::Exhausted => {
                info!(campaign_id = %campaign.id, "All drops claimed");
                self.completed.insert(campaign.id.clone());
                self.queue.remove(&campaign.id);
            }
            CampaignOutcome::Abandoned(reason) => {
                info!(campaign_id = %campaign.id, reason = %reason, "Campaign abandoned");
            }
            CampaignOutcome::NoEligibleStreams => {
                info!(campaign_id = %campaign.id, "No eligible streams for campaign");
            }
            CampaignOutcome::Preempted => {
                info!(campaign_id = %campaign.id, "Campaign preempted by a higher priority one");
            }
            CampaignOutcome::Failed(e) => {
                warn!(campaign_id = %campaign.id, error = %e, "Campaign attempt failed");
            }
            CampaignOutcome::Cancelled => {
                debug!(campaign_id = %campaign.id, "Campaign attempt cancelled");
            }
        }

        self.events.publish(SchedulerEvent::CampaignFinished {
            campaign_id: campaign.id.clone(),
            outcome: outcome.to_string(),
            timestamp: Utc::now(),
        });
    }

    async fn run_campaign(&mut self, campaign: &Campaign) -> CampaignOutcome {
        if !campaign.account_linked {
            if self.config.show_account_not_linked_warning {
                warn!(
                    campaign_id = %campaign.id,
                    game = %campaign.game_name,
                    "Account is not linked for this campaign"
                );
            } else {
                debug!(campaign_id = %campaign.id, "Account is not linked for this campaign");
            }
            return CampaignOutcome::Abandoned("account not linked".to_string());
        }

        let detail = match self.api.get_campaign_detail(&campaign.id).await {
            Ok(detail) => detail,
            Err(e) => {
                return CampaignOutcome::Failed(format!("failed to fetch campaign detail: {}", e));
            }
        };

        loop {
            if self.cancellation_token.is_cancelled() {
                return CampaignOutcome::Cancelled;
            }

            let inventory = match self.api.get_inventory().await {
                Ok(inventory) => inventory,
                Err(e) => {
                    return CampaignOutcome::Failed(format!("failed to fetch inventory: {}", e));
                }
            };
            let claims = &self.claims;
            let Some(target) = detail.first_unclaimed(&inventory, |id| claims.contains(id)) else {
                return CampaignOutcome::Exhausted;
            };

            if target.is_watch_complete() {
                match self.claim_drop(&target).await {
                    Ok(true) => continue,
                    Ok(false) => {
                        return CampaignOutcome::Failed(format!(
                            "drop {} is complete but has no claim instance",
                            target.drop.id
                        ));
                    }
                    Err(e) => {
                        return CampaignOutcome::Failed(format!("failed to claim drop: {}", e));
                    }
                }
            }

            if !self.config.attempt_impossible_campaigns && !target.is_achievable(Utc::now()) {
                return CampaignOutcome::Abandoned(format!(
                    "drop {} cannot be completed before it ends",
                    target.drop.name
                ));
            }

            self.failures.reset_all();
            info!(
                campaign_id = %campaign.id,
                drop = %target.drop.name,
                minutes = target.current_minutes,
                required = target.drop.required_minutes,
                "Pursuing drop"
            );

            loop {
                let streams = match selector::eligible_streams(
                    self.api.as_ref(),
                    campaign,
                    &detail,
                    &mut self.failures,
                )
                .await
                {
                    Ok(streams) => streams,
                    Err(e) => {
                        return CampaignOutcome::Failed(format!("failed to list streams: {}", e));
                    }
                };
                let Some(stream) = streams.into_iter().next() else {
                    return CampaignOutcome::NoEligibleStreams;
                };

                let mode = SessionMode::Campaign {
                    campaign_id: campaign.id.clone(),
                    target: target.clone(),
                };
                match self.watch(stream, mode).await {
                    // Re-check the inventory for the next drop.
                    SessionOutcome::Completed => break,
                    SessionOutcome::Preempted => return CampaignOutcome::Preempted,
                    SessionOutcome::Cancelled => return CampaignOutcome::Cancelled,
                    SessionOutcome::NoProgress => {
                        info!(campaign_id = %campaign.id, "No watch progress, trying another stream");
                    }
                    SessionOutcome::StreamDown
                    | SessionOutcome::SetupFailed(_)
                    | SessionOutcome::Failed(_) => {}
                }
            }
        }
    }

    async fn claim_drop(&mut self, target: &DropTarget) -> Result<bool> {
        let claimed = self.claims.claim(self.api.as_ref(), target).await?;
        if claimed {
            self.events.publish(SchedulerEvent::DropClaimed {
                campaign_id: target.drop.campaign_id.clone(),
                drop_id: target.drop.id.clone(),
                drop_name: target.drop.name.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(claimed)
    }

    /// Run one watch session and charge its stream for failures.
    async fn watch(&mut self, stream: StreamCandidate, mode: SessionMode) -> SessionOutcome {
        let mut components: Vec<Box<dyn SessionComponent>> = Vec::new();
        let (campaign_id, drop_id) = match mode {
            SessionMode::Campaign {
                campaign_id,
                target,
            } => {
                let drop_id = target.drop.id.clone();
                components.push(Box::new(DropProgressComponent::new(
                    target,
                    self.config.progress_poll_interval(),
                    self.config.stall_timeout(),
                )));
                (Some(campaign_id), Some(drop_id))
            }
            SessionMode::Idle => (None, None),
        };
        components.push(Box::new(CommunityPointsComponent::new()));

        self.events.publish(SchedulerEvent::SessionStarted {
            url: stream.url.clone(),
            campaign_id: campaign_id.clone(),
            timestamp: Utc::now(),
        });

        let mut session = WatchSession::new(stream, campaign_id, drop_id, components);
        let outcome = self.drive_session(&mut session).await;
        session.teardown(&outcome, &self.events);

        let url = session.stream().url.clone();
        self.charge_stream(&url, &outcome);
        outcome
    }

    fn charge_stream(&mut self, url: &str, outcome: &SessionOutcome) {
        let blacklisted = match outcome {
            SessionOutcome::StreamDown => {
                self.failures.blacklist_now(url);
                true
            }
            outcome if outcome.is_stream_failure() => {
                let failures = self.failures.record_failure(url);
                debug!(url = %url, failures, outcome = %outcome, "Stream failure counted");
                self.failures.is_blacklisted(url)
            }
            _ => false,
        };

        if blacklisted {
            self.events.publish(SchedulerEvent::StreamBlacklisted {
                url: url.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    async fn drive_session(&mut self, session: &mut WatchSession) -> SessionOutcome {
        let api = self.api.clone();
        let driver = self.driver.clone();

        {
            let mut ctx = SessionContext {
                api: api.as_ref(),
                driver: driver.as_ref(),
                claims: &mut self.claims,
                events: &self.events,
            };
            if let Err(e) = session.setup(&mut ctx, &self.config).await {
                warn!(url = %session.stream().url, error = %e, "Failed to set up watch session");
                return SessionOutcome::SetupFailed(e.to_string());
            }
        }

        let active_campaign = session.state().campaign_id.clone();

        loop {
            {
                let mut ctx = SessionContext {
                    api: api.as_ref(),
                    driver: driver.as_ref(),
                    claims: &mut self.claims,
                    events: &self.events,
                };
                if let Some(outcome) = session.tick(&mut ctx).await {
                    return outcome;
                }
            }

            // Idle watching ends as soon as a campaign can be pursued.
            if active_campaign.is_none() && self.next_campaign().is_some() {
                session.request_preemption();
                continue;
            }

            let deadline = Instant::now() + SESSION_TICK_INTERVAL;
            loop {
                tokio::select! {
                    biased;

                    _ = self.cancellation_token.cancelled() => return SessionOutcome::Cancelled,

                    message = Self::recv_watchdog(&mut self.watchdog_rx) => {
                        if self.on_watchdog_during_session(message, active_campaign.as_deref()).await {
                            session.request_preemption();
                            break;
                        }
                    }

                    event = session.next_live_event() => {
                        session.on_live_event(event);
                        if session.state().stream_down {
                            break;
                        }
                    }

                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }
        }
    }

    /// Handle a watchdog message while a session runs. Returns whether to preempt.
    async fn on_watchdog_during_session(
        &mut self,
        message: Option<WatchdogMessage>,
        active_campaign: Option<&str>,
    ) -> bool {
        let Some(message) = message else {
            self.on_watchdog_closed();
            return false;
        };
        if self.apply_watchdog_message(message) != WatchdogSignal::Refreshed {
            return false;
        }
        self.has_higher_priority(active_campaign).await
    }

    /// Whether a campaign ranked above `active_campaign` can make progress now.
    ///
    /// Drops found already watched out are claimed on the way.
    async fn has_higher_priority(&mut self, active_campaign: Option<&str>) -> bool {
        let ids = self.pending_campaigns();

        for id in ids {
            if active_campaign == Some(id.as_str()) {
                break;
            }
            if self.in_cooldown(&id) {
                continue;
            }
            let Some(campaign) = self.campaigns.get(&id).cloned() else {
                continue;
            };
            if !campaign.is_active() || !campaign.account_linked {
                continue;
            }

            let inventory = match self.api.get_inventory().await {
                Ok(inventory) => inventory,
                Err(e) => {
                    warn!(campaign_id = %id, error = %e, "Priority check: failed to fetch inventory");
                    continue;
                }
            };
            let detail = match self.api.get_campaign_detail(&id).await {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(campaign_id = %id, error = %e, "Priority check: failed to fetch detail");
                    continue;
                }
            };

            let claims = &self.claims;
            let Some(target) = detail.first_unclaimed(&inventory, |c| claims.contains(c)) else {
                continue;
            };
            if target.is_watch_complete() {
                if let Err(e) = self.claim_drop(&target).await {
                    warn!(campaign_id = %id, error = %e, "Priority check: failed to claim drop");
                }
                continue;
            }
            if !self.config.attempt_impossible_campaigns && !target.is_achievable(Utc::now()) {
                continue;
            }

            match selector::eligible_streams(
                self.api.as_ref(),
                &campaign,
                &detail,
                &mut self.failures,
            )
            .await
            {
                Ok(streams) if !streams.is_empty() => {
                    info!(campaign_id = %id, campaign = %campaign.name, "Higher priority campaign available");
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(campaign_id = %id, error = %e, "Priority check: failed to list streams");
                }
            }
        }

        false
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.queue)
            .field("completed", &self.completed)
            .field("claims", &self.claims.len())
            .finish()
    }
}
