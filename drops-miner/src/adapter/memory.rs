//! In-memory collaborators for testing.
//!
//! Both implementations are scriptable: tests seed campaigns, inventory and
//! live streams, inject failures, and inspect the calls the scheduler made.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{
    Campaign, CampaignDetail, CampaignProgress, DropProgress, Inventory, StreamCandidate,
    StreamFilter,
};
use crate::{Error, Result};

use super::api::DropsApi;
use super::driver::{
    DEFAULT_LIVE_EVENT_CAPACITY, LiveEvent, LiveEventPublisher, LiveEventSubscription, PageDriver,
};

#[derive(Debug, Default)]
struct ApiState {
    campaigns: Vec<Campaign>,
    details: HashMap<String, CampaignDetail>,
    inventory: Inventory,
    streams: HashMap<String, Vec<StreamCandidate>>,
    live_broadcasters: HashSet<String>,
    fail_campaign_list: bool,
    fail_inventory: bool,
    failing_details: HashSet<String>,
    claims: Vec<String>,
    stream_queries: Vec<String>,
    campaign_list_calls: usize,
}

/// Scriptable in-memory [`DropsApi`].
#[derive(Debug, Default)]
pub struct InMemoryDropsApi {
    state: Mutex<ApiState>,
}

impl InMemoryDropsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_campaigns(&self, campaigns: Vec<Campaign>) {
        self.state.lock().campaigns = campaigns;
    }

    pub fn set_detail(&self, detail: CampaignDetail) {
        self.state
            .lock()
            .details
            .insert(detail.campaign_id.clone(), detail);
    }

    pub fn set_inventory(&self, inventory: Inventory) {
        self.state.lock().inventory = inventory;
    }

    /// Insert or replace the progress record of one drop.
    pub fn set_drop_progress(&self, campaign_id: &str, progress: DropProgress) {
        let mut state = self.state.lock();
        let campaigns = &mut state.inventory.campaigns;
        let index = match campaigns.iter().position(|c| c.campaign_id == campaign_id) {
            Some(index) => index,
            None => {
                campaigns.push(CampaignProgress {
                    campaign_id: campaign_id.to_string(),
                    drops: Vec::new(),
                });
                campaigns.len() - 1
            }
        };
        let drops = &mut campaigns[index].drops;
        match drops.iter_mut().find(|d| d.drop_id == progress.drop_id) {
            Some(existing) => *existing = progress,
            None => drops.push(progress),
        }
    }

    /// Live streams returned for `game_name`.
    pub fn set_streams(&self, game_name: &str, streams: Vec<StreamCandidate>) {
        self.state
            .lock()
            .streams
            .insert(game_name.to_string(), streams);
    }

    pub fn set_broadcaster_live(&self, login: &str, live: bool) {
        let mut state = self.state.lock();
        if live {
            state.live_broadcasters.insert(login.to_lowercase());
        } else {
            state.live_broadcasters.remove(&login.to_lowercase());
        }
    }

    pub fn fail_campaign_list(&self, fail: bool) {
        self.state.lock().fail_campaign_list = fail;
    }

    pub fn fail_inventory(&self, fail: bool) {
        self.state.lock().fail_inventory = fail;
    }

    pub fn fail_detail(&self, campaign_id: &str) {
        self.state
            .lock()
            .failing_details
            .insert(campaign_id.to_string());
    }

    /// Claim instance ids passed to `claim_drop`, in call order.
    pub fn claims(&self) -> Vec<String> {
        self.state.lock().claims.clone()
    }

    /// Game names passed to `list_live_streams`, in call order.
    pub fn stream_queries(&self) -> Vec<String> {
        self.state.lock().stream_queries.clone()
    }

    pub fn campaign_list_calls(&self) -> usize {
        self.state.lock().campaign_list_calls
    }
}

#[async_trait]
impl DropsApi for InMemoryDropsApi {
    async fn list_eligible_campaigns(&self) -> Result<Vec<Campaign>> {
        let mut state = self.state.lock();
        state.campaign_list_calls += 1;
        if state.fail_campaign_list {
            return Err(Error::api("campaign list unavailable"));
        }
        Ok(state.campaigns.clone())
    }

    async fn get_campaign_detail(&self, campaign_id: &str) -> Result<CampaignDetail> {
        let state = self.state.lock();
        if state.failing_details.contains(campaign_id) {
            return Err(Error::api(format!("detail unavailable for {}", campaign_id)));
        }
        state
            .details
            .get(campaign_id)
            .cloned()
            .ok_or_else(|| Error::api(format!("unknown campaign {}", campaign_id)))
    }

    async fn get_inventory(&self) -> Result<Inventory> {
        let state = self.state.lock();
        if state.fail_inventory {
            return Err(Error::api("inventory unavailable"));
        }
        Ok(state.inventory.clone())
    }

    async fn claim_drop(&self, claim_instance_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.claims.push(claim_instance_id.to_string());
        for progress in state
            .inventory
            .campaigns
            .iter_mut()
            .flat_map(|c| c.drops.iter_mut())
        {
            if progress.claim_instance_id.as_deref() == Some(claim_instance_id) {
                progress.is_claimed = true;
            }
        }
        Ok(())
    }

    async fn list_live_streams(
        &self,
        game_name: &str,
        filter: StreamFilter,
    ) -> Result<Vec<StreamCandidate>> {
        let mut state = self.state.lock();
        state.stream_queries.push(game_name.to_string());
        let streams = state.streams.get(game_name).cloned().unwrap_or_default();
        Ok(streams
            .into_iter()
            .filter(|s| !filter.drops_enabled || s.is_drops_enabled())
            .collect())
    }

    async fn is_broadcaster_live(&self, broadcaster: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .live_broadcasters
            .contains(&broadcaster.to_lowercase()))
    }
}

#[derive(Debug, Default)]
struct DriverState {
    navigations: Vec<String>,
    current_url: Option<String>,
    failing_loads: HashSet<String>,
    publisher: Option<LiveEventPublisher>,
    viewer_count: Option<u64>,
    bonus_available: bool,
    bonus_claims: usize,
    hidden_video: bool,
}

/// Scriptable in-memory [`PageDriver`].
#[derive(Debug, Default)]
pub struct InMemoryPageDriver {
    state: Mutex<DriverState>,
}

impl InMemoryPageDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `wait_for_load` fail while `url` is open.
    pub fn fail_load(&self, url: &str) {
        self.state.lock().failing_loads.insert(url.to_string());
    }

    pub fn set_viewer_count(&self, viewers: Option<u64>) {
        self.state.lock().viewer_count = viewers;
    }

    /// Offer a channel-points bonus on the next claim attempt.
    pub fn offer_bonus(&self) {
        self.state.lock().bonus_available = true;
    }

    /// Push a live event to the attached listener. Returns `false` when none is attached.
    pub fn emit(&self, event: LiveEvent) -> bool {
        self.state
            .lock()
            .publisher
            .as_ref()
            .is_some_and(|publisher| publisher.publish(event))
    }

    /// Every URL navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn current_url(&self) -> Option<String> {
        self.state.lock().current_url.clone()
    }

    pub fn is_listener_attached(&self) -> bool {
        self.state
            .lock()
            .publisher
            .as_ref()
            .is_some_and(|publisher| !publisher.is_detached())
    }

    pub fn bonus_claims(&self) -> usize {
        self.state.lock().bonus_claims
    }

    pub fn is_video_hidden(&self) -> bool {
        self.state.lock().hidden_video
    }
}

#[async_trait]
impl PageDriver for InMemoryPageDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.navigations.push(url.to_string());
        state.current_url = Some(url.to_string());
        state.hidden_video = false;
        Ok(())
    }

    async fn wait_for_load(&self, _timeout: Duration) -> Result<()> {
        let state = self.state.lock();
        match &state.current_url {
            Some(url) if state.failing_loads.contains(url) => {
                Err(Error::driver(format!("timed out loading {}", url)))
            }
            _ => Ok(()),
        }
    }

    async fn attach_live_events(&self, _stream: &StreamCandidate) -> Result<LiveEventSubscription> {
        let (publisher, subscription) =
            LiveEventSubscription::channel(DEFAULT_LIVE_EVENT_CAPACITY);
        self.state.lock().publisher = Some(publisher);
        Ok(subscription)
    }

    async fn accept_content_gate(&self) -> Result<()> {
        Ok(())
    }

    async fn force_lowest_quality(&self) -> Result<()> {
        Ok(())
    }

    async fn hide_video(&self) -> Result<()> {
        self.state.lock().hidden_video = true;
        Ok(())
    }

    async fn read_viewer_count(&self) -> Result<Option<u64>> {
        Ok(self.state.lock().viewer_count)
    }

    async fn read_uptime(&self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn claim_bonus_points(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.bonus_available {
            state.bonus_available = false;
            state.bonus_claims += 1;
            return Ok(true);
        }
        Ok(false)
    }
}
