//! Remote API client interface.
//!
//! The scheduler only depends on these contracts; request shapes and
//! authentication belong to the implementation.

use async_trait::async_trait;

use crate::Result;
use crate::domain::{Campaign, CampaignDetail, Inventory, StreamCandidate, StreamFilter};

/// Operations the scheduler consumes from the drops API.
///
/// Every call may fail with [`crate::Error::Api`]; call sites decide whether
/// to skip or abort.
#[async_trait]
pub trait DropsApi: Send + Sync + 'static {
    /// All campaigns the viewer could currently make progress on.
    async fn list_eligible_campaigns(&self) -> Result<Vec<Campaign>>;

    /// Detail record (drops, channel allow-list) for one campaign.
    async fn get_campaign_detail(&self, campaign_id: &str) -> Result<CampaignDetail>;

    /// The viewer's inventory with per-drop progress.
    async fn get_inventory(&self) -> Result<Inventory>;

    /// Claim a drop by its claim instance id.
    async fn claim_drop(&self, claim_instance_id: &str) -> Result<()>;

    /// Live streams for a game, in the order the API ranks them.
    async fn list_live_streams(
        &self,
        game_name: &str,
        filter: StreamFilter,
    ) -> Result<Vec<StreamCandidate>>;

    /// Whether a broadcaster (by login) is live right now.
    async fn is_broadcaster_live(&self, broadcaster: &str) -> Result<bool>;
}
