//! Campaign and drop entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::inventory::{DropTarget, Inventory};

/// Lifecycle status of a campaign as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CampaignStatus {
    /// Running now; progress can be earned.
    Active,
    /// Announced but not started.
    Upcoming,
    /// Ended.
    Expired,
    /// Anything the API reports that we do not know about.
    Other,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Upcoming => "UPCOMING",
            Self::Expired => "EXPIRED",
            Self::Other => "OTHER",
        }
    }

    /// Parse the API representation. Unknown values map to [`CampaignStatus::Other`].
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "UPCOMING" => Self::Upcoming,
            "EXPIRED" => Self::Expired,
            _ => Self::Other,
        }
    }

    /// Whether a campaign in this status may sit in the pending queue.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Self::Active | Self::Upcoming)
    }
}

impl From<String> for CampaignStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<CampaignStatus> for String {
    fn from(value: CampaignStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A time-bounded reward program tied to a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub game_id: String,
    /// Game display name, used to query live streams.
    pub game_name: String,
    pub name: String,
    pub status: CampaignStatus,
    pub ends_at: DateTime<Utc>,
    /// Whether the viewer's account is linked for this campaign.
    pub account_linked: bool,
}

impl Campaign {
    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }
}

/// Channel restriction attached to a campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAllowList {
    pub enabled: bool,
    /// Broadcaster ids. `None` while `enabled` means the API sent no list.
    pub channel_ids: Option<Vec<String>>,
}

impl ChannelAllowList {
    /// Whether streams must be filtered down to an explicit channel set.
    pub fn is_restricted(&self) -> bool {
        self.enabled && self.channel_ids.is_some()
    }

    /// Check whether a broadcaster may be watched for this campaign.
    pub fn permits(&self, broadcaster_id: &str) -> bool {
        match &self.channel_ids {
            Some(ids) if self.enabled => ids.iter().any(|id| id == broadcaster_id),
            _ => true,
        }
    }
}

/// An individual reward, unlocked after watching for `required_minutes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDrop {
    pub id: String,
    pub campaign_id: String,
    /// Benefit name shown to the user.
    pub name: String,
    pub required_minutes: u32,
    pub ends_at: DateTime<Utc>,
}

/// Detail record fetched per campaign: its drops and channel restriction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignDetail {
    pub campaign_id: String,
    pub allow: ChannelAllowList,
    pub drops: Vec<RewardDrop>,
}

impl CampaignDetail {
    /// Find the first drop that is not claimed yet, paired with its progress.
    ///
    /// A drop counts as claimed when the inventory says so or when
    /// `already_claimed` recognises its claim instance id.
    pub fn first_unclaimed(
        &self,
        inventory: &Inventory,
        already_claimed: impl Fn(&str) -> bool,
    ) -> Option<DropTarget> {
        self.drops.iter().find_map(|drop| {
            let progress = inventory.drop_progress(&self.campaign_id, &drop.id);
            let claimed = progress.is_some_and(|p| {
                p.is_claimed
                    || p
                        .claim_instance_id
                        .as_deref()
                        .is_some_and(&already_claimed)
            });
            if claimed {
                return None;
            }
            Some(DropTarget {
                drop: drop.clone(),
                current_minutes: progress.map(|p| p.current_minutes_watched).unwrap_or(0),
                claim_instance_id: progress.and_then(|p| p.claim_instance_id.clone()),
            })
        })
    }
}
