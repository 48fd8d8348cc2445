//! Inventory progress records supplied by the API client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::campaign::RewardDrop;

/// Progress of a single drop in the viewer's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropProgress {
    pub drop_id: String,
    pub current_minutes_watched: u32,
    pub is_claimed: bool,
    /// Present once the drop can be (or has been) claimed.
    pub claim_instance_id: Option<String>,
}

/// Progress of every started drop of one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignProgress {
    pub campaign_id: String,
    pub drops: Vec<DropProgress>,
}

/// The viewer's inventory: campaigns with at least one started drop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub campaigns: Vec<CampaignProgress>,
}

impl Inventory {
    pub fn drop_progress(&self, campaign_id: &str, drop_id: &str) -> Option<&DropProgress> {
        self.campaigns
            .iter()
            .find(|c| c.campaign_id == campaign_id)
            .and_then(|c| c.drops.iter().find(|d| d.drop_id == drop_id))
    }
}

/// The drop currently being pursued, with its progress snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    pub drop: RewardDrop,
    pub current_minutes: u32,
    pub claim_instance_id: Option<String>,
}

impl DropTarget {
    /// Whether enough minutes have been watched to claim.
    pub fn is_watch_complete(&self) -> bool {
        self.current_minutes >= self.drop.required_minutes
    }

    /// Minutes still needed before the drop can be claimed.
    pub fn remaining_minutes(&self) -> u32 {
        self.drop.required_minutes.saturating_sub(self.current_minutes)
    }

    /// Whether the drop can still be earned before it ends.
    pub fn is_achievable(&self, now: DateTime<Utc>) -> bool {
        let remaining_active = (self.drop.ends_at - now).num_minutes();
        remaining_active >= i64::from(self.remaining_minutes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(required: u32, current: u32, ends_in_minutes: i64) -> DropTarget {
        DropTarget {
            drop: RewardDrop {
                id: "d1".to_string(),
                campaign_id: "c1".to_string(),
                name: "reward".to_string(),
                required_minutes: required,
                ends_at: Utc::now() + chrono::Duration::minutes(ends_in_minutes),
            },
            current_minutes: current,
            claim_instance_id: None,
        }
    }

    #[test]
    fn test_watch_complete() {
        assert!(target(60, 60, 10).is_watch_complete());
        assert!(target(60, 75, 10).is_watch_complete());
        assert!(!target(60, 59, 10).is_watch_complete());
        assert_eq!(target(60, 75, 10).remaining_minutes(), 0);
        assert_eq!(target(60, 20, 10).remaining_minutes(), 40);
    }

    #[test]
    fn test_achievable() {
        let now = Utc::now();
        assert!(target(60, 0, 120).is_achievable(now));
        assert!(!target(60, 0, 30).is_achievable(now));
        assert!(target(60, 40, 30).is_achievable(now));
    }

    #[test]
    fn test_drop_progress_lookup() {
        let inventory = Inventory {
            campaigns: vec![CampaignProgress {
                campaign_id: "c1".to_string(),
                drops: vec![DropProgress {
                    drop_id: "d1".to_string(),
                    current_minutes_watched: 12,
                    is_claimed: false,
                    claim_instance_id: None,
                }],
            }],
        };
        assert_eq!(
            inventory
                .drop_progress("c1", "d1")
                .map(|p| p.current_minutes_watched),
            Some(12)
        );
        assert!(inventory.drop_progress("c1", "d2").is_none());
        assert!(inventory.drop_progress("c2", "d1").is_none());
    }
}
