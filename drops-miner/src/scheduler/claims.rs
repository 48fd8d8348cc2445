//! Claim ledger.
//!
//! Remembers every claim instance id claimed by this process so that a drop
//! is never claimed twice, even while the inventory still lags behind.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::Result;
use crate::adapter::DropsApi;
use crate::domain::DropTarget;

#[derive(Debug, Default)]
pub struct ClaimLedger {
    claimed: HashSet<String>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, claim_instance_id: &str) -> bool {
        self.claimed.contains(claim_instance_id)
    }

    /// Claim `target` if it has a claim instance id that was not claimed yet.
    ///
    /// Returns `Ok(true)` when a claim call was issued and succeeded. A failed
    /// call is not recorded, so the next attempt retries it.
    pub async fn claim(&mut self, api: &dyn DropsApi, target: &DropTarget) -> Result<bool> {
        let Some(instance_id) = target.claim_instance_id.as_deref() else {
            debug!(drop_id = %target.drop.id, "Drop has no claim instance yet");
            return Ok(false);
        };
        if self.contains(instance_id) {
            debug!(drop_id = %target.drop.id, "Drop already claimed");
            return Ok(false);
        }

        api.claim_drop(instance_id).await?;
        self.claimed.insert(instance_id.to_string());
        info!(
            campaign_id = %target.drop.campaign_id,
            drop_id = %target.drop.id,
            drop = %target.drop.name,
            "Claimed drop"
        );
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryDropsApi;
    use crate::domain::RewardDrop;
    use chrono::Utc;

    fn target(instance: Option<&str>) -> DropTarget {
        DropTarget {
            drop: RewardDrop {
                id: "d1".to_string(),
                campaign_id: "c1".to_string(),
                name: "Cape".to_string(),
                required_minutes: 60,
                ends_at: Utc::now(),
            },
            current_minutes: 60,
            claim_instance_id: instance.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_claim_once() {
        let api = InMemoryDropsApi::new();
        let mut ledger = ClaimLedger::new();

        assert!(ledger.claim(&api, &target(Some("i1"))).await.unwrap());
        assert!(!ledger.claim(&api, &target(Some("i1"))).await.unwrap());
        assert!(ledger.contains("i1"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(api.claims(), vec!["i1"]);
    }

    #[tokio::test]
    async fn test_claim_without_instance() {
        let api = InMemoryDropsApi::new();
        let mut ledger = ClaimLedger::new();

        assert!(!ledger.claim(&api, &target(None)).await.unwrap());
        assert!(ledger.is_empty());
        assert!(api.claims().is_empty());
    }
}
