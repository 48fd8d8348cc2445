//! Channel points bonus collector.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::Result;

use super::component::{SessionComponent, SessionContext, TickStatus};

/// Claims the channel-points bonus whenever the page offers one. Never done.
#[derive(Debug, Default)]
pub struct CommunityPointsComponent {
    claimed: u32,
}

impl CommunityPointsComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bonuses claimed during this session.
    pub fn claimed(&self) -> u32 {
        self.claimed
    }
}

#[async_trait]
impl SessionComponent for CommunityPointsComponent {
    fn name(&self) -> &'static str {
        "community_points"
    }

    async fn on_tick(&mut self, ctx: &mut SessionContext<'_>) -> Result<TickStatus> {
        match ctx.driver.claim_bonus_points().await {
            Ok(true) => {
                self.claimed += 1;
                info!(total = self.claimed, "Claimed channel points bonus");
            }
            Ok(false) => {}
            // Bonus check failures never end the session.
            Err(e) => debug!(error = %e, "Channel points bonus check failed"),
        }
        Ok(TickStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{InMemoryDropsApi, InMemoryPageDriver};
    use crate::scheduler::claims::ClaimLedger;
    use crate::scheduler::events::SchedulerEventBroadcaster;

    #[tokio::test]
    async fn test_claims_offered_bonus() {
        let api = InMemoryDropsApi::new();
        let driver = InMemoryPageDriver::new();
        let mut claims = ClaimLedger::new();
        let events = SchedulerEventBroadcaster::new();
        let mut ctx = SessionContext {
            api: &api,
            driver: &driver,
            claims: &mut claims,
            events: &events,
        };

        let mut component = CommunityPointsComponent::new();
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Pending);
        assert_eq!(component.claimed(), 0);

        driver.offer_bonus();
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Pending);
        assert_eq!(component.claimed(), 1);
        assert_eq!(driver.bonus_claims(), 1);
    }
}
