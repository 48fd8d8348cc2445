//! Drop progress observer.
//!
//! Polls the inventory on its own interval, claims the targeted drop once
//! enough minutes are watched, and gives up when the minutes counter stops
//! moving for longer than the stall timeout.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::Result;
use crate::domain::DropTarget;
use crate::scheduler::events::SchedulerEvent;

use super::component::{ProgressSnapshot, SessionComponent, SessionContext, TickStatus};

pub struct DropProgressComponent {
    target: DropTarget,
    poll_interval: Duration,
    stall_timeout: Duration,
    next_poll: Instant,
    last_advance: Instant,
}

impl DropProgressComponent {
    pub fn new(target: DropTarget, poll_interval: Duration, stall_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            target,
            poll_interval,
            stall_timeout,
            next_poll: now + poll_interval,
            last_advance: now,
        }
    }

    pub fn target(&self) -> &DropTarget {
        &self.target
    }

    fn stall_status(&self, now: Instant) -> TickStatus {
        if now.duration_since(self.last_advance) >= self.stall_timeout {
            warn!(
                drop_id = %self.target.drop.id,
                minutes = self.target.current_minutes,
                stalled_secs = now.duration_since(self.last_advance).as_secs(),
                "Drop progress stalled"
            );
            TickStatus::Stalled
        } else {
            TickStatus::Pending
        }
    }

    async fn poll_inventory(&mut self, ctx: &mut SessionContext<'_>, now: Instant) -> Option<TickStatus> {
        let inventory = match ctx.api.get_inventory().await {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!(error = %e, "Failed to poll inventory");
                return None;
            }
        };

        let progress = inventory.drop_progress(&self.target.drop.campaign_id, &self.target.drop.id)?;
        if progress.is_claimed {
            info!(drop_id = %self.target.drop.id, "Drop already claimed");
            return Some(TickStatus::Done);
        }

        if progress.current_minutes_watched > self.target.current_minutes {
            self.last_advance = now;
            debug!(
                drop_id = %self.target.drop.id,
                minutes = progress.current_minutes_watched,
                required = self.target.drop.required_minutes,
                "Drop progress advanced"
            );
        }
        self.target.current_minutes = progress.current_minutes_watched;
        if progress.claim_instance_id.is_some() {
            self.target.claim_instance_id = progress.claim_instance_id.clone();
        }
        None
    }
}

#[async_trait]
impl SessionComponent for DropProgressComponent {
    fn name(&self) -> &'static str {
        "drop_progress"
    }

    async fn on_start(&mut self, _ctx: &mut SessionContext<'_>) -> Result<()> {
        let now = Instant::now();
        self.next_poll = now + self.poll_interval;
        self.last_advance = now;
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &mut SessionContext<'_>) -> Result<TickStatus> {
        let now = Instant::now();
        if now >= self.next_poll {
            self.next_poll = now + self.poll_interval;
            if let Some(status) = self.poll_inventory(ctx, now).await {
                return Ok(status);
            }
        }

        if !self.target.is_watch_complete() {
            return Ok(self.stall_status(now));
        }

        let already_claimed = self
            .target
            .claim_instance_id
            .as_deref()
            .is_some_and(|id| ctx.claims.contains(id));
        if already_claimed {
            return Ok(TickStatus::Done);
        }

        if ctx.claims.claim(ctx.api, &self.target).await? {
            ctx.events.publish(SchedulerEvent::DropClaimed {
                campaign_id: self.target.drop.campaign_id.clone(),
                drop_id: self.target.drop.id.clone(),
                drop_name: self.target.drop.name.clone(),
                timestamp: Utc::now(),
            });
            return Ok(TickStatus::Done);
        }

        // Watched out but no claim instance yet. The stall clock keeps running.
        Ok(self.stall_status(now))
    }

    fn progress(&self) -> Option<ProgressSnapshot> {
        Some(ProgressSnapshot {
            drop_name: self.target.drop.name.clone(),
            minutes_watched: self.target.current_minutes,
            required_minutes: self.target.drop.required_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{InMemoryDropsApi, InMemoryPageDriver};
    use crate::domain::{DropProgress, RewardDrop};
    use crate::scheduler::claims::ClaimLedger;
    use crate::scheduler::events::SchedulerEventBroadcaster;

    const POLL: Duration = Duration::from_secs(60);
    const STALL: Duration = Duration::from_secs(300);

    fn target(current: u32) -> DropTarget {
        DropTarget {
            drop: RewardDrop {
                id: "d1".to_string(),
                campaign_id: "c1".to_string(),
                name: "Cape".to_string(),
                required_minutes: 60,
                ends_at: Utc::now() + chrono::Duration::hours(2),
            },
            current_minutes: current,
            claim_instance_id: None,
        }
    }

    fn progress(minutes: u32, instance: Option<&str>) -> DropProgress {
        DropProgress {
            drop_id: "d1".to_string(),
            current_minutes_watched: minutes,
            is_claimed: false,
            claim_instance_id: instance.map(str::to_string),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_claims_when_watch_complete() {
        let api = InMemoryDropsApi::new();
        let driver = InMemoryPageDriver::new();
        let mut claims = ClaimLedger::new();
        let events = SchedulerEventBroadcaster::new();
        let mut rx = events.subscribe();
        let mut ctx = SessionContext {
            api: &api,
            driver: &driver,
            claims: &mut claims,
            events: &events,
        };

        let mut component = DropProgressComponent::new(target(50), POLL, STALL);
        component.on_start(&mut ctx).await.unwrap();
        api.set_drop_progress("c1", progress(55, None));

        // Nothing is polled before the interval elapses.
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Pending);
        assert_eq!(component.target().current_minutes, 50);

        tokio::time::advance(POLL).await;
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Pending);
        assert_eq!(component.target().current_minutes, 55);

        api.set_drop_progress("c1", progress(60, Some("i1")));
        tokio::time::advance(POLL).await;
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Done);
        assert_eq!(api.claims(), vec!["i1"]);
        assert!(matches!(
            rx.recv().await.unwrap(),
            SchedulerEvent::DropClaimed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalls_without_progress() {
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
        api.set_drop_progress("c1", progress(10, None));

        let mut component = DropProgressComponent::new(target(10), POLL, STALL);
        component.on_start(&mut ctx).await.unwrap();

        tokio::time::advance(STALL - Duration::from_secs(1)).await;
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Pending);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Stalled);
        assert!(api.claims().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watched_out_without_instance_stalls() {
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
        api.set_drop_progress("c1", progress(60, None));

        let mut component = DropProgressComponent::new(target(60), POLL, STALL);
        component.on_start(&mut ctx).await.unwrap();

        for _ in 1..STALL.as_secs() {
            tokio::time::advance(Duration::from_secs(1)).await;
            assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Pending);
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Stalled);
        assert!(api.claims().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_claim_instance_is_claimed() {
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
        api.set_drop_progress("c1", progress(60, None));

        let mut component = DropProgressComponent::new(target(60), POLL, STALL);
        component.on_start(&mut ctx).await.unwrap();
        tokio::time::advance(POLL).await;
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Pending);

        api.set_drop_progress("c1", progress(60, Some("i1")));
        tokio::time::advance(POLL).await;
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Done);
        assert_eq!(api.claims(), vec!["i1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_when_claimed_elsewhere() {
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
        let mut claimed = progress(60, Some("i1"));
        claimed.is_claimed = true;
        api.set_drop_progress("c1", claimed);

        let mut component = DropProgressComponent::new(target(30), POLL, STALL);
        component.on_start(&mut ctx).await.unwrap();
        tokio::time::advance(POLL).await;
        assert_eq!(component.on_tick(&mut ctx).await.unwrap(), TickStatus::Done);
        assert!(api.claims().is_empty());
    }
}
