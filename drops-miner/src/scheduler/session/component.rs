//! Pluggable progress observers hosted by a watch session.

use async_trait::async_trait;

use crate::Result;
use crate::adapter::{DropsApi, PageDriver};
use crate::scheduler::claims::ClaimLedger;
use crate::scheduler::events::SchedulerEventBroadcaster;

/// What a component reports after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// Keep watching.
    Pending,
    /// The component's goal is reached; end the session successfully.
    Done,
    /// No progress for too long; end the session without success.
    Stalled,
}

/// Progress snapshot for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub drop_name: String,
    pub minutes_watched: u32,
    pub required_minutes: u32,
}

/// Collaborators a component may use during a tick.
pub struct SessionContext<'a> {
    pub api: &'a dyn DropsApi,
    pub driver: &'a dyn PageDriver,
    pub claims: &'a mut ClaimLedger,
    pub events: &'a SchedulerEventBroadcaster,
}

/// A progress observer polled once per session tick.
#[async_trait]
pub trait SessionComponent: Send {
    fn name(&self) -> &'static str;

    /// Called once after the page is set up, before the first tick.
    async fn on_start(&mut self, _ctx: &mut SessionContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &mut SessionContext<'_>) -> Result<TickStatus>;

    fn progress(&self) -> Option<ProgressSnapshot> {
        None
    }
}
