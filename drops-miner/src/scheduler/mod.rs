//! Campaign scheduling.
//!
//! The scheduler is responsible for:
//! - Keeping a priority-ordered queue of pending campaigns
//! - Refreshing campaigns periodically through the watchdog task
//! - Selecting streams and running one watch session at a time
//! - Counting stream failures and blacklisting bad streams for a while
//! - Preempting the running session when a higher-priority campaign appears
//!
//! # Ownership
//!
//! The watchdog only sends messages. The `Scheduler` is the single owner and
//! mutator of the queue, campaign map, blacklist, failure counters and claim
//! ledger.

mod claims;
mod events;
mod failure_tracker;
mod queue;
mod selector;
mod service;
pub mod session;
mod watchdog;

pub use claims::ClaimLedger;
pub use events::{SchedulerEvent, SchedulerEventBroadcaster};
pub use failure_tracker::{
    DEFAULT_BLACKLIST_TIMEOUT, DEFAULT_FAILURE_THRESHOLD, FailureTracker, FailureTrackerConfig,
};
pub use queue::{CampaignOrdering, PendingQueue};
pub use selector::{eligible_streams, select_idle_stream};
pub use service::{ATTEMPT_COOLDOWN, CampaignOutcome, SESSION_TICK_INTERVAL, Scheduler};
pub use session::{SessionOutcome, WatchSession};
pub use watchdog::{CampaignFilter, WATCHDOG_CHANNEL_CAPACITY, Watchdog, WatchdogMessage};
