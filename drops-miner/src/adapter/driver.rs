//! Page driver interface and live event plumbing.
//!
//! The driver renders the channel page; the scheduler only navigates it,
//! runs a handful of page actions and listens for live events.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::domain::StreamCandidate;

/// URL of the neutral page shown between sessions.
pub const BLANK_PAGE: &str = "about:blank";

/// Default capacity of a live event subscription.
pub const DEFAULT_LIVE_EVENT_CAPACITY: usize = 64;

/// Events pushed by the page while a stream is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEvent {
    /// Current viewer count of the broadcast.
    ViewerCount(u64),
    /// The broadcast went offline.
    StreamDown,
}

/// Page automation consumed by the watch session.
#[async_trait]
pub trait PageDriver: Send + Sync + 'static {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait for the current page to finish loading; fails after `timeout`.
    async fn wait_for_load(&self, timeout: Duration) -> Result<()>;

    /// Start delivering live events for `stream`.
    async fn attach_live_events(&self, stream: &StreamCandidate) -> Result<LiveEventSubscription>;

    /// Click through a mature-content gate if one is shown.
    async fn accept_content_gate(&self) -> Result<()>;

    async fn force_lowest_quality(&self) -> Result<()>;

    async fn hide_video(&self) -> Result<()>;

    async fn read_viewer_count(&self) -> Result<Option<u64>>;

    async fn read_uptime(&self) -> Result<Option<String>>;

    /// Claim the channel-points bonus if one is offered. Returns whether a claim happened.
    async fn claim_bonus_points(&self) -> Result<bool>;
}

/// Receiving side of a live event listener.
///
/// Dropping or [`detach`](Self::detach)ing the subscription tells the
/// publisher to stop.
#[derive(Debug)]
pub struct LiveEventSubscription {
    events: mpsc::Receiver<LiveEvent>,
    token: CancellationToken,
}

impl LiveEventSubscription {
    /// Create a connected publisher/subscription pair.
    pub fn channel(capacity: usize) -> (LiveEventPublisher, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let token = CancellationToken::new();
        let publisher = LiveEventPublisher {
            sender: tx,
            token: token.clone(),
        };
        (publisher, Self { events: rx, token })
    }

    /// Receive the next event. Returns `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    pub fn detach(&self) {
        self.token.cancel();
    }

    pub fn is_detached(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for LiveEventSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Sending side of a live event listener, held by the driver.
#[derive(Debug, Clone)]
pub struct LiveEventPublisher {
    sender: mpsc::Sender<LiveEvent>,
    token: CancellationToken,
}

impl LiveEventPublisher {
    /// Deliver an event. Returns `false` once the listener has been detached.
    pub fn publish(&self, event: LiveEvent) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.sender.try_send(event).is_ok()
    }

    pub fn is_detached(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the listener is detached.
    pub async fn detached(&self) {
        self.token.cancelled().await
    }
}
