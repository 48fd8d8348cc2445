//! Watch session: one attempt at watching a single live stream.
//!
//! A session sets up the page, then is ticked by the scheduler roughly once a
//! second. Each tick checks the two interrupt flags (stream down, preemption
//! requested) and then polls every hosted component in order. The scheduler
//! owns the wait between ticks so it can deliver live events and watchdog
//! signals while the session is idle. Teardown always runs.

mod community_points;
mod component;
mod drop_progress;

pub use community_points::CommunityPointsComponent;
pub use component::{ProgressSnapshot, SessionComponent, SessionContext, TickStatus};
pub use drop_progress::DropProgressComponent;

use std::fmt;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::Result;
use crate::adapter::{BLANK_PAGE, LiveEvent, LiveEventSubscription};
use crate::config::MinerConfig;
use crate::domain::StreamCandidate;

use super::events::{SchedulerEvent, SchedulerEventBroadcaster};

/// How a watch session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A component reported done (drop claimed).
    Completed,
    /// The drop stopped advancing on this stream.
    NoProgress,
    /// A higher-priority campaign became viable.
    Preempted,
    /// The stream went offline mid-session.
    StreamDown,
    /// Navigation or page setup failed before tracking began.
    SetupFailed(String),
    /// A component failed mid-session.
    Failed(String),
    /// The scheduler is shutting down.
    Cancelled,
}

impl SessionOutcome {
    /// Whether the stream should be charged with a failure.
    pub fn is_stream_failure(&self) -> bool {
        matches!(
            self,
            Self::NoProgress | Self::SetupFailed(_) | Self::Failed(_)
        )
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::NoProgress => write!(f, "no watch progress"),
            Self::Preempted => write!(f, "preempted"),
            Self::StreamDown => write!(f, "stream down"),
            Self::SetupFailed(e) => write!(f, "failed to load: {}", e),
            Self::Failed(e) => write!(f, "failed: {}", e),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Mutable state of the running session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// `None` in idle mode.
    pub campaign_id: Option<String>,
    pub drop_id: Option<String>,
    pub viewers: Option<u64>,
    pub stream_down: bool,
    pub preempt_requested: bool,
}

pub struct WatchSession {
    stream: StreamCandidate,
    state: SessionState,
    components: Vec<Box<dyn SessionComponent>>,
    subscription: Option<LiveEventSubscription>,
}

impl WatchSession {
    pub fn new(
        stream: StreamCandidate,
        campaign_id: Option<String>,
        drop_id: Option<String>,
        components: Vec<Box<dyn SessionComponent>>,
    ) -> Self {
        Self {
            stream,
            state: SessionState {
                campaign_id,
                drop_id,
                ..Default::default()
            },
            components,
            subscription: None,
        }
    }

    pub fn stream(&self) -> &StreamCandidate {
        &self.stream
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Prepare the page and start every component.
    ///
    /// Any error here means the stream never started tracking.
    pub async fn setup(
        &mut self,
        ctx: &mut SessionContext<'_>,
        config: &MinerConfig,
    ) -> Result<()> {
        let driver = ctx.driver;
        self.subscription = Some(driver.attach_live_events(&self.stream).await?);
        driver.navigate(&self.stream.url).await?;
        driver.wait_for_load(config.load_timeout()).await?;
        driver.accept_content_gate().await?;
        driver.force_lowest_quality().await?;
        if config.hide_video {
            driver.hide_video().await?;
        }

        self.state.viewers = driver.read_viewer_count().await.unwrap_or_else(|e| {
            debug!(error = %e, "Failed to read viewer count");
            None
        });
        if let Ok(Some(uptime)) = driver.read_uptime().await {
            debug!(url = %self.stream.url, uptime = %uptime, "Stream uptime");
        }

        for component in &mut self.components {
            component.on_start(ctx).await?;
        }

        info!(
            url = %self.stream.url,
            campaign_id = ?self.state.campaign_id,
            viewers = ?self.state.viewers,
            "Watching stream"
        );
        Ok(())
    }

    /// Next live event from the page. Pending forever when no listener is attached.
    pub async fn next_live_event(&mut self) -> Option<LiveEvent> {
        match &mut self.subscription {
            Some(subscription) => subscription.recv().await,
            None => std::future::pending().await,
        }
    }

    pub fn on_live_event(&mut self, event: Option<LiveEvent>) {
        match event {
            Some(LiveEvent::ViewerCount(viewers)) => self.state.viewers = Some(viewers),
            Some(LiveEvent::StreamDown) => {
                info!(url = %self.stream.url, "Stream went offline");
                self.state.stream_down = true;
            }
            None => {
                // Publisher gone; keep ticking without live events.
                debug!(url = %self.stream.url, "Live event listener closed");
                self.subscription = None;
            }
        }
    }

    pub fn request_preemption(&mut self) {
        self.state.preempt_requested = true;
    }

    /// Run one tick. Returns the outcome once the session should end.
    pub async fn tick(&mut self, ctx: &mut SessionContext<'_>) -> Option<SessionOutcome> {
        if self.state.stream_down {
            self.state.stream_down = false;
            if let Err(e) = ctx.driver.navigate(BLANK_PAGE).await {
                warn!(error = %e, "Failed to leave offline stream");
            }
            return Some(SessionOutcome::StreamDown);
        }

        if self.state.preempt_requested {
            self.state.preempt_requested = false;
            info!(url = %self.stream.url, "Session preempted");
            return Some(SessionOutcome::Preempted);
        }

        for component in &mut self.components {
            match component.on_tick(ctx).await {
                Ok(TickStatus::Pending) => {}
                Ok(TickStatus::Done) => {
                    debug!(component = component.name(), "Component done");
                    return Some(SessionOutcome::Completed);
                }
                Ok(TickStatus::Stalled) => return Some(SessionOutcome::NoProgress),
                Err(e) => {
                    warn!(component = component.name(), error = %e, "Session component failed");
                    return Some(SessionOutcome::Failed(e.to_string()));
                }
            }
        }

        self.publish_progress(ctx.events);
        None
    }

    fn publish_progress(&self, events: &SchedulerEventBroadcaster) {
        let snapshot = self.components.iter().find_map(|c| c.progress());
        events.publish(SchedulerEvent::Progress {
            url: self.stream.url.clone(),
            drop_name: snapshot.as_ref().map(|s| s.drop_name.clone()),
            minutes_watched: snapshot.as_ref().map_or(0, |s| s.minutes_watched),
            required_minutes: snapshot.as_ref().map_or(0, |s| s.required_minutes),
            viewers: self.state.viewers,
        });
    }

    /// Detach the live listener and close the progress display.
    pub fn teardown(&mut self, outcome: &SessionOutcome, events: &SchedulerEventBroadcaster) {
        if let Some(subscription) = self.subscription.take() {
            subscription.detach();
        }
        debug!(url = %self.stream.url, outcome = %outcome, "Session ended");
        events.publish(SchedulerEvent::SessionEnded {
            url: self.stream.url.clone(),
            outcome: outcome.to_string(),
            timestamp: Utc::now(),
        });
    }
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("stream", &self.stream.url)
            .field("state", &self.state)
            .field(
                "components",
                &self.components.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{InMemoryDropsApi, InMemoryPageDriver};
    use crate::scheduler::claims::ClaimLedger;
    use async_trait::async_trait;

    struct Scripted(Vec<TickStatus>);

    #[async_trait]
    impl SessionComponent for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn on_tick(&mut self, _ctx: &mut SessionContext<'_>) -> Result<TickStatus> {
            Ok(if self.0.is_empty() {
                TickStatus::Pending
            } else {
                self.0.remove(0)
            })
        }
    }

    fn session(script: Vec<TickStatus>) -> WatchSession {
        WatchSession::new(
            StreamCandidate::for_broadcaster("1", "streamer"),
            Some("c1".to_string()),
            Some("d1".to_string()),
            vec![Box::new(Scripted(script))],
        )
    }

    #[tokio::test]
    async fn test_setup_and_teardown() {
        let api = InMemoryDropsApi::new();
        let driver = InMemoryPageDriver::new();
        driver.set_viewer_count(Some(42));
        let mut claims = ClaimLedger::new();
        let events = SchedulerEventBroadcaster::new();
        let mut rx = events.subscribe();
        let mut ctx = SessionContext {
            api: &api,
            driver: &driver,
            claims: &mut claims,
            events: &events,
        };
        let config = MinerConfig {
            hide_video: true,
            ..Default::default()
        };

        let mut session = session(vec![TickStatus::Pending, TickStatus::Done]);
        session.setup(&mut ctx, &config).await.unwrap();
        assert_eq!(driver.current_url().as_deref(), Some("https://www.twitch.tv/streamer"));
        assert!(driver.is_video_hidden());
        assert!(driver.is_listener_attached());
        assert_eq!(session.state().viewers, Some(42));

        assert_eq!(session.tick(&mut ctx).await, None);
        assert!(matches!(rx.recv().await.unwrap(), SchedulerEvent::Progress { viewers: Some(42), .. }));
        assert_eq!(session.tick(&mut ctx).await, Some(SessionOutcome::Completed));

        session.teardown(&SessionOutcome::Completed, &events);
        assert!(!driver.is_listener_attached());
        assert!(matches!(rx.recv().await.unwrap(), SchedulerEvent::SessionEnded { .. }));
    }

    #[tokio::test]
    async fn test_setup_failure() {
        let api = InMemoryDropsApi::new();
        let driver = InMemoryPageDriver::new();
        driver.fail_load("https://www.twitch.tv/streamer");
        let mut claims = ClaimLedger::new();
        let events = SchedulerEventBroadcaster::new();
        let mut ctx = SessionContext {
            api: &api,
            driver: &driver,
            claims: &mut claims,
            events: &events,
        };

        let mut session = session(Vec::new());
        assert!(session.setup(&mut ctx, &MinerConfig::default()).await.is_err());
        session.teardown(&SessionOutcome::SetupFailed("load".to_string()), &events);
        assert!(!driver.is_listener_attached());
    }

    #[tokio::test]
    async fn test_interrupt_flags() {
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

        let mut session = session(Vec::new());
        session.setup(&mut ctx, &MinerConfig::default()).await.unwrap();

        assert!(driver.emit(LiveEvent::ViewerCount(7)));
        assert!(driver.emit(LiveEvent::StreamDown));
        let event = session.next_live_event().await;
        session.on_live_event(event);
        let event = session.next_live_event().await;
        session.on_live_event(event);
        assert_eq!(session.state().viewers, Some(7));

        assert_eq!(session.tick(&mut ctx).await, Some(SessionOutcome::StreamDown));
        assert!(!session.state().stream_down);
        assert_eq!(driver.current_url().as_deref(), Some(BLANK_PAGE));

        session.request_preemption();
        assert_eq!(session.tick(&mut ctx).await, Some(SessionOutcome::Preempted));
        assert!(!session.state().preempt_requested);
        assert_eq!(session.tick(&mut ctx).await, None);
    }

    #[tokio::test]
    async fn test_stalled_component() {
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

        let mut session = session(vec![TickStatus::Stalled]);
        assert_eq!(session.tick(&mut ctx).await, Some(SessionOutcome::NoProgress));
        assert!(SessionOutcome::NoProgress.is_stream_failure());
        assert!(!SessionOutcome::StreamDown.is_stream_failure());
        assert!(!SessionOutcome::Preempted.is_stream_failure());
    }
}
