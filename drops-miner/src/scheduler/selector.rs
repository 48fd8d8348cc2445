//! Stream selection for campaign and idle mode.
//!
//! Campaign mode lists reward-eligible live streams for the campaign's game,
//! applies the campaign's channel allow-list and drops blacklisted URLs. The
//! API's own ranking is kept, so the best candidate is simply the first.
//!
//! Idle mode prefers a configured broadcaster who is live, then falls back
//! to the first live stream among the games of pending campaigns. Nothing is
//! returned when nobody is live.

use tracing::{debug, warn};

use crate::Result;
use crate::adapter::DropsApi;
use crate::domain::{Campaign, CampaignDetail, StreamCandidate, StreamFilter};

use super::failure_tracker::FailureTracker;

/// Live streams that can advance `campaign`, best first.
pub async fn eligible_streams(
    api: &dyn DropsApi,
    campaign: &Campaign,
    detail: &CampaignDetail,
    failures: &mut FailureTracker,
) -> Result<Vec<StreamCandidate>> {
    let streams = api
        .list_live_streams(&campaign.game_name, StreamFilter::drops_enabled())
        .await?;
    let listed = streams.len();

    let eligible: Vec<StreamCandidate> = streams
        .into_iter()
        .filter(|s| s.is_drops_enabled())
        .filter(|s| detail.allow.permits(&s.broadcaster_id))
        .filter(|s| !failures.is_blacklisted(&s.url))
        .collect();

    debug!(
        campaign_id = %campaign.id,
        game = %campaign.game_name,
        listed,
        eligible = eligible.len(),
        restricted = detail.allow.is_restricted(),
        "Selected eligible streams"
    );

    Ok(eligible)
}

/// Stream to watch while no campaign can be pursued.
///
/// `broadcasters` are preferred logins in order; `pending_games` are game
/// names of pending campaigns in queue order. API failures are logged and the
/// next option is tried.
pub async fn select_idle_stream(
    api: &dyn DropsApi,
    broadcasters: &[String],
    pending_games: &[String],
    failures: &mut FailureTracker,
) -> Option<StreamCandidate> {
    for login in broadcasters {
        match api.is_broadcaster_live(login).await {
            Ok(true) => {
                let candidate = StreamCandidate::for_broadcaster(login.as_str(), login.as_str());
                if failures.is_blacklisted(&candidate.url) {
                    debug!(broadcaster = %login, "Preferred broadcaster is blacklisted");
                    continue;
                }
                debug!(broadcaster = %login, "Idle watching preferred broadcaster");
                return Some(candidate);
            }
            Ok(false) => {}
            Err(e) => warn!(broadcaster = %login, error = %e, "Failed to check broadcaster"),
        }
    }

    for game in pending_games {
        match api.list_live_streams(game, StreamFilter::any()).await {
            Ok(streams) => {
                if let Some(candidate) = streams
                    .into_iter()
                    .find(|s| !failures.is_blacklisted(&s.url))
                {
                    debug!(game = %game, url = %candidate.url, "Idle watching pending game");
                    return Some(candidate);
                }
            }
            Err(e) => warn!(game = %game, error = %e, "Failed to list live streams"),
        }
    }

    None
}
