//! Playback Reconciliation
//!
//! Every tick the host's player is read once, then each follower is pulled
//! toward it. Each follower's target position is the host's position plus
//! the time spent since the host was read, measured after that follower's
//! own state fetch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::playback::PlaybackState;
use crate::user::User;

use super::Session;

/// Followers within this distance of the host are left alone
pub const PROGRESS_TOLERANCE_MS: u64 = 5000;

/// What a follower needs this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Hold,
    Seek { position_ms: u64 },
    Play { uri: String, name: String, position_ms: u64 },
}

/// Summary of one tick, for logging and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Host state could not be read; nothing was done
    pub skipped: bool,
    /// Host has no active device
    pub no_host_device: bool,
    pub paused: usize,
    /// (follower, action) for every follower that reached a decision
    pub decisions: Vec<(String, SyncAction)>,
}

/// Strictly inside the tolerance window
pub fn progress_matches(follower_ms: u64, target_ms: u64) -> bool {
    follower_ms.abs_diff(target_ms) < PROGRESS_TOLERANCE_MS
}

/// Decide how to move `follower` toward `host`, `elapsed_ms` after the host
/// was measured.
pub fn decide(host: &PlaybackState, follower: &PlaybackState, elapsed_ms: u64) -> SyncAction {
    let Some(host_track) = host.track.as_ref() else {
        return SyncAction::Hold;
    };

    let target = host.progress_ms + elapsed_ms;
    let track_matches = follower.track_id() == Some(host_track.id.as_str());

    if !track_matches {
        return SyncAction::Play {
            uri: host_track.uri.clone(),
            name: host_track.name.clone(),
            position_ms: target,
        };
    }

    if !progress_matches(follower.progress_ms, target) {
        return SyncAction::Seek { position_ms: target };
    }

    SyncAction::Hold
}

/// Run one reconciliation pass
pub async fn reconcile(host: &User, followers: &[Arc<User>]) -> TickReport {
    let mut report = TickReport::default();

    let host_state = match host.playback().state().await {
        Ok(state) => state,
        Err(e) => {
            warn!(username = %host.name(), "Host player state error: {}", e);
            report.skipped = true;
            return report;
        }
    };
    trace!(username = %host.name(), state = ?host_state, "Host state");

    if !host_state.has_device {
        report.no_host_device = true;
        let _ = host.send_info("You have no active device to play from...").await;
        return report;
    }

    let start = Instant::now();

    for follower in followers {
        if !host_state.is_playing {
            report.paused += 1;
            if let Err(e) = follower.playback().pause().await {
                warn!(username = %follower.name(), "Error pausing follower: {}", e);
            }
            continue;
        }

        let state = match follower.playback().state().await {
            Ok(state) => state,
            Err(e) => {
                warn!(username = %follower.name(), "Follower player state error: {}", e);
                continue;
            }
        };
        trace!(username = %follower.name(), state = ?state, "Follower state");

        if !state.has_device {
            let _ = host.send_info("You have no active device to play to...").await;
            continue;
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let action = decide(&host_state, &state, elapsed_ms);
        debug!(
            host = %host.name(),
            username = %follower.name(),
            elapsed_ms,
            action = ?action,
            "Sync decision"
        );

        match &action {
            SyncAction::Hold => {}
            SyncAction::Seek { position_ms } => {
                if let Err(e) = follower.playback().seek(*position_ms).await {
                    warn!(username = %follower.name(), "Seek error: {}", e);
                }
            }
            SyncAction::Play { uri, name, position_ms } => {
                match follower.playback().play(uri, *position_ms).await {
                    Ok(()) => {
                        let _ = follower.send_info(format!("Track changed to: {}", name)).await;
                    }
                    Err(e) => warn!(username = %follower.name(), "Play error: {}", e),
                }
            }
        }

        report.decisions.push((follower.name().to_string(), action));
    }

    report
}

/// Tick until `quit` fires
pub(super) async fn run_sync(session: Arc<Session>, period: Duration, mut quit: oneshot::Receiver<()>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(host = %session.host_name(), ?period, "Sync loop started");

    loop {
        tokio::select! {
            biased;
            _ = &mut quit => break,
            _ = ticker.tick() => {
                let followers = session.followers();
                let report = reconcile(session.host(), &followers).await;
                trace!(host = %session.host_name(), report = ?report, "Sync tick");
            }
        }
    }

    debug!(host = %session.host_name(), "Sync loop stopped");
}
