/**
 * Track lifecycle rules, applied once after every batch, in order:
 *
 *  1. Tentative with enough plots → Confirmed.
 *  2. Confirmed with enough misses → Coasting.
 *  3. Enough misses → Terminated, moved to the archive.
 *  4. Tentative that never confirmed and keeps missing → Terminated.
 */
use std::collections::VecDeque;

use tracing::{debug, info};

use crate::config::Config;
use crate::track::estimator::EstimatorStats;
use crate::track::{Track, TrackState};

/// Terminated tracks retained for inspection.
pub(crate) const ARCHIVE_CAP: usize = 256;

/// Misses after which an unconfirmed Tentative track is abandoned.
const TENTATIVE_MISS_LIMIT: u32 = 7;

pub(crate) fn apply(
    tracks: &mut Vec<Track>,
    archive: &mut VecDeque<Track>,
    cfg: &Config,
    stats: &mut EstimatorStats,
) {
    for track in tracks.iter_mut() {
        if track.state == TrackState::Tentative
            && track.plot_count >= cfg.track_confirmation_threshold
        {
            track.state = TrackState::Confirmed;
            stats.tracks_confirmed += 1;
            info!("track {} confirmed after {} plots", track.track_id, track.plot_count);
        }
        if track.state == TrackState::Confirmed
            && track.consecutive_misses >= cfg.coasting_threshold
        {
            track.state = TrackState::Coasting;
            debug!("track {} coasting", track.track_id);
        }
    }

    let mut index = 0;
    while index < tracks.len() {
        let track = &tracks[index];
        let expired = track.consecutive_misses >= cfg.track_termination_threshold;
        let stillborn = track.state == TrackState::Tentative
            && track.plot_count < cfg.track_confirmation_threshold
            && track.consecutive_misses >= TENTATIVE_MISS_LIMIT;
        if expired || stillborn {
            let mut track = tracks.remove(index);
            track.state = TrackState::Terminated;
            stats.tracks_terminated += 1;
            info!(
                "track {} terminated after {} misses",
                track.track_id, track.consecutive_misses
            );
            archive.push_back(track);
            while archive.len() > ARCHIVE_CAP {
                archive.pop_front();
            }
        } else {
            index += 1;
        }
    }
}

/// Quality score refreshed on every association:
/// `min(1, n/10) · max(0, 1 − misses/10) · speed_plausibility`, floored
/// at 0.1.
pub(crate) fn update_quality(track: &mut Track, cfg: &Config) {
    let plot_quality = (track.plot_count as f64 / 10.0).min(1.0);
    let consistency = (1.0 - track.consecutive_misses as f64 / 10.0).max(0.0);
    let speed_plausibility = if track.speed_ms > cfg.max_speed_threshold {
        0.5
    } else if track.speed_ms < cfg.min_speed_threshold && track.plot_count > 3 {
        0.7
    } else {
        1.0
    };
    track.quality_score = (plot_quality * consistency * speed_plausibility).max(0.1);
}
