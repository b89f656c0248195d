/**
 * The track estimator owns the active track set. Every mutation of a
 * track funnels through [`TrackEstimator::process_batch`]; readers only
 * ever see copy-on-read [`TrackSummary`] snapshots.
 *
 * For each plot of a batch (sorted by timestamp) the estimator gates the
 * active tracks, scores the candidates, folds the winning association
 * into the Kalman filter and the course model, and finally applies the
 * lifecycle rules and one miss to every track the batch left untouched.
 */
use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::geo::Position;
use crate::plot::Plot;
use crate::track::kalman::KalmanState;
use crate::track::{associate, lifecycle, Maneuver, Track, TrackSummary};

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct EstimatorStats {
    pub plots_processed: u64,
    pub tracks_initiated: u64,
    pub tracks_confirmed: u64,
    pub tracks_terminated: u64,
    pub associations: u64,
    pub filter_divergences: u64,
    pub maneuver_turns: u64,
    pub maneuver_accelerations: u64,
}

struct Candidate {
    index: usize,
    score: f64,
    mahalanobis2: f64,
}

pub struct TrackEstimator {
    cfg: Config,
    station: Position,
    tracks: Vec<Track>,
    archive: VecDeque<Track>,
    next_track_id: u64,
    pub stats: EstimatorStats,
}

impl TrackEstimator {
    pub fn new(cfg: Config) -> Self {
        let station = cfg.station();
        TrackEstimator {
            cfg,
            station,
            tracks: Vec::new(),
            archive: VecDeque::new(),
            next_track_id: 1,
            stats: EstimatorStats::default(),
        }
    }

    pub fn active_tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn archived_tracks(&self) -> &VecDeque<Track> {
        &self.archive
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Copy-on-read snapshot of the active set, ordered by track id.
    pub fn summaries(&self) -> Vec<TrackSummary> {
        let mut summaries: Vec<TrackSummary> = self
            .tracks
            .iter()
            .map(|track| track.summary(&self.station))
            .collect();
        summaries.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        summaries
    }

    /// Apply one batch of plots atomically. An empty batch models a scan
    /// with no detections: every track takes a miss.
    pub fn process_batch(&mut self, plots: &[Plot]) {
        let mut order: Vec<&Plot> = plots.iter().filter(|p| p.has_position()).collect();
        order.sort_by_key(|p| p.timestamp);

        let mut updated: HashSet<u64> = HashSet::new();
        for plot in order {
            let Some((x, y)) = plot.cartesian(&self.station) else {
                continue;
            };
            self.stats.plots_processed += 1;

            match self.select_track(plot, x, y) {
                Some(index) => {
                    Self::update_track(
                        &self.cfg,
                        &mut self.stats,
                        &mut self.tracks[index],
                        plot,
                        x,
                        y,
                    );
                    self.stats.associations += 1;
                    updated.insert(self.tracks[index].track_id);
                }
                None => {
                    let track_id = self.spawn_track(plot, x, y);
                    updated.insert(track_id);
                }
            }
        }

        for track in &mut self.tracks {
            if !updated.contains(&track.track_id) {
                track.consecutive_misses += 1;
            }
        }

        lifecycle::apply(&mut self.tracks, &mut self.archive, &self.cfg, &mut self.stats);
    }

    /// Gate and score the active tracks against one plot.
    fn select_track(&self, plot: &Plot, x: f64, y: f64) -> Option<usize> {
        let cfg = &self.cfg;
        let measurement_variance = cfg.measurement_noise_std.powi(2);

        let mut candidates: Vec<Candidate> = Vec::new();
        for (index, track) in self.tracks.iter().enumerate() {
            let dt = seconds_between(track.last_update, plot.timestamp).max(0.0);
            let (x_pred, p_pred) =
                track
                    .kalman
                    .predicted(dt, cfg.process_noise_std, cfg.acceleration_noise_std);
            let d_pos = ((x - x_pred[0]).powi(2) + (y - x_pred[1]).powi(2)).sqrt();
            let Some(d_m2) =
                KalmanState::mahalanobis2(&x_pred, &p_pred, x, y, measurement_variance)
            else {
                continue;
            };
            let gate = associate::dynamic_gate(track, cfg);
            if d_m2 > cfg.pda_gate_threshold || d_pos > gate {
                continue;
            }

            let bearing = track
                .position_history
                .back()
                .map(|&(px, py, _)| ((x - px).atan2(y - py).to_degrees() + 360.0) % 360.0)
                .unwrap_or(0.0);
            let s_pos = associate::position_score(d_pos, gate);
            let s_course = associate::course_score(track, bearing);
            let score = associate::combined_score(track, s_pos, s_course, cfg);
            candidates.push(Candidate {
                index,
                score,
                mahalanobis2: d_m2,
            });
        }

        if candidates.is_empty() {
            return None;
        }

        // PDA arbitration when several tracks sit inside the statistical
        // gate; fall through to the score blend when no probability is
        // decisive.
        if cfg.pda_enabled && candidates.len() > 1 {
            let distances: Vec<f64> = candidates.iter().map(|c| c.mahalanobis2).collect();
            let probabilities = associate::pda_probabilities(&distances, cfg);
            if let Some((best, probability)) = probabilities
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
            {
                if *probability > 0.3 {
                    debug!(
                        "PDA assigned plot {} with probability {probability:.3}",
                        plot.plot_id
                    );
                    return Some(candidates[best].index);
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.mahalanobis2.total_cmp(&b.mahalanobis2))
                .then(
                    self.tracks[a.index]
                        .created_at
                        .cmp(&self.tracks[b.index].created_at),
                )
        });
        let best = &candidates[0];
        (best.score >= associate::score_threshold(&self.tracks[best.index])).then_some(best.index)
    }

    fn update_track(
        cfg: &Config,
        stats: &mut EstimatorStats,
        track: &mut Track,
        plot: &Plot,
        x: f64,
        y: f64,
    ) {
        let dt = seconds_between(track.last_update, plot.timestamp).max(0.0);

        let weight = if cfg.sensor_fusion_enabled {
            track.sensors.weight(
                plot.sensor_type,
                plot.quality,
                plot.timestamp,
                cfg.sensor_time_threshold,
            )
        } else {
            1.0
        };
        let measurement_variance = cfg.measurement_noise_std.powi(2) / weight;

        if track
            .kalman
            .step(
                dt.max(1e-3),
                x,
                y,
                measurement_variance,
                cfg.process_noise_std,
                cfg.acceleration_noise_std,
            )
            .is_err()
        {
            stats.filter_divergences += 1;
            warn!("track {} filter update diverged, keeping prediction", track.track_id);
        }

        // course observation and the finite-difference cross-check
        let mut finite_difference = None;
        if let Some(&(px, py, pt)) = track.position_history.back() {
            let ddt = seconds_between(pt, plot.timestamp);
            if ddt > 0.0 {
                let (dx, dy) = (x - px, y - py);
                let speed = (dx * dx + dy * dy).sqrt() / ddt;
                let heading = (dx.atan2(dy).to_degrees() + 360.0) % 360.0;
                track.course.observe(heading, speed, ddt);
                finite_difference = Some((speed, heading));
            }
        }

        let (vx, vy) = track.kalman.velocity();
        let mut speed = (vx * vx + vy * vy).sqrt();
        let mut heading = (vx.atan2(vy).to_degrees() + 360.0) % 360.0;
        if let Some((fd_speed, fd_heading)) = finite_difference {
            // a filter drifting during long coasts loses to the raw
            // two-point estimate
            if (speed - fd_speed).abs() > 50.0 {
                speed = fd_speed;
                heading = fd_heading;
            }
        }
        track.speed_ms = speed;
        track.heading_deg = (speed >= cfg.min_speed_threshold).then_some(heading);

        let (ax, ay) = track.kalman.acceleration();
        let magnitude = (ax * ax + ay * ay).sqrt();
        let maneuver = if magnitude > cfg.maneuver_threshold * 9.81 {
            if ax.abs() <= ay.abs() {
                Maneuver::Turn
            } else {
                Maneuver::Acceleration
            }
        } else {
            Maneuver::Straight
        };
        if maneuver != track.maneuver {
            match maneuver {
                Maneuver::Turn => stats.maneuver_turns += 1,
                Maneuver::Acceleration => stats.maneuver_accelerations += 1,
                Maneuver::Straight => {}
            }
        }
        track.maneuver = maneuver;

        track.push_position(x, y, plot.timestamp);
        if let Some(azimuth) = plot.azimuth_deg {
            track.push_azimuth(azimuth, plot.timestamp);
        }

        track.plot_count += 1;
        track.consecutive_misses = 0;
        track.last_update = plot.timestamp;
        if plot.altitude_ft.is_some() {
            track.altitude_ft = plot.altitude_ft;
        }
        if plot.callsign.is_some() {
            track.callsign = plot.callsign.clone();
        }
        if plot.mode_3a.is_some() {
            track.mode_3a = plot.mode_3a.clone();
        }
        if plot.aircraft_address.is_some() {
            track.aircraft_address = plot.aircraft_address.clone();
        }
        if plot.track_number.is_some() {
            track.original_track_id = plot.track_number;
        }
        track.sensors.record(plot.sensor_type, plot.timestamp);

        lifecycle::update_quality(track, cfg);
    }

    fn spawn_track(&mut self, plot: &Plot, x: f64, y: f64) -> u64 {
        let track_id = self.next_track_id;
        self.next_track_id += 1;
        self.stats.tracks_initiated += 1;
        debug!("new tentative track {track_id} at ({x:.0}, {y:.0})");
        self.tracks.push(Track::new(track_id, x, y, plot));
        track_id
    }
}

fn seconds_between(from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo;
    use crate::track::TrackState;
    use chrono::{Duration, TimeZone, Utc};

    fn base_time() -> chrono::DateTime<chrono::Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    /// 100 m/s eastbound plots, one per second, starting at (28.1, -80.7).
    fn eastbound_plots(cfg: &Config, count: usize) -> Vec<Plot> {
        let station = cfg.station();
        let origin = Position::new(28.1, -80.7);
        let (x0, y0) = geo::wgs84_to_cartesian(&station, &origin);
        (0..count)
            .map(|i| {
                let position =
                    geo::cartesian_to_wgs84(&station, x0 + 100.0 * i as f64, y0);
                Plot {
                    timestamp: base_time() + Duration::seconds(i as i64),
                    latitude: Some(position.latitude),
                    longitude: Some(position.longitude),
                    ..Plot::default()
                }
            })
            .collect()
    }

    #[test]
    fn straight_line_aircraft_confirms_one_track() {
        let cfg = Config::default();
        let mut estimator = TrackEstimator::new(cfg.clone());
        for plot in eastbound_plots(&cfg, 60) {
            estimator.process_batch(&[plot]);
        }

        assert_eq!(estimator.active_tracks().len(), 1);
        let track = &estimator.active_tracks()[0];
        assert_eq!(track.state, TrackState::Confirmed);
        assert_eq!(track.plot_count, 60);
        assert!(
            track.speed_ms > 90.0 && track.speed_ms < 110.0,
            "speed was {}",
            track.speed_ms
        );
        let heading = track.heading_deg.expect("heading defined at 100 m/s");
        assert!(heading > 85.0 && heading < 95.0, "heading was {heading}");
    }

    #[test]
    fn coasting_then_termination() {
        let cfg = Config::default();
        let mut estimator = TrackEstimator::new(cfg.clone());
        for plot in eastbound_plots(&cfg, 20) {
            estimator.process_batch(&[plot]);
        }
        assert_eq!(estimator.active_tracks()[0].state, TrackState::Confirmed);

        for scan in 1..=cfg.track_termination_threshold {
            estimator.process_batch(&[]);
            if scan >= cfg.coasting_threshold && scan < cfg.track_termination_threshold {
                assert_eq!(estimator.active_tracks()[0].state, TrackState::Coasting);
            }
            for track in estimator.active_tracks() {
                assert!(track.consecutive_misses <= cfg.track_termination_threshold + 1);
                assert_ne!(track.state, TrackState::Terminated);
            }
        }

        assert!(estimator.active_tracks().is_empty());
        assert_eq!(estimator.archived_tracks().len(), 1);
        assert_eq!(
            estimator.archived_tracks()[0].state,
            TrackState::Terminated
        );
    }

    #[test]
    fn association_is_deterministic() {
        let cfg = Config::default();
        let plots = eastbound_plots(&cfg, 10);

        let mut first = TrackEstimator::new(cfg.clone());
        first.process_batch(&plots);
        let mut second = TrackEstimator::new(cfg.clone());
        second.process_batch(&plots);

        let ids_first: Vec<u64> = first.active_tracks().iter().map(|t| t.track_id).collect();
        let ids_second: Vec<u64> = second.active_tracks().iter().map(|t| t.track_id).collect();
        assert_eq!(ids_first, ids_second);
    }

    #[test]
    fn distant_targets_get_separate_tracks() {
        let cfg = Config::default();
        let station = cfg.station();
        let mut estimator = TrackEstimator::new(cfg.clone());

        for i in 0..10i64 {
            let near = geo::cartesian_to_wgs84(&station, 1000.0 + 100.0 * i as f64, 0.0);
            let far = geo::cartesian_to_wgs84(&station, -60_000.0, 80_000.0);
            let batch = vec![
                Plot {
                    timestamp: base_time() + Duration::seconds(i),
                    latitude: Some(near.latitude),
                    longitude: Some(near.longitude),
                    ..Plot::default()
                },
                Plot {
                    timestamp: base_time() + Duration::seconds(i),
                    latitude: Some(far.latitude),
                    longitude: Some(far.longitude),
                    ..Plot::default()
                },
            ];
            estimator.process_batch(&batch);
        }

        assert_eq!(estimator.active_tracks().len(), 2);
    }

    #[test]
    fn covariance_stays_psd_through_updates() {
        let cfg = Config::default();
        let mut estimator = TrackEstimator::new(cfg.clone());
        for plot in eastbound_plots(&cfg, 30) {
            estimator.process_batch(&[plot]);
            for track in estimator.active_tracks() {
                let p = &track.kalman.p;
                for eigenvalue in p.symmetric_eigenvalues().iter() {
                    assert!(*eigenvalue >= -1e-9);
                }
            }
        }
    }

    #[test]
    fn summaries_expose_wgs84_positions() {
        let cfg = Config::default();
        let mut estimator = TrackEstimator::new(cfg.clone());
        for plot in eastbound_plots(&cfg, 10) {
            estimator.process_batch(&[plot]);
        }
        let summaries = estimator.summaries();
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert!((summary.latitude - 28.1).abs() < 0.05);
        assert!((summary.longitude + 80.7).abs() < 0.05);
        assert!(summary.speed_ms > 50.0);
    }
}
