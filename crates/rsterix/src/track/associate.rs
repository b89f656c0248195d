/**
 * Plot-to-track association scoring.
 *
 * A track becomes a candidate for a plot when it passes both gates: the
 * statistical (Mahalanobis) gate on the innovation and a dynamic
 * Euclidean gate that widens with speed and coasting and narrows with
 * quality. Candidates are then ranked by a blend of position and course
 * scores; when several tracks pass the statistical gate, probabilistic
 * data association can arbitrate instead.
 */
use crate::config::Config;
use crate::track::course::normalize_heading_diff;
use crate::track::{Track, TrackState};

/// Hard ceiling on the dynamic gate, metres.
const GATE_CEILING_M: f64 = 15_000.0;

/// `base · (1 + min(speed/50, 5)) · (2 if coasting) / max(quality, 0.2)`,
/// capped at 15 km.
pub(crate) fn dynamic_gate(track: &Track, cfg: &Config) -> f64 {
    let speed_factor = 1.0 + (track.speed_ms / 50.0).min(5.0);
    let coasting_factor = if track.state == TrackState::Coasting {
        2.0
    } else {
        1.0
    };
    (cfg.max_association_distance * speed_factor * coasting_factor
        / track.quality_score.max(0.2))
    .min(GATE_CEILING_M)
}

pub(crate) fn position_score(d_pos: f64, gate: f64) -> f64 {
    (1.0 - d_pos / gate.max(1e-9)).clamp(0.0, 1.0)
}

/// Angular match between the bearing observed from the track's last known
/// position and the course the mixture predicts. Tracks with a highly
/// consistent course earn a 1.2× bonus.
pub(crate) fn course_score(track: &Track, observed_bearing_deg: f64) -> f64 {
    let prediction = track
        .course
        .predict(track.heading_deg.unwrap_or(observed_bearing_deg), track.speed_ms);
    let delta = normalize_heading_diff(observed_bearing_deg - prediction.heading_deg).abs();
    let tolerance = track.course.tolerance_deg();
    let mut score = if delta <= tolerance {
        (-delta * delta / (2.0 * tolerance * tolerance)).exp()
    } else {
        0.1
    };
    if track.course.circular_variance() < 0.1 {
        score *= 1.2;
    }
    score
}

/// Blend the two scores. Once the course history matures the blend flips
/// to let the course dominate.
pub(crate) fn combined_score(track: &Track, s_pos: f64, s_course: f64, cfg: &Config) -> f64 {
    let (w_pos, w_course) = if track.course.history_len() >= 3 {
        (cfg.course_weight, cfg.position_weight)
    } else {
        (cfg.position_weight, cfg.course_weight)
    };
    w_pos * s_pos + w_course * s_course
}

/// Acceptance threshold: mature, high-quality tracks demand a better
/// match before absorbing a plot.
pub(crate) fn score_threshold(track: &Track) -> f64 {
    if track.course.history_len() >= 3 && track.quality_score > 0.7 {
        0.4
    } else {
        0.2
    }
}

/// Association probabilities `πᵢ ∝ exp(−½ d_Mᵢ)`, normalised against the
/// clutter prior integrated over the innovation gate area.
pub(crate) fn pda_probabilities(mahalanobis2: &[f64], cfg: &Config) -> Vec<f64> {
    let likelihoods: Vec<f64> = mahalanobis2.iter().map(|d2| (-0.5 * d2).exp()).collect();
    let gate_area = std::f64::consts::PI * cfg.measurement_noise_std.powi(2);
    let denominator =
        likelihoods.iter().sum::<f64>() + cfg.clutter_density * gate_area;
    if denominator <= 0.0 {
        return vec![0.0; mahalanobis2.len()];
    }
    likelihoods.iter().map(|l| l / denominator).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::Plot;

    fn track_at(x: f64, y: f64) -> Track {
        Track::new(1, x, y, &Plot::default())
    }

    #[test]
    fn gate_widens_with_speed() {
        let cfg = Config::default();
        let slow = track_at(0.0, 0.0);
        let mut fast = track_at(0.0, 0.0);
        fast.speed_ms = 250.0;
        assert!(dynamic_gate(&fast, &cfg) > dynamic_gate(&slow, &cfg));
    }

    #[test]
    fn gate_doubles_when_coasting() {
        let cfg = Config {
            max_association_distance: 1000.0,
            ..Config::default()
        };
        let mut track = track_at(0.0, 0.0);
        track.quality_score = 1.0;
        let normal = dynamic_gate(&track, &cfg);
        track.state = TrackState::Coasting;
        assert_eq!(dynamic_gate(&track, &cfg), 2.0 * normal);
    }

    #[test]
    fn gate_is_capped() {
        let cfg = Config::default();
        let mut track = track_at(0.0, 0.0);
        track.speed_ms = 1000.0;
        track.quality_score = 0.1;
        track.state = TrackState::Coasting;
        assert_eq!(dynamic_gate(&track, &cfg), 15_000.0);
    }

    #[test]
    fn position_score_clamps() {
        assert_eq!(position_score(0.0, 1000.0), 1.0);
        assert_eq!(position_score(500.0, 1000.0), 0.5);
        assert_eq!(position_score(2000.0, 1000.0), 0.0);
    }

    #[test]
    fn consistent_course_earns_bonus() {
        let mut track = track_at(0.0, 0.0);
        for _ in 0..6 {
            track.course.observe(90.0, 100.0, 1.0);
        }
        track.heading_deg = Some(90.0);
        track.speed_ms = 100.0;
        let aligned = course_score(&track, 90.0);
        assert!(aligned > 1.0, "bonus should push the score past 1, got {aligned}");
        let opposed = course_score(&track, 270.0);
        assert!(opposed < aligned);
    }

    #[test]
    fn blend_flips_when_course_matures() {
        let cfg = Config::default();
        let mut track = track_at(0.0, 0.0);
        // immature: position dominates
        assert_eq!(combined_score(&track, 1.0, 0.0, &cfg), 0.7);
        for _ in 0..3 {
            track.course.observe(90.0, 100.0, 1.0);
        }
        // mature: course dominates
        assert_eq!(combined_score(&track, 1.0, 0.0, &cfg), 0.3);
    }

    #[test]
    fn mature_quality_tracks_demand_more() {
        let mut track = track_at(0.0, 0.0);
        assert_eq!(score_threshold(&track), 0.2);
        for _ in 0..3 {
            track.course.observe(90.0, 100.0, 1.0);
        }
        track.quality_score = 0.8;
        assert_eq!(score_threshold(&track), 0.4);
    }

    #[test]
    fn pda_prefers_the_closer_innovation() {
        let cfg = Config::default();
        let probabilities = pda_probabilities(&[0.5, 8.0], &cfg);
        assert!(probabilities[0] > 0.3);
        assert!(probabilities[1] < probabilities[0]);
        assert!(probabilities.iter().sum::<f64>() <= 1.0 + 1e-12);
    }
}
