use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geo::Position;

/// Runtime configuration for the decoding and tracking pipeline.
///
/// Every field has a deployment-grade default; a TOML file or the CLI can
/// override any subset. [`Config::validate`] is called once at startup and
/// a failure there is fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP bind address for the ingest socket.
    pub host: String,
    /// UDP bind port for the ingest socket.
    pub port: u16,

    /// Station (radar) latitude, origin of the polar → WGS-84 projection.
    pub station_lat: f64,
    /// Station (radar) longitude.
    pub station_lon: f64,

    /// Statistical (Mahalanobis) association gate, a χ²₂ level.
    pub pda_gate_threshold: f64,
    /// Enable probabilistic data association when several tracks gate.
    pub pda_enabled: bool,
    /// Clutter prior for PDA, in 1/m².
    pub clutter_density: f64,
    /// Base position gate in metres, before dynamic scaling.
    pub max_association_distance: f64,

    /// Associated plots needed to promote Tentative → Confirmed.
    pub track_confirmation_threshold: u32,
    /// Consecutive misses before a Confirmed track starts Coasting.
    pub coasting_threshold: u32,
    /// Consecutive misses before any track is Terminated.
    pub track_termination_threshold: u32,

    /// Below this speed (m/s) the heading is considered undefined.
    pub min_speed_threshold: f64,
    /// Above this speed (m/s) the track quality is penalised.
    pub max_speed_threshold: f64,

    /// Kalman process noise (white-jerk intensity), metres.
    pub process_noise_std: f64,
    /// Kalman measurement noise, metres.
    pub measurement_noise_std: f64,
    /// Extra noise injected on the acceleration block, m/s².
    pub acceleration_noise_std: f64,

    /// Acceleration magnitude, in g, above which a maneuver is declared.
    pub maneuver_threshold: f64,

    /// Weight measurements by sensor type and recency.
    pub sensor_fusion_enabled: bool,
    /// Time constant of the sensor recency decay, seconds.
    pub sensor_time_threshold: f64,

    /// Blend weight of the course score for mature tracks.
    pub course_weight: f64,
    /// Blend weight of the position score for mature tracks.
    pub position_weight: f64,

    /// Depth of the bounded plot queue between ingest and update tasks.
    pub queue_depth: usize,
    /// Socket read timeout, bounding the shutdown latency, milliseconds.
    pub socket_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "0.0.0.0".to_string(),
            port: 8080,
            station_lat: 28.0836,
            station_lon: -80.6081,
            pda_gate_threshold: 15.0,
            pda_enabled: true,
            clutter_density: 1e-7,
            max_association_distance: 10_000.0,
            track_confirmation_threshold: 3,
            coasting_threshold: 8,
            track_termination_threshold: 15,
            min_speed_threshold: 2.0,
            max_speed_threshold: 400.0,
            process_noise_std: 5.0,
            measurement_noise_std: 10.0,
            acceleration_noise_std: 0.5,
            maneuver_threshold: 1.5,
            sensor_fusion_enabled: true,
            sensor_time_threshold: 10.0,
            course_weight: 0.3,
            position_weight: 0.7,
            queue_depth: 100,
            socket_timeout_ms: 500,
        }
    }
}

impl Config {
    /// The station origin as a [`Position`].
    pub fn station(&self) -> Position {
        Position::new(self.station_lat, self.station_lon)
    }

    /// Check the configuration invariants. Any violation is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-90.0..=90.0).contains(&self.station_lat) {
            return Err(ConfigError(format!(
                "station_lat {} outside [-90, 90]",
                self.station_lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.station_lon) {
            return Err(ConfigError(format!(
                "station_lon {} outside [-180, 180]",
                self.station_lon
            )));
        }
        if self.pda_gate_threshold <= 0.0 {
            return Err(ConfigError("pda_gate_threshold must be positive".into()));
        }
        if self.max_association_distance <= 0.0 {
            return Err(ConfigError(
                "max_association_distance must be positive".into(),
            ));
        }
        if self.track_confirmation_threshold == 0 {
            return Err(ConfigError(
                "track_confirmation_threshold must be at least 1".into(),
            ));
        }
        if self.coasting_threshold >= self.track_termination_threshold {
            return Err(ConfigError(format!(
                "coasting_threshold {} must be below track_termination_threshold {}",
                self.coasting_threshold, self.track_termination_threshold
            )));
        }
        if self.min_speed_threshold >= self.max_speed_threshold {
            return Err(ConfigError(format!(
                "min_speed_threshold {} must be below max_speed_threshold {}",
                self.min_speed_threshold, self.max_speed_threshold
            )));
        }
        if self.process_noise_std <= 0.0 || self.measurement_noise_std <= 0.0 {
            return Err(ConfigError("kalman noise parameters must be positive".into()));
        }
        if (self.course_weight + self.position_weight - 1.0).abs() > 1e-6 {
            return Err(ConfigError(format!(
                "course_weight {} + position_weight {} must sum to 1",
                self.course_weight, self.position_weight
            )));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError("queue_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn bad_station_rejected() {
        let cfg = Config {
            station_lat: 91.0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let cfg = Config {
            course_weight: 0.5,
            position_weight: 0.7,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn speed_gate_order_checked() {
        let cfg = Config {
            min_speed_threshold: 500.0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
