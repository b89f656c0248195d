pub mod associate;
pub mod course;
pub mod estimator;
pub mod kalman;
pub mod lifecycle;

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{self, Position};
use crate::plot::{Plot, SensorType};
use course::CourseModel;
use kalman::KalmanState;

pub use estimator::{EstimatorStats, TrackEstimator};

/// Lifecycle state of a track.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    #[default]
    Tentative,
    Confirmed,
    Coasting,
    Terminated,
}

/// Coarse classification of the tracked target, driving the CoT type.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default)]
pub enum TrackType {
    #[default]
    Aircraft,
    Helicopter,
    Vessel,
    Vehicle,
    Person,
    Unknown,
}

/// Maneuver regime derived from the estimated acceleration.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default)]
#[serde(rename_all = "lowercase")]
pub enum Maneuver {
    #[default]
    Straight,
    Turn,
    Acceleration,
}

pub const POSITION_HISTORY_CAP: usize = 50;
pub const AZIMUTH_HISTORY_CAP: usize = 50;

/// Which sensor families have contributed to a track, and when each was
/// last seen. The combined weight divides the Kalman measurement noise.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SensorContributions {
    last_seen: BTreeMap<SensorType, DateTime<Utc>>,
}

impl SensorContributions {
    pub fn record(&mut self, sensor: SensorType, at: DateTime<Utc>) {
        self.last_seen.insert(sensor, at);
    }

    /// Sensor families that have ever contributed.
    pub fn types(&self) -> Vec<SensorType> {
        self.last_seen.keys().copied().collect()
    }

    /// Combined weight `quality · type_weight · exp(−Δt/τ)`, where Δt is
    /// the age of the last plot of this sensor family on the track.
    pub fn weight(
        &self,
        sensor: SensorType,
        quality: f64,
        now: DateTime<Utc>,
        time_threshold_s: f64,
    ) -> f64 {
        let decay = match self.last_seen.get(&sensor) {
            Some(last) => {
                let age = (now - *last).num_milliseconds() as f64 / 1000.0;
                (-age.max(0.0) / time_threshold_s.max(1e-6)).exp()
            }
            None => 1.0,
        };
        (quality * sensor.weight() * decay).clamp(1e-3, 1.0)
    }
}

/// A time-evolving estimate of a single target. The estimator owns every
/// track exclusively; nothing outside the update task mutates one.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: u64,
    /// Track number carried by the source (I048/161 and friends).
    pub original_track_id: Option<u16>,
    pub state: TrackState,
    pub track_type: TrackType,

    pub(crate) kalman: KalmanState,
    pub speed_ms: f64,
    /// Undefined (None) below the minimum speed threshold.
    pub heading_deg: Option<f64>,
    pub altitude_ft: Option<f64>,

    pub position_history: VecDeque<(f64, f64, DateTime<Utc>)>,
    pub azimuth_history: VecDeque<(f64, DateTime<Utc>)>,
    pub course: CourseModel,
    pub maneuver: Maneuver,

    pub plot_count: u32,
    pub consecutive_misses: u32,
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,

    pub callsign: Option<String>,
    pub mode_3a: Option<String>,
    pub aircraft_address: Option<String>,
    pub sensors: SensorContributions,
}

impl Track {
    pub(crate) fn new(track_id: u64, x: f64, y: f64, plot: &Plot) -> Self {
        let mut sensors = SensorContributions::default();
        sensors.record(plot.sensor_type, plot.timestamp);
        let mut position_history = VecDeque::with_capacity(POSITION_HISTORY_CAP);
        position_history.push_back((x, y, plot.timestamp));
        let mut azimuth_history = VecDeque::with_capacity(AZIMUTH_HISTORY_CAP);
        if let Some(azimuth) = plot.azimuth_deg {
            azimuth_history.push_back((azimuth, plot.timestamp));
        }

        Track {
            track_id,
            original_track_id: plot.track_number,
            state: TrackState::Tentative,
            track_type: TrackType::Aircraft,
            kalman: KalmanState::new(x, y),
            speed_ms: 0.0,
            heading_deg: None,
            altitude_ft: plot.altitude_ft,
            position_history,
            azimuth_history,
            course: CourseModel::default(),
            maneuver: Maneuver::Straight,
            plot_count: 1,
            consecutive_misses: 0,
            quality_score: 0.1,
            created_at: plot.timestamp,
            last_update: plot.timestamp,
            callsign: plot.callsign.clone(),
            mode_3a: plot.mode_3a.clone(),
            aircraft_address: plot.aircraft_address.clone(),
            sensors,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        self.kalman.position()
    }

    pub fn velocity(&self) -> (f64, f64) {
        self.kalman.velocity()
    }

    pub fn acceleration(&self) -> (f64, f64) {
        self.kalman.acceleration()
    }

    pub(crate) fn push_position(&mut self, x: f64, y: f64, at: DateTime<Utc>) {
        self.position_history.push_back((x, y, at));
        while self.position_history.len() > POSITION_HISTORY_CAP {
            self.position_history.pop_front();
        }
    }

    pub(crate) fn push_azimuth(&mut self, azimuth_deg: f64, at: DateTime<Utc>) {
        self.azimuth_history.push_back((azimuth_deg, at));
        while self.azimuth_history.len() > AZIMUTH_HISTORY_CAP {
            self.azimuth_history.pop_front();
        }
    }

    /// The copy-on-read view published to snapshot readers.
    pub fn summary(&self, station: &Position) -> TrackSummary {
        let (x, y) = self.position();
        let position = geo::cartesian_to_wgs84(station, x, y);
        TrackSummary {
            track_id: format!("track_{:06}", self.track_id),
            state: self.state,
            track_type: self.track_type,
            latitude: position.latitude,
            longitude: position.longitude,
            altitude_ft: self.altitude_ft,
            speed_ms: self.speed_ms,
            heading_deg: self.heading_deg,
            plot_count: self.plot_count,
            quality_score: self.quality_score,
            callsign: self.callsign.clone(),
            aircraft_address: self.aircraft_address.clone(),
            mode_3a: self.mode_3a.clone(),
            created_at: self.created_at,
            last_update: self.last_update,
            sensor_types: self.sensors.types(),
            course_confidence: self.course.predict(self.heading_deg.unwrap_or(0.0), self.speed_ms).confidence,
        }
    }
}

/// Immutable snapshot of one track, serialisable for the API surface and
/// the CoT/KLV encoders.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TrackSummary {
    pub track_id: String,
    pub state: TrackState,
    pub track_type: TrackType,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_ft: Option<f64>,
    pub speed_ms: f64,
    pub heading_deg: Option<f64>,
    pub plot_count: u32,
    pub quality_score: f64,
    pub callsign: Option<String>,
    pub aircraft_address: Option<String>,
    pub mode_3a: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub sensor_types: Vec<SensorType>,
    pub course_confidence: f64,
}

impl Default for TrackSummary {
    fn default() -> Self {
        TrackSummary {
            track_id: String::new(),
            state: TrackState::Tentative,
            track_type: TrackType::Aircraft,
            latitude: 0.0,
            longitude: 0.0,
            altitude_ft: None,
            speed_ms: 0.0,
            heading_deg: None,
            plot_count: 0,
            quality_score: 0.0,
            callsign: None,
            aircraft_address: None,
            mode_3a: None,
            created_at: DateTime::UNIX_EPOCH,
            last_update: DateTime::UNIX_EPOCH,
            sensor_types: Vec::new(),
            course_confidence: 0.0,
        }
    }
}
