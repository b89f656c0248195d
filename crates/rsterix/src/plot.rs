/**
 * The plot is the unit of exchange between the decoder and the tracker:
 * one sensor detection with engineering-unit measurements, a derived
 * WGS-84 position and whatever identity the transponder volunteered.
 */
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decode::cat010::Cat010Record;
use crate::decode::cat021::Cat021Record;
use crate::decode::cat048::Cat048Record;
use crate::decode::time::resolve_time_of_day;
use crate::decode::Record;
use crate::geo::{self, Position, METERS_PER_NM};

/// The family of sensor a plot originated from. Drives the fusion weight
/// applied in the Kalman update.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Radar,
    Adsb,
    Secondary,
    Optical,
    Unknown,
}

impl SensorType {
    /// Relative confidence in measurements of this sensor family.
    pub fn weight(&self) -> f64 {
        match self {
            SensorType::Radar => 1.0,
            SensorType::Adsb => 0.9,
            SensorType::Secondary => 0.8,
            SensorType::Optical => 0.7,
            SensorType::Unknown => 0.5,
        }
    }
}

static NEXT_PLOT_ID: AtomicU64 = AtomicU64::new(1);

fn next_plot_id() -> u64 {
    NEXT_PLOT_ID.fetch_add(1, Ordering::Relaxed)
}

/// One radar/ADS-B detection, in engineering units.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct Plot {
    pub plot_id: u64,
    pub sensor_type: SensorType,
    /// SAC/SIC of the reporting sensor, e.g. `"025/014"`.
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_ft: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doppler_velocity_ms: Option<f64>,
    pub rcs: f64,
    /// Plot quality factor in [0, 1].
    pub quality: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_3a: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aircraft_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squawk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_speed_kt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u16>,
}

impl Default for Plot {
    fn default() -> Self {
        Plot {
            plot_id: next_plot_id(),
            sensor_type: SensorType::Unknown,
            sensor_id: String::new(),
            timestamp: Utc::now(),
            range_m: None,
            azimuth_deg: None,
            elevation_deg: None,
            altitude_ft: None,
            doppler_velocity_ms: None,
            rcs: 0.0,
            quality: 1.0,
            latitude: None,
            longitude: None,
            mode_3a: None,
            aircraft_address: None,
            callsign: None,
            squawk: None,
            ground_speed_kt: None,
            heading_deg: None,
            track_number: None,
        }
    }
}

impl Plot {
    /// Build plots from every record of a decoded payload.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a Record>,
        station: &Position,
        received: DateTime<Utc>,
    ) -> Vec<Plot> {
        records
            .into_iter()
            .filter_map(|record| Plot::from_record(record, station, received))
            .collect()
    }

    /// Convert one record. Records without any position content yield no
    /// plot. A field that violates its range invariant is discarded and
    /// the rest of the plot kept.
    pub fn from_record(
        record: &Record,
        station: &Position,
        received: DateTime<Utc>,
    ) -> Option<Plot> {
        match record {
            Record::Cat048(r) => Plot::from_cat048(r, station, received),
            Record::Cat021(r) => Plot::from_cat021(r, received),
            Record::Cat010(r) => Plot::from_cat010(r, station, received),
        }
    }

    fn from_cat048(
        record: &Cat048Record,
        station: &Position,
        received: DateTime<Utc>,
    ) -> Option<Plot> {
        let polar = record.polar_position?;
        let mut plot = Plot {
            sensor_type: match record.target_descriptor.map(|d| d.typ) {
                Some(2) | Some(4) | Some(5) => SensorType::Secondary,
                _ => SensorType::Radar,
            },
            sensor_id: record
                .data_source
                .map(|s| s.to_string())
                .unwrap_or_default(),
            ..Plot::default()
        };

        plot.set_polar(polar.range_nm(), polar.azimuth_deg(), station);
        if let Some(tod) = record.time_of_day {
            plot.timestamp = resolve_time_of_day(received, tod.seconds());
        } else {
            plot.timestamp = received;
        }
        if let Some(fl) = record.flight_level {
            plot.altitude_ft = Some(fl.altitude_ft());
        }
        if let Some(doppler) = record.doppler_speed {
            plot.doppler_velocity_ms = Some(doppler.speed_ms());
        }
        if let Some(vector) = record.ground_vector {
            plot.ground_speed_kt = Some(vector.speed_kt());
            plot.heading_deg = Some(vector.heading_deg());
        }
        plot.mode_3a = record.mode_3a.map(|m| m.octal_string());
        plot.squawk = plot.mode_3a.clone();
        plot.aircraft_address = record.aircraft_address.map(|a| a.to_string());
        plot.callsign = record.callsign.as_ref().map(|c| c.0.clone());
        plot.track_number = record.track_number.map(|t| t.0);
        if let Some(amplitude) = record
            .plot_characteristics
            .as_ref()
            .and_then(|p| p.amplitude_dbm())
        {
            plot.rcs = amplitude as f64;
        }
        if record.warnings.as_ref().is_some_and(|w| !w.is_clean()) {
            plot.quality = 0.7;
        }
        Some(plot)
    }

    fn from_cat021(record: &Cat021Record, received: DateTime<Utc>) -> Option<Plot> {
        let position = record.position?;
        let mut plot = Plot {
            sensor_type: SensorType::Adsb,
            sensor_id: record
                .data_source
                .map(|s| s.to_string())
                .unwrap_or_default(),
            ..Plot::default()
        };

        plot.set_wgs84(position.latitude_deg(), position.longitude_deg());
        if let Some(tod) = record.time_of_day {
            plot.timestamp = resolve_time_of_day(received, tod.seconds());
        } else {
            plot.timestamp = received;
        }
        if let Some(fl) = record.flight_level {
            plot.altitude_ft = Some(fl.altitude_ft());
        }
        plot.aircraft_address = record.aircraft_address.map(|a| a.to_string());
        plot.callsign = record.callsign.as_ref().map(|c| c.0.clone());
        Some(plot)
    }

    fn from_cat010(
        record: &Cat010Record,
        station: &Position,
        received: DateTime<Utc>,
    ) -> Option<Plot> {
        let polar = record.polar_position?;
        let mut plot = Plot {
            sensor_type: SensorType::Radar,
            sensor_id: record
                .data_source
                .map(|s| s.to_string())
                .unwrap_or_default(),
            ..Plot::default()
        };

        plot.set_polar(polar.range_nm(), polar.azimuth_deg(), station);
        if let Some(tod) = record.time_of_day {
            plot.timestamp = resolve_time_of_day(received, tod.seconds());
        } else {
            plot.timestamp = received;
        }
        if let Some(vector) = record.ground_vector {
            plot.ground_speed_kt = Some(vector.speed_kt());
            plot.heading_deg = Some(vector.heading_deg());
        }
        plot.mode_3a = record.mode_3a.map(|m| m.octal_string());
        plot.squawk = plot.mode_3a.clone();
        plot.aircraft_address = record.aircraft_address.map(|a| a.to_string());
        plot.callsign = record.callsign.as_ref().map(|c| c.0.clone());
        plot.track_number = record.track_number.map(|t| t.0);
        Some(plot)
    }

    fn set_polar(&mut self, range_nm: f64, azimuth_deg: f64, station: &Position) {
        if range_nm < 0.0 || !(0.0..360.0).contains(&azimuth_deg) {
            debug!("discarding out-of-range polar measurement ({range_nm} NM, {azimuth_deg}°)");
            return;
        }
        self.range_m = Some(range_nm * METERS_PER_NM);
        self.azimuth_deg = Some(azimuth_deg);
        let derived = geo::polar_to_wgs84(station, range_nm, azimuth_deg);
        self.set_wgs84(derived.latitude, derived.longitude);
    }

    fn set_wgs84(&mut self, latitude: f64, longitude: f64) {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            debug!("discarding out-of-range position ({latitude}, {longitude})");
            return;
        }
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
    }

    /// Station-Cartesian coordinates of the plot, metres east/north.
    pub fn cartesian(&self, station: &Position) -> Option<(f64, f64)> {
        if let (Some(range_m), Some(azimuth)) = (self.range_m, self.azimuth_deg) {
            return Some(geo::polar_to_cartesian(range_m, azimuth));
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                Some(geo::wgs84_to_cartesian(station, &Position::new(lat, lon)))
            }
            _ => None,
        }
    }

    /// Does the plot carry any usable position?
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() || self.range_m.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::items::*;

    fn station() -> Position {
        Position::new(28.0836, -80.6081)
    }

    #[test]
    fn cat48_plot_derives_position() {
        let record = Cat048Record {
            data_source: Some(DataSourceIdentifier { sac: 0, sic: 1 }),
            polar_position: Some(PolarPosition::from_measurement(10.5, 90.0)),
            mode_3a: Mode3ACode::from_octal("1234"),
            ..Cat048Record::default()
        };
        let plot = Plot::from_cat048(&record, &station(), Utc::now()).unwrap();
        assert_eq!(plot.range_m, Some(10.5 * 1852.0));
        assert_eq!(plot.azimuth_deg, Some(90.0));
        // due east: latitude stays on the station parallel
        assert!((plot.latitude.unwrap() - 28.0836).abs() < 1e-9);
        assert!(plot.longitude.unwrap() > -80.6081);
        assert_eq!(plot.mode_3a.as_deref(), Some("1234"));
        assert_eq!(plot.sensor_type, SensorType::Radar);
    }

    #[test]
    fn ssr_detection_is_secondary() {
        let record = Cat048Record {
            target_descriptor: Some(TargetDescriptor::new(2)),
            polar_position: Some(PolarPosition::from_measurement(1.0, 0.0)),
            ..Cat048Record::default()
        };
        let plot = Plot::from_cat048(&record, &station(), Utc::now()).unwrap();
        assert_eq!(plot.sensor_type, SensorType::Secondary);
    }

    #[test]
    fn cat21_plot_keeps_reported_position() {
        let record = Cat021Record {
            position: Some(Wgs84Position::from_degrees(28.0836, -80.6081)),
            aircraft_address: Some(AircraftAddress(0x123456)),
            ..Cat021Record::default()
        };
        let plot = Plot::from_cat021(&record, Utc::now()).unwrap();
        assert_eq!(plot.sensor_type, SensorType::Adsb);
        assert!(plot.range_m.is_none());
        assert!(plot.azimuth_deg.is_none());
        assert!((plot.latitude.unwrap() - 28.0836).abs() < 1e-4);
        assert_eq!(plot.aircraft_address.as_deref(), Some("123456"));
    }

    #[test]
    fn positionless_record_yields_no_plot() {
        let record = Cat048Record {
            data_source: Some(DataSourceIdentifier { sac: 0, sic: 1 }),
            ..Cat048Record::default()
        };
        assert!(Plot::from_cat048(&record, &station(), Utc::now()).is_none());
    }

    #[test]
    fn warnings_degrade_quality() {
        let record = Cat048Record {
            polar_position: Some(PolarPosition::from_measurement(5.0, 45.0)),
            warnings: Some(WarningConditions { octets: vec![0x04] }),
            ..Cat048Record::default()
        };
        let plot = Plot::from_cat048(&record, &station(), Utc::now()).unwrap();
        assert_eq!(plot.quality, 0.7);
    }

    #[test]
    fn cartesian_prefers_polar() {
        let plot = Plot {
            range_m: Some(1000.0),
            azimuth_deg: Some(90.0),
            ..Plot::default()
        };
        let (x, y) = plot.cartesian(&station()).unwrap();
        assert!((x - 1000.0).abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn plot_ids_are_unique() {
        let a = Plot::default();
        let b = Plot::default();
        assert_ne!(a.plot_id, b.plot_id);
    }
}
