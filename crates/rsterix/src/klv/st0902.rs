/**
 * MISB ST 0902 VMTi Local Set.
 *
 * Items carried: 1 (checksum), 2 (UNIX time, µs), 3 (mission id),
 * 4 (platform designation), 7 (system name), 9/10 (target counts),
 * 11 (frame number), 14/15/16 (sensor position), 101 (VMTi target pack:
 * 5/6/7 location, 12 priority, 13 confidence, 19/20 velocity).
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    decode_latitude, decode_longitude, encode_latitude, encode_longitude, open_packet,
    read_i16, read_i32, read_u16, read_u32, read_u64, read_u8, read_string, seal_packet,
    LocalSetReader, LocalSetWriter, VMTI_LS_KEY,
};
use crate::error::KlvError;
use crate::track::TrackSummary;

const KEY_TIMESTAMP: u32 = 2;
const KEY_MISSION_ID: u32 = 3;
const KEY_PLATFORM: u32 = 4;
const KEY_SYSTEM_NAME: u32 = 7;
const KEY_DETECTED_TARGETS: u32 = 9;
const KEY_REPORTED_TARGETS: u32 = 10;
const KEY_FRAME_NUMBER: u32 = 11;
const KEY_SENSOR_LATITUDE: u32 = 14;
const KEY_SENSOR_LONGITUDE: u32 = 15;
const KEY_SENSOR_ALTITUDE: u32 = 16;
const KEY_TARGET_SET: u32 = 101;

const TARGET_KEY_LATITUDE: u32 = 5;
const TARGET_KEY_LONGITUDE: u32 = 6;
const TARGET_KEY_ELEVATION: u32 = 7;
const TARGET_KEY_PRIORITY: u32 = 12;
const TARGET_KEY_CONFIDENCE: u32 = 13;
const TARGET_KEY_VELOCITY_NORTH: u32 = 19;
const TARGET_KEY_VELOCITY_EAST: u32 = 20;

const FT_TO_M: f64 = 0.3048;

/// One moving-target report inside the VMTi target pack (key 101).
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmtiTarget {
    pub latitude_deg: Option<f64>,
    pub longitude_deg: Option<f64>,
    pub elevation_m: Option<f64>,
    pub priority: u8,
    /// Confidence level, 0–100.
    pub confidence: u8,
    pub velocity_north_ms: Option<i16>,
    pub velocity_east_ms: Option<i16>,
}

impl VmtiTarget {
    pub fn from_track(track: &TrackSummary) -> Self {
        let (velocity_north, velocity_east) = match track.heading_deg {
            Some(heading) => {
                let rad = heading.to_radians();
                (
                    Some((track.speed_ms * rad.cos()).round() as i16),
                    Some((track.speed_ms * rad.sin()).round() as i16),
                )
            }
            None => (None, None),
        };
        VmtiTarget {
            latitude_deg: Some(track.latitude),
            longitude_deg: Some(track.longitude),
            elevation_m: track.altitude_ft.map(|ft| (ft * FT_TO_M).max(0.0)),
            priority: 1,
            confidence: (track.quality_score * 100.0).clamp(0.0, 100.0) as u8,
            velocity_north_ms: velocity_north,
            velocity_east_ms: velocity_east,
        }
    }

    /// Ground speed and compass heading recovered from the velocity pair.
    pub fn kinematics(&self) -> Option<(f64, f64)> {
        let north = self.velocity_north_ms? as f64;
        let east = self.velocity_east_ms? as f64;
        let speed = (north * north + east * east).sqrt();
        let heading = (east.atan2(north).to_degrees() + 360.0) % 360.0;
        Some((speed, heading))
    }

    fn encode(&self) -> Vec<u8> {
        let mut items = LocalSetWriter::default();
        if let Some(latitude) = self.latitude_deg {
            items.put(TARGET_KEY_LATITUDE, &encode_latitude(latitude).to_be_bytes());
        }
        if let Some(longitude) = self.longitude_deg {
            items.put(
                TARGET_KEY_LONGITUDE,
                &encode_longitude(longitude).to_be_bytes(),
            );
        }
        if let Some(elevation) = self.elevation_m {
            let clamped = elevation.clamp(0.0, 65_535.0).round() as u16;
            items.put(TARGET_KEY_ELEVATION, &clamped.to_be_bytes());
        }
        items.put(TARGET_KEY_PRIORITY, &[self.priority]);
        items.put(TARGET_KEY_CONFIDENCE, &[self.confidence.min(100)]);
        if let Some(north) = self.velocity_north_ms {
            items.put(TARGET_KEY_VELOCITY_NORTH, &north.to_be_bytes());
        }
        if let Some(east) = self.velocity_east_ms {
            items.put(TARGET_KEY_VELOCITY_EAST, &east.to_be_bytes());
        }
        items.into_bytes()
    }

    fn decode(data: &[u8]) -> Result<Self, KlvError> {
        let mut target = VmtiTarget::default();
        for item in LocalSetReader::new(data) {
            let (key, value) = item?;
            match key {
                TARGET_KEY_LATITUDE => {
                    target.latitude_deg = Some(decode_latitude(read_i32(value)?))
                }
                TARGET_KEY_LONGITUDE => {
                    target.longitude_deg = Some(decode_longitude(read_i32(value)?))
                }
                TARGET_KEY_ELEVATION => target.elevation_m = Some(read_u16(value)? as f64),
                TARGET_KEY_PRIORITY => target.priority = read_u8(value)?,
                TARGET_KEY_CONFIDENCE => target.confidence = read_u8(value)?,
                TARGET_KEY_VELOCITY_NORTH => {
                    target.velocity_north_ms = Some(read_i16(value)?)
                }
                TARGET_KEY_VELOCITY_EAST => target.velocity_east_ms = Some(read_i16(value)?),
                _ => {}
            }
        }
        Ok(target)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmtiSet {
    pub timestamp_us: u64,
    pub mission_id: Option<String>,
    pub platform: Option<String>,
    pub system_name: Option<String>,
    pub detected_targets: u16,
    pub reported_targets: u16,
    pub frame_number: u32,
    pub sensor_latitude_deg: Option<f64>,
    pub sensor_longitude_deg: Option<f64>,
    pub sensor_altitude_m: Option<f64>,
    pub targets: Vec<VmtiTarget>,
}

impl VmtiSet {
    pub fn from_track(track: &TrackSummary, now: DateTime<Utc>) -> Self {
        VmtiSet {
            timestamp_us: now.timestamp_micros().max(0) as u64,
            mission_id: Some(format!("VMTI-{}", track.track_id)),
            platform: Some(
                track
                    .callsign
                    .clone()
                    .unwrap_or_else(|| track.track_id.clone()),
            ),
            system_name: Some("rsterix".to_string()),
            detected_targets: 1,
            reported_targets: 1,
            frame_number: now.timestamp().max(0) as u32,
            sensor_latitude_deg: None,
            sensor_longitude_deg: None,
            sensor_altitude_m: None,
            targets: vec![VmtiTarget::from_track(track)],
        }
    }

    pub fn with_sensor(mut self, latitude: f64, longitude: f64, altitude_m: f64) -> Self {
        self.sensor_latitude_deg = Some(latitude);
        self.sensor_longitude_deg = Some(longitude);
        self.sensor_altitude_m = Some(altitude_m);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut items = LocalSetWriter::default();
        items.put(KEY_TIMESTAMP, &self.timestamp_us.to_be_bytes());
        if let Some(mission_id) = &self.mission_id {
            items.put(KEY_MISSION_ID, mission_id.as_bytes());
        }
        if let Some(platform) = &self.platform {
            items.put(KEY_PLATFORM, platform.as_bytes());
        }
        if let Some(system_name) = &self.system_name {
            items.put(KEY_SYSTEM_NAME, system_name.as_bytes());
        }
        items.put(KEY_DETECTED_TARGETS, &self.detected_targets.to_be_bytes());
        items.put(KEY_REPORTED_TARGETS, &self.reported_targets.to_be_bytes());
        items.put(KEY_FRAME_NUMBER, &self.frame_number.to_be_bytes());
        if let Some(latitude) = self.sensor_latitude_deg {
            items.put(KEY_SENSOR_LATITUDE, &encode_latitude(latitude).to_be_bytes());
        }
        if let Some(longitude) = self.sensor_longitude_deg {
            items.put(
                KEY_SENSOR_LONGITUDE,
                &encode_longitude(longitude).to_be_bytes(),
            );
        }
        if let Some(altitude) = self.sensor_altitude_m {
            let clamped = altitude.clamp(0.0, 65_535.0).round() as u16;
            items.put(KEY_SENSOR_ALTITUDE, &clamped.to_be_bytes());
        }
        for target in &self.targets {
            items.put(KEY_TARGET_SET, &target.encode());
        }
        seal_packet(&VMTI_LS_KEY, items.into_bytes())
    }

    pub fn decode(data: &[u8]) -> Result<(Self, usize), KlvError> {
        let (items, consumed) = open_packet(data, &VMTI_LS_KEY)?;
        let mut set = VmtiSet::default();
        for item in LocalSetReader::new(items) {
            let (key, value) = item?;
            match key {
                KEY_TIMESTAMP => set.timestamp_us = read_u64(value)?,
                KEY_MISSION_ID => set.mission_id = Some(read_string(value)),
                KEY_PLATFORM => set.platform = Some(read_string(value)),
                KEY_SYSTEM_NAME => set.system_name = Some(read_string(value)),
                KEY_DETECTED_TARGETS => set.detected_targets = read_u16(value)?,
                KEY_REPORTED_TARGETS => set.reported_targets = read_u16(value)?,
                KEY_FRAME_NUMBER => set.frame_number = read_u32(value)?,
                KEY_SENSOR_LATITUDE => {
                    set.sensor_latitude_deg = Some(decode_latitude(read_i32(value)?))
                }
                KEY_SENSOR_LONGITUDE => {
                    set.sensor_longitude_deg = Some(decode_longitude(read_i32(value)?))
                }
                KEY_SENSOR_ALTITUDE => set.sensor_altitude_m = Some(read_u16(value)? as f64),
                KEY_TARGET_SET => set.targets.push(VmtiTarget::decode(value)?),
                _ => {}
            }
        }
        Ok((set, consumed))
    }
}
