/**
 * MISB ST 0601 UAS Datalink Local Set.
 *
 * Items carried: 1 (checksum), 2 (UNIX time, µs), 3 (mission id),
 * 4 (platform tail number), 5 (platform heading), 40/41 (target
 * location), 42 (target elevation), 65 (LS version, 16).
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    decode_heading, decode_latitude, decode_longitude, encode_heading, encode_latitude,
    encode_longitude, open_packet, read_i32, read_u16, read_u64, read_u8, read_string,
    seal_packet, LocalSetReader, LocalSetWriter, UAS_DATALINK_LS_KEY,
};
use crate::error::KlvError;
use crate::track::TrackSummary;

const KEY_TIMESTAMP: u32 = 2;
const KEY_MISSION_ID: u32 = 3;
const KEY_PLATFORM_TAIL: u32 = 4;
const KEY_PLATFORM_HEADING: u32 = 5;
const KEY_TARGET_LATITUDE: u32 = 40;
const KEY_TARGET_LONGITUDE: u32 = 41;
const KEY_TARGET_ELEVATION: u32 = 42;
const KEY_LS_VERSION: u32 = 65;

pub const LS_VERSION: u8 = 16;

const FT_TO_M: f64 = 0.3048;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct UasDatalinkSet {
    /// UNIX time in microseconds.
    pub timestamp_us: u64,
    pub mission_id: Option<String>,
    pub platform_tail: Option<String>,
    pub platform_heading_deg: Option<f64>,
    pub target_latitude_deg: Option<f64>,
    pub target_longitude_deg: Option<f64>,
    /// Target elevation in metres.
    pub target_elevation_m: Option<f64>,
    pub version: u8,
}

impl UasDatalinkSet {
    pub fn from_track(track: &TrackSummary, now: DateTime<Utc>) -> Self {
        UasDatalinkSet {
            timestamp_us: now.timestamp_micros().max(0) as u64,
            mission_id: Some(format!("MISSION-{}", track.track_id)),
            platform_tail: Some(
                track
                    .callsign
                    .clone()
                    .unwrap_or_else(|| track.track_id.clone()),
            ),
            platform_heading_deg: track.heading_deg,
            target_latitude_deg: Some(track.latitude),
            target_longitude_deg: Some(track.longitude),
            target_elevation_m: track.altitude_ft.map(|ft| (ft * FT_TO_M).max(0.0)),
            version: LS_VERSION,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut items = LocalSetWriter::default();
        items.put(KEY_TIMESTAMP, &self.timestamp_us.to_be_bytes());
        if let Some(mission_id) = &self.mission_id {
            items.put(KEY_MISSION_ID, mission_id.as_bytes());
        }
        if let Some(tail) = &self.platform_tail {
            items.put(KEY_PLATFORM_TAIL, tail.as_bytes());
        }
        if let Some(heading) = self.platform_heading_deg {
            items.put(KEY_PLATFORM_HEADING, &encode_heading(heading).to_be_bytes());
        }
        if let Some(latitude) = self.target_latitude_deg {
            items.put(
                KEY_TARGET_LATITUDE,
                &encode_latitude(latitude).to_be_bytes(),
            );
        }
        if let Some(longitude) = self.target_longitude_deg {
            items.put(
                KEY_TARGET_LONGITUDE,
                &encode_longitude(longitude).to_be_bytes(),
            );
        }
        if let Some(elevation) = self.target_elevation_m {
            let clamped = elevation.clamp(0.0, 65_535.0).round() as u16;
            items.put(KEY_TARGET_ELEVATION, &clamped.to_be_bytes());
        }
        items.put(KEY_LS_VERSION, &[self.version]);
        seal_packet(&UAS_DATALINK_LS_KEY, items.into_bytes())
    }

    /// Decode one packet; returns the set and the octets consumed, so a
    /// stream of packets can be walked.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), KlvError> {
        let (items, consumed) = open_packet(data, &UAS_DATALINK_LS_KEY)?;
        let mut set = UasDatalinkSet::default();
        for item in LocalSetReader::new(items) {
            let (key, value) = item?;
            match key {
                KEY_TIMESTAMP => set.timestamp_us = read_u64(value)?,
                KEY_MISSION_ID => set.mission_id = Some(read_string(value)),
                KEY_PLATFORM_TAIL => set.platform_tail = Some(read_string(value)),
                KEY_PLATFORM_HEADING => {
                    set.platform_heading_deg = Some(decode_heading(read_u16(value)?))
                }
                KEY_TARGET_LATITUDE => {
                    set.target_latitude_deg = Some(decode_latitude(read_i32(value)?))
                }
                KEY_TARGET_LONGITUDE => {
                    set.target_longitude_deg = Some(decode_longitude(read_i32(value)?))
                }
                KEY_TARGET_ELEVATION => {
                    set.target_elevation_m = Some(read_u16(value)? as f64)
                }
                KEY_LS_VERSION => set.version = read_u8(value)?,
                _ => {} // unmodelled items are skipped
            }
        }
        Ok((set, consumed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_track() -> TrackSummary {
        TrackSummary {
            track_id: "track_000042".to_string(),
            latitude: 28.09971,
            longitude: -80.61234,
            altitude_ft: Some(3500.0),
            speed_ms: 103.0,
            heading_deg: Some(88.4),
            callsign: Some("DAL123".to_string()),
            ..TrackSummary::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn encode_uses_the_st0601_key() {
        let packet = UasDatalinkSet::from_track(&sample_track(), now()).encode();
        assert_eq!(&packet[..16], &UAS_DATALINK_LS_KEY);
        assert!(super::super::validate_packet(&packet));
    }

    #[test]
    fn round_trip_preserves_target_location() {
        let source = UasDatalinkSet::from_track(&sample_track(), now());
        let packet = source.encode();
        let (decoded, consumed) = UasDatalinkSet::decode(&packet).unwrap();
        assert_eq!(consumed, packet.len());

        assert_eq!(decoded.timestamp_us, source.timestamp_us);
        assert_eq!(decoded.version, LS_VERSION);
        assert_eq!(decoded.mission_id.as_deref(), Some("MISSION-track_000042"));
        assert_eq!(decoded.platform_tail.as_deref(), Some("DAL123"));
        assert!((decoded.target_latitude_deg.unwrap() - 28.09971).abs() < 1e-6);
        assert!((decoded.target_longitude_deg.unwrap() + 80.61234).abs() < 1e-6);
        assert!((decoded.platform_heading_deg.unwrap() - 88.4).abs() < 0.01);
        let elevation = decoded.target_elevation_m.unwrap();
        assert!((elevation - (3500.0f64 * 0.3048).round()).abs() < 1e-9);
    }

    #[test]
    fn corrupted_packet_is_rejected() {
        let mut packet = UasDatalinkSet::from_track(&sample_track(), now()).encode();
        let last = packet.len() - 1;
        packet[last] ^= 0xFF;
        assert!(matches!(
            UasDatalinkSet::decode(&packet),
            Err(KlvError::ChecksumFailure { .. })
        ));
    }

    #[test]
    fn track_without_altitude_omits_elevation() {
        let mut track = sample_track();
        track.altitude_ft = None;
        let packet = UasDatalinkSet::from_track(&track, now()).encode();
        let (decoded, _) = UasDatalinkSet::decode(&packet).unwrap();
        assert!(decoded.target_elevation_m.is_none());
    }
}
