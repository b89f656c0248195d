//! End-to-end scenarios across the decode → track → encode pipeline.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rsterix::cot::{self, Affiliation, CotEvent};
use rsterix::decode::items::*;
use rsterix::decode::{cat021::Cat021Record, cat048::Cat048Record, encode_block, Record};
use rsterix::geo;
use rsterix::klv::{KlvPacket, UasDatalinkSet, UAS_DATALINK_LS_KEY};
use rsterix::prelude::*;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// S1: a Cat 48 polar plot decodes to engineering units and a derived
/// WGS-84 position around the default station.
#[test]
fn s1_cat48_polar_plot() {
    let record = Cat048Record {
        data_source: Some(DataSourceIdentifier { sac: 0, sic: 1 }),
        time_of_day: Some(TimeOfDay::from_seconds(1024.0)),
        target_descriptor: Some(TargetDescriptor::new(2)),
        polar_position: Some(PolarPosition::from_measurement(10.5, 90.0)),
        mode_3a: Mode3ACode::from_octal("1234"),
        ..Cat048Record::default()
    };
    let payload = encode_block(48, &[Record::Cat048(record)]).unwrap();

    let blocks = decode_blocks(&payload).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].category, 48);

    let cfg = Config::default();
    let plots = Plot::from_records(&blocks[0].records, &cfg.station(), base_time());
    assert_eq!(plots.len(), 1);
    let plot = &plots[0];

    assert_eq!(plot.range_m, Some(10.5 * 1852.0));
    assert_eq!(plot.azimuth_deg, Some(90.0));
    assert_eq!(plot.mode_3a.as_deref(), Some("1234"));

    // due east of the station: same parallel, further east
    let expected = geo::polar_to_wgs84(&cfg.station(), 10.5, 90.0);
    assert!((plot.latitude.unwrap() - 28.0836).abs() < 1e-9);
    assert!((plot.latitude.unwrap() - expected.latitude).abs() < 1e-12);
    assert!((plot.longitude.unwrap() - expected.longitude).abs() < 1e-12);
    assert!(plot.longitude.unwrap() > -80.6081);
}

/// S2: a Cat 21 WGS-84 plot keeps its reported coordinates and carries
/// no polar measurement.
#[test]
fn s2_cat21_wgs84_plot() {
    let record = Cat021Record {
        data_source: Some(DataSourceIdentifier { sac: 0, sic: 2 }),
        position: Some(Wgs84Position::from_degrees(28.0836, -80.6081)),
        aircraft_address: Some(AircraftAddress(0x123456)),
        ..Cat021Record::default()
    };
    let payload = encode_block(21, &[Record::Cat021(record.clone())]).unwrap();

    let blocks = decode_blocks(&payload).unwrap();
    let Record::Cat021(decoded) = &blocks[0].records[0] else {
        unreachable!()
    };
    assert_eq!(*decoded, record);

    let cfg = Config::default();
    let plots = Plot::from_records(&blocks[0].records, &cfg.station(), base_time());
    let plot = &plots[0];
    assert_eq!(plot.sensor_type, SensorType::Adsb);
    assert!(plot.range_m.is_none());
    assert!(plot.azimuth_deg.is_none());
    assert!((plot.latitude.unwrap() - 28.0836).abs() < 1e-4);
    assert!((plot.longitude.unwrap() + 80.6081).abs() < 1e-4);
    assert_eq!(plot.aircraft_address.as_deref(), Some("123456"));
}

/// 60 synthetic plots, 1 s apart, 100 m/s eastward from (28.1, -80.7).
fn eastbound_plots(cfg: &Config) -> Vec<Plot> {
    let station = cfg.station();
    let (x0, y0) = geo::wgs84_to_cartesian(&station, &Position::new(28.1, -80.7));
    (0..60)
        .map(|i| {
            let position = geo::cartesian_to_wgs84(&station, x0 + 100.0 * i as f64, y0);
            Plot {
                timestamp: base_time() + Duration::seconds(i),
                latitude: Some(position.latitude),
                longitude: Some(position.longitude),
                callsign: Some("DAL123".to_string()),
                altitude_ft: Some(3500.0),
                ..Plot::default()
            }
        })
        .collect()
}

/// S3: the straight-line aircraft yields exactly one confirmed track
/// with credible kinematics.
#[test]
fn s3_straight_line_aircraft() {
    let cfg = Config::default();
    let mut estimator = TrackEstimator::new(cfg.clone());

    for (i, plot) in eastbound_plots(&cfg).into_iter().enumerate() {
        estimator.process_batch(&[plot]);
        let confirmed = estimator
            .active_tracks()
            .iter()
            .filter(|t| t.state == TrackState::Confirmed)
            .count();
        if (i as u32 + 1) >= cfg.track_confirmation_threshold {
            assert_eq!(confirmed, 1, "exactly one confirmed track at plot {i}");
        }
    }

    let track = &estimator.active_tracks()[0];
    assert!(track.speed_ms >= 90.0 && track.speed_ms <= 110.0);
    let heading = track.heading_deg.unwrap();
    assert!(heading >= 85.0 && heading <= 95.0);
}

/// S4: once the plots stop, the track coasts and then terminates.
#[test]
fn s4_coasting_then_termination() {
    let cfg = Config::default();
    let mut estimator = TrackEstimator::new(cfg.clone());
    for plot in eastbound_plots(&cfg) {
        estimator.process_batch(&[plot]);
    }

    for scan in 1..=cfg.track_termination_threshold {
        estimator.process_batch(&[]);
        for track in estimator.active_tracks() {
            assert!(track.consecutive_misses <= cfg.track_termination_threshold + 1);
            assert_ne!(track.state, TrackState::Terminated);
            if scan >= cfg.coasting_threshold {
                assert_eq!(track.state, TrackState::Coasting);
            }
        }
    }

    assert!(estimator.active_tracks().is_empty());
    assert_eq!(estimator.archived_tracks().len(), 1);
}

/// S5: CoT round trip of the S3 track preserves position and kinematics.
#[test]
fn s5_cot_round_trip() {
    let cfg = Config::default();
    let mut estimator = TrackEstimator::new(cfg.clone());
    for plot in eastbound_plots(&cfg) {
        estimator.process_batch(&[plot]);
    }
    let summary = estimator.summaries().remove(0);

    let event = CotEvent::from_track(&summary, Affiliation::Friendly, base_time());
    let xml = event.to_xml().unwrap();
    assert!(cot::validate(&xml));

    let decoded = CotEvent::from_xml(&xml).unwrap();
    assert!(decoded.cot_type.starts_with("a-f-"));
    let recovered = decoded.to_track_summary();
    assert!((recovered.latitude - summary.latitude).abs() < 1e-6);
    assert!((recovered.longitude - summary.longitude).abs() < 1e-6);
    assert!((recovered.speed_ms - summary.speed_ms).abs() < 1e-3);
    assert!((recovered.heading_deg.unwrap() - summary.heading_deg.unwrap()).abs() < 1e-3);
    assert_eq!(recovered.callsign, summary.callsign);
    assert!(
        (recovered.altitude_ft.unwrap() - summary.altitude_ft.unwrap()).abs() < 1e-6
    );
}

/// S6: the ST 0601 encoding of the S3 track carries the right universal
/// key, validates its own checksum, and preserves the target latitude.
#[test]
fn s6_klv_st0601() {
    let cfg = Config::default();
    let mut estimator = TrackEstimator::new(cfg.clone());
    for plot in eastbound_plots(&cfg) {
        estimator.process_batch(&[plot]);
    }
    let summary = estimator.summaries().remove(0);

    let packet = UasDatalinkSet::from_track(&summary, base_time()).encode();
    assert_eq!(&packet[..16], &UAS_DATALINK_LS_KEY);
    assert!(rsterix::klv::validate_packet(&packet));

    let KlvPacket::St0601(decoded) = rsterix::klv::decode_packet(&packet).unwrap() else {
        unreachable!()
    };
    assert!((decoded.target_latitude_deg.unwrap() - summary.latitude).abs() < 1e-6);
    assert!((decoded.target_longitude_deg.unwrap() - summary.longitude).abs() < 1e-6);
    assert_eq!(decoded.version, 16);

    // any payload flip must fail the checksum
    let mut corrupted = packet.clone();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x01;
    assert!(matches!(
        rsterix::klv::decode_packet(&corrupted),
        Err(rsterix::error::KlvError::ChecksumFailure { .. })
    ));
}

/// The UDP payload path: two categories concatenated in one datagram
/// decode in file order.
#[test]
fn mixed_payload_preserves_order() {
    let cat48 = Cat048Record {
        data_source: Some(DataSourceIdentifier { sac: 0, sic: 1 }),
        polar_position: Some(PolarPosition::from_measurement(10.5, 90.0)),
        ..Cat048Record::default()
    };
    let cat21 = Cat021Record {
        data_source: Some(DataSourceIdentifier { sac: 0, sic: 2 }),
        position: Some(Wgs84Position::from_degrees(28.2, -80.5)),
        ..Cat021Record::default()
    };
    let mut payload = encode_block(48, &[Record::Cat048(cat48)]).unwrap();
    payload.extend(encode_block(21, &[Record::Cat021(cat21)]).unwrap());

    let blocks = decode_blocks(&payload).unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].category, 48);
    assert_eq!(blocks[1].category, 21);

    let cfg = Config::default();
    let records: Vec<&Record> = blocks.iter().flat_map(|b| b.records.iter()).collect();
    let plots = Plot::from_records(records, &cfg.station(), base_time());
    assert_eq!(plots.len(), 2);
    assert_eq!(plots[0].sensor_type, SensorType::Radar);
    assert_eq!(plots[1].sensor_type, SensorType::Adsb);
}
