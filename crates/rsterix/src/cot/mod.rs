/**
 * Cursor-on-Target (CoT) codec.
 *
 * Encodes tracks and ADS-B plots as CoT `<event>` XML (single events,
 * `<events>` batches, GeoChat messages, heartbeats) and parses either
 * root back, tolerating the optional XML declaration. Timestamps are
 * ISO-8601 UTC with microseconds and a trailing `Z`.
 */
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use xml::reader::{EventReader, XmlEvent as ReaderEvent};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as WriterEvent};

use crate::error::CotError;
use crate::plot::{Plot, SensorType};
use crate::track::{TrackSummary, TrackType};

/// How long a track event stays fresh, by source.
const STALE_TRACK: i64 = 5 * 60;
const STALE_ADSB: i64 = 2 * 60;
const STALE_CHAT: i64 = 60 * 60;

/// Military affiliation carried in the second segment of the CoT type.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone, Default)]
pub enum Affiliation {
    Friendly,
    Hostile,
    Neutral,
    #[default]
    Unknown,
}

impl Affiliation {
    pub fn letter(&self) -> &'static str {
        match self {
            Affiliation::Friendly => "f",
            Affiliation::Hostile => "h",
            Affiliation::Neutral => "n",
            Affiliation::Unknown => "u",
        }
    }
}

impl std::str::FromStr for Affiliation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "friendly" | "f" => Ok(Affiliation::Friendly),
            "hostile" | "h" => Ok(Affiliation::Hostile),
            "neutral" | "n" => Ok(Affiliation::Neutral),
            "unknown" | "u" => Ok(Affiliation::Unknown),
            other => Err(format!("unknown affiliation {other:?}")),
        }
    }
}

/// Base CoT type per target classification; the affiliation letter then
/// replaces the second segment.
fn base_type(track_type: TrackType) -> &'static str {
    match track_type {
        TrackType::Aircraft => "a-f-A",
        TrackType::Helicopter => "a-f-H",
        TrackType::Vessel => "a-n-S",
        TrackType::Vehicle => "a-f-G",
        TrackType::Person => "a-f-G-I",
        TrackType::Unknown => "a-u-G",
    }
}

pub fn cot_type(track_type: TrackType, affiliation: Affiliation) -> String {
    let base = base_type(track_type);
    let mut parts: Vec<&str> = base.split('-').collect();
    if parts.len() >= 2 {
        parts[1] = affiliation.letter();
    }
    parts.join("-")
}

/// Inverse of the type mapping, used by the decoder.
pub fn track_type_of(cot_type: &str) -> TrackType {
    let parts: Vec<&str> = cot_type.split('-').collect();
    match parts.get(2) {
        Some(&"A") => TrackType::Aircraft,
        Some(&"H") => TrackType::Helicopter,
        Some(&"S") => TrackType::Vessel,
        Some(&"G") if parts.get(3) == Some(&"I") => TrackType::Person,
        Some(&"G") => TrackType::Vehicle,
        _ => TrackType::Unknown,
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, CotError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CotError::Invalid(format!("bad timestamp {value:?}: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CotPoint {
    pub lat: f64,
    pub lon: f64,
    /// Height above ellipsoid, metres; 0 when unknown.
    pub hae: f64,
    /// Circular error, metres.
    pub ce: f64,
    /// Linear error, metres.
    pub le: f64,
}

impl Default for CotPoint {
    fn default() -> Self {
        CotPoint {
            lat: 0.0,
            lon: 0.0,
            hae: 0.0,
            ce: 10.0,
            le: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CotTrack {
    pub course_deg: f64,
    pub speed_ms: f64,
    pub climb_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CotLink {
    pub uid: String,
    pub link_type: String,
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionLocation {
    pub altsrc: String,
    pub geopointsrc: String,
}

/// ADS-B specific detail child.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdsbDetail {
    pub icao24: String,
    pub squawk: Option<String>,
    pub flight_status: Option<String>,
    pub category: Option<String>,
    pub wake_turbulence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDetail {
    pub chatroom: String,
    pub id: String,
    pub sender_callsign: String,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CotDetail {
    pub track: Option<CotTrack>,
    pub contact_callsign: Option<String>,
    pub remarks: Option<String>,
    pub link: Option<CotLink>,
    pub precision_location: Option<PrecisionLocation>,
    pub adsb: Option<AdsbDetail>,
    pub emergency: Option<String>,
    pub chat: Option<ChatDetail>,
}

/// One CoT event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CotEvent {
    pub version: String,
    pub uid: String,
    pub cot_type: String,
    pub time: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub stale: DateTime<Utc>,
    pub how: String,
    pub point: CotPoint,
    pub detail: CotDetail,
}

impl CotEvent {
    /// Encode a track snapshot as a situational-awareness event.
    pub fn from_track(track: &TrackSummary, affiliation: Affiliation, now: DateTime<Utc>) -> Self {
        let adsb_sourced = track.sensor_types.contains(&SensorType::Adsb);
        let stale_window = if adsb_sourced { STALE_ADSB } else { STALE_TRACK };
        let callsign = track
            .callsign
            .clone()
            .unwrap_or_else(|| track.track_id.clone());

        CotEvent {
            version: "2.0".to_string(),
            uid: format!("SURV-{}-{}", track.track_id, now.timestamp()),
            cot_type: cot_type(track.track_type, affiliation),
            time: now,
            start: now,
            stale: now + Duration::seconds(stale_window),
            how: "m-g".to_string(),
            point: CotPoint {
                lat: track.latitude,
                lon: track.longitude,
                hae: track.altitude_ft.map(|ft| ft * 0.3048).unwrap_or(0.0),
                ..CotPoint::default()
            },
            detail: CotDetail {
                track: Some(CotTrack {
                    course_deg: track.heading_deg.unwrap_or(0.0),
                    speed_ms: track.speed_ms,
                    climb_ms: None,
                }),
                contact_callsign: Some(callsign),
                remarks: Some(format!(
                    "Track {} - {:?} - Status: {:?}",
                    track.track_id, track.track_type, track.state
                )),
                link: Some(CotLink {
                    uid: track.track_id.clone(),
                    link_type: "a-f-G-U-C".to_string(),
                    relation: "p-p".to_string(),
                }),
                precision_location: Some(PrecisionLocation {
                    altsrc: "DTED0".to_string(),
                    geopointsrc: "GPS".to_string(),
                }),
                ..CotDetail::default()
            },
        }
    }

    /// Encode a raw ADS-B plot, with the transponder detail child and
    /// emergency squawk handling.
    pub fn from_adsb_plot(plot: &Plot, affiliation: Affiliation, now: DateTime<Utc>) -> Self {
        let icao24 = plot.aircraft_address.clone().unwrap_or_default();
        let callsign = plot
            .callsign
            .clone()
            .or_else(|| plot.aircraft_address.clone())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let emergency = match plot.squawk.as_deref() {
            Some("7500") => Some("Hijacking".to_string()),
            Some("7600") => Some("Radio failure".to_string()),
            Some("7700") => Some("General emergency".to_string()),
            _ => None,
        };

        CotEvent {
            version: "2.0".to_string(),
            uid: format!("ADSB-{icao24}-{}", now.timestamp()),
            cot_type: cot_type(TrackType::Aircraft, affiliation),
            time: now,
            start: now,
            stale: now + Duration::seconds(STALE_ADSB),
            how: "m-g".to_string(),
            point: CotPoint {
                lat: plot.latitude.unwrap_or(0.0),
                lon: plot.longitude.unwrap_or(0.0),
                hae: plot.altitude_ft.map(|ft| ft * 0.3048).unwrap_or(0.0),
                // decoder-supplied accuracies for ADS-B sources
                ce: 25.0,
                le: 50.0,
            },
            detail: CotDetail {
                track: Some(CotTrack {
                    course_deg: plot.heading_deg.unwrap_or(0.0),
                    speed_ms: plot.ground_speed_kt.map(|kt| kt * 0.514444).unwrap_or(0.0),
                    climb_ms: None,
                }),
                contact_callsign: Some(callsign),
                adsb: Some(AdsbDetail {
                    icao24,
                    squawk: plot.squawk.clone(),
                    flight_status: None,
                    category: None,
                    wake_turbulence: None,
                }),
                emergency,
                ..CotDetail::default()
            },
        }
    }

    /// GeoChat message, broadcast when `recipients` is empty.
    pub fn chat(
        sender: &str,
        message: &str,
        recipients: &[String],
        now: DateTime<Utc>,
    ) -> Self {
        let chatroom = if recipients.is_empty() {
            "All Chat Rooms".to_string()
        } else {
            "Direct".to_string()
        };
        CotEvent {
            version: "2.0".to_string(),
            uid: format!("GeoChat.{sender}.{}", now.timestamp_micros()),
            cot_type: "b-t-f".to_string(),
            time: now,
            start: now,
            stale: now + Duration::seconds(STALE_CHAT),
            how: "h-g-i-g-o".to_string(),
            point: CotPoint {
                lat: 0.0,
                lon: 0.0,
                hae: 0.0,
                ce: 9_999_999.0,
                le: 9_999_999.0,
            },
            detail: CotDetail {
                remarks: Some(message.to_string()),
                chat: Some(ChatDetail {
                    chatroom,
                    id: format!("{}", now.timestamp_micros()),
                    sender_callsign: sender.to_string(),
                    recipients: recipients.to_vec(),
                }),
                ..CotDetail::default()
            },
        }
    }

    /// Heartbeat/ping event; stale equals time.
    pub fn heartbeat(uid: &str, now: DateTime<Utc>) -> Self {
        CotEvent {
            version: "2.0".to_string(),
            uid: uid.to_string(),
            cot_type: "t-x-c-t".to_string(),
            time: now,
            start: now,
            stale: now,
            how: "m-g".to_string(),
            point: CotPoint::default(),
            detail: CotDetail::default(),
        }
    }

    /// Serialise as a standalone document, XML declaration included.
    pub fn to_xml(&self) -> Result<String, CotError> {
        let mut sink = Vec::new();
        let mut writer = EmitterConfig::new()
            .write_document_declaration(true)
            .create_writer(&mut sink);
        self.write(&mut writer)?;
        String::from_utf8(sink).map_err(|e| CotError::Invalid(e.to_string()))
    }

    fn write<W: std::io::Write>(&self, writer: &mut EventWriter<W>) -> Result<(), CotError> {
        let time = format_time(self.time);
        let start = format_time(self.start);
        let stale = format_time(self.stale);
        writer.write(
            WriterEvent::start_element("event")
                .attr("version", &self.version)
                .attr("uid", &self.uid)
                .attr("type", &self.cot_type)
                .attr("time", &time)
                .attr("start", &start)
                .attr("stale", &stale)
                .attr("how", &self.how),
        )?;

        let lat = self.point.lat.to_string();
        let lon = self.point.lon.to_string();
        let hae = self.point.hae.to_string();
        let ce = self.point.ce.to_string();
        let le = self.point.le.to_string();
        writer.write(
            WriterEvent::start_element("point")
                .attr("lat", &lat)
                .attr("lon", &lon)
                .attr("hae", &hae)
                .attr("ce", &ce)
                .attr("le", &le),
        )?;
        writer.write(WriterEvent::end_element())?;

        writer.write(WriterEvent::start_element("detail"))?;
        if let Some(track) = &self.detail.track {
            let course = track.course_deg.to_string();
            let speed = track.speed_ms.to_string();
            let mut element = WriterEvent::start_element("track")
                .attr("course", &course)
                .attr("speed", &speed);
            let climb = track.climb_ms.map(|c| c.to_string());
            if let Some(climb) = &climb {
                element = element.attr("climb", climb);
            }
            writer.write(element)?;
            writer.write(WriterEvent::end_element())?;
        }
        if let Some(callsign) = &self.detail.contact_callsign {
            writer.write(WriterEvent::start_element("contact").attr("callsign", callsign))?;
            writer.write(WriterEvent::end_element())?;
        }
        if let Some(adsb) = &self.detail.adsb {
            let mut element = WriterEvent::start_element("adsb").attr("icao24", &adsb.icao24);
            if let Some(squawk) = &adsb.squawk {
                element = element.attr("squawk", squawk);
            }
            if let Some(status) = &adsb.flight_status {
                element = element.attr("flight_status", status);
            }
            if let Some(category) = &adsb.category {
                element = element.attr("category", category);
            }
            if let Some(wake) = &adsb.wake_turbulence {
                element = element.attr("wake_turbulence", wake);
            }
            writer.write(element)?;
            writer.write(WriterEvent::end_element())?;
        }
        if let Some(emergency) = &self.detail.emergency {
            writer.write(WriterEvent::start_element("emergency").attr("type", emergency))?;
            writer.write(WriterEvent::characters(emergency))?;
            writer.write(WriterEvent::end_element())?;
        }
        if let Some(chat) = &self.detail.chat {
            writer.write(
                WriterEvent::start_element("__chat")
                    .attr("chatroom", &chat.chatroom)
                    .attr("id", &chat.id)
                    .attr("senderCallsign", &chat.sender_callsign),
            )?;
            let names: Vec<String> = (1..=chat.recipients.len())
                .map(|i| format!("uid{i}"))
                .collect();
            let mut group =
                WriterEvent::start_element("chatgrp").attr("uid0", &chat.sender_callsign);
            for (name, uid) in names.iter().zip(&chat.recipients) {
                group = group.attr(name.as_str(), uid.as_str());
            }
            writer.write(group)?;
            writer.write(WriterEvent::end_element())?;
            writer.write(WriterEvent::end_element())?;
        }
        if let Some(remarks) = &self.detail.remarks {
            writer.write(WriterEvent::start_element("remarks"))?;
            writer.write(WriterEvent::characters(remarks))?;
            writer.write(WriterEvent::end_element())?;
        }
        if let Some(link) = &self.detail.link {
            writer.write(
                WriterEvent::start_element("link")
                    .attr("uid", &link.uid)
                    .attr("type", &link.link_type)
                    .attr("relation", &link.relation),
            )?;
            writer.write(WriterEvent::end_element())?;
        }
        if let Some(location) = &self.detail.precision_location {
            writer.write(
                WriterEvent::start_element("precisionlocation")
                    .attr("altsrc", &location.altsrc)
                    .attr("geopointsrc", &location.geopointsrc),
            )?;
            writer.write(WriterEvent::end_element())?;
        }
        writer.write(WriterEvent::end_element())?; // detail

        writer.write(WriterEvent::end_element())?; // event
        Ok(())
    }

    /// Parse a single-event document.
    pub fn from_xml(document: &str) -> Result<Self, CotError> {
        let events = decode(document)?;
        events
            .into_iter()
            .next()
            .ok_or_else(|| CotError::Invalid("no event element".to_string()))
    }

    /// Reconstruct the track summary a decoded event describes, for
    /// round-trip checks and downstream consumers.
    pub fn to_track_summary(&self) -> TrackSummary {
        TrackSummary {
            track_id: self
                .detail
                .link
                .as_ref()
                .map(|l| l.uid.clone())
                .unwrap_or_else(|| self.uid.clone()),
            track_type: track_type_of(&self.cot_type),
            latitude: self.point.lat,
            longitude: self.point.lon,
            altitude_ft: (self.point.hae != 0.0).then(|| self.point.hae / 0.3048),
            speed_ms: self.detail.track.as_ref().map(|t| t.speed_ms).unwrap_or(0.0),
            heading_deg: self.detail.track.as_ref().map(|t| t.course_deg),
            callsign: self.detail.contact_callsign.clone(),
            last_update: self.time,
            created_at: self.time,
            ..TrackSummary::default()
        }
    }
}

/// Wrap events in an `<events version="2.0">` batch.
pub fn encode_batch(events: &[CotEvent]) -> Result<String, CotError> {
    let mut sink = Vec::new();
    let mut writer = EmitterConfig::new()
        .write_document_declaration(true)
        .create_writer(&mut sink);
    writer.write(WriterEvent::start_element("events").attr("version", "2.0"))?;
    for event in events {
        event.write(&mut writer)?;
    }
    writer.write(WriterEvent::end_element())?;
    String::from_utf8(sink).map_err(|e| CotError::Invalid(e.to_string()))
}

#[derive(Default)]
struct PendingEvent {
    version: Option<String>,
    uid: Option<String>,
    cot_type: Option<String>,
    time: Option<String>,
    start: Option<String>,
    stale: Option<String>,
    how: Option<String>,
    point: Option<CotPoint>,
    detail: CotDetail,
}

impl PendingEvent {
    fn finish(self) -> Result<CotEvent, CotError> {
        let uid = self.uid.ok_or(CotError::MissingAttribute("uid"))?;
        let cot_type = self.cot_type.ok_or(CotError::MissingAttribute("type"))?;
        let time = parse_time(&self.time.ok_or(CotError::MissingAttribute("time"))?)?;
        let start = match self.start {
            Some(raw) => parse_time(&raw)?,
            None => time,
        };
        let stale = match self.stale {
            Some(raw) => parse_time(&raw)?,
            None => time,
        };
        let point = self
            .point
            .ok_or_else(|| CotError::Invalid("event without point".to_string()))?;
        Ok(CotEvent {
            version: self.version.unwrap_or_else(|| "2.0".to_string()),
            uid,
            cot_type,
            time,
            start,
            stale,
            how: self.how.unwrap_or_default(),
            point,
            detail: self.detail,
        })
    }
}

fn attribute(attributes: &[xml::attribute::OwnedAttribute], name: &str) -> Option<String> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.clone())
}

fn parse_f64(value: Option<String>) -> Option<f64> {
    value.and_then(|v| v.parse().ok())
}

/// Decode a CoT document with either an `<event>` or `<events>` root.
pub fn decode(document: &str) -> Result<Vec<CotEvent>, CotError> {
    let reader = EventReader::new(document.as_bytes());
    let mut events = Vec::new();
    let mut pending: Option<PendingEvent> = None;
    let mut in_remarks = false;
    let mut remarks_text = String::new();
    let mut saw_root = false;

    for entry in reader {
        match entry? {
            ReaderEvent::StartElement {
                name, attributes, ..
            } => {
                let element = name.local_name.as_str();
                if !saw_root && element != "event" && element != "events" {
                    return Err(CotError::Invalid(format!(
                        "unexpected root element <{element}>"
                    )));
                }
                saw_root = true;
                match element {
                    "events" => {}
                    "event" => {
                        pending = Some(PendingEvent {
                            version: attribute(&attributes, "version"),
                            uid: attribute(&attributes, "uid"),
                            cot_type: attribute(&attributes, "type"),
                            time: attribute(&attributes, "time"),
                            start: attribute(&attributes, "start"),
                            stale: attribute(&attributes, "stale"),
                            how: attribute(&attributes, "how"),
                            ..PendingEvent::default()
                        });
                    }
                    "point" => {
                        if let Some(event) = &mut pending {
                            let lat = parse_f64(attribute(&attributes, "lat"));
                            let lon = parse_f64(attribute(&attributes, "lon"));
                            if let (Some(lat), Some(lon)) = (lat, lon) {
                                event.point = Some(CotPoint {
                                    lat,
                                    lon,
                                    hae: parse_f64(attribute(&attributes, "hae")).unwrap_or(0.0),
                                    ce: parse_f64(attribute(&attributes, "ce")).unwrap_or(10.0),
                                    le: parse_f64(attribute(&attributes, "le")).unwrap_or(15.0),
                                });
                            }
                        }
                    }
                    "track" => {
                        if let Some(event) = &mut pending {
                            event.detail.track = Some(CotTrack {
                                course_deg: parse_f64(attribute(&attributes, "course"))
                                    .unwrap_or(0.0),
                                speed_ms: parse_f64(attribute(&attributes, "speed")).unwrap_or(0.0),
                                climb_ms: parse_f64(attribute(&attributes, "climb")),
                            });
                        }
                    }
                    "contact" => {
                        if let Some(event) = &mut pending {
                            event.detail.contact_callsign = attribute(&attributes, "callsign");
                        }
                    }
                    "adsb" => {
                        if let Some(event) = &mut pending {
                            event.detail.adsb = Some(AdsbDetail {
                                icao24: attribute(&attributes, "icao24").unwrap_or_default(),
                                squawk: attribute(&attributes, "squawk"),
                                flight_status: attribute(&attributes, "flight_status"),
                                category: attribute(&attributes, "category"),
                                wake_turbulence: attribute(&attributes, "wake_turbulence"),
                            });
                        }
                    }
                    "emergency" => {
                        if let Some(event) = &mut pending {
                            event.detail.emergency = attribute(&attributes, "type");
                        }
                    }
                    "link" => {
                        if let Some(event) = &mut pending {
                            event.detail.link = Some(CotLink {
                                uid: attribute(&attributes, "uid").unwrap_or_default(),
                                link_type: attribute(&attributes, "type").unwrap_or_default(),
                                relation: attribute(&attributes, "relation").unwrap_or_default(),
                            });
                        }
                    }
                    "precisionlocation" => {
                        if let Some(event) = &mut pending {
                            event.detail.precision_location = Some(PrecisionLocation {
                                altsrc: attribute(&attributes, "altsrc").unwrap_or_default(),
                                geopointsrc: attribute(&attributes, "geopointsrc")
                                    .unwrap_or_default(),
                            });
                        }
                    }
                    "__chat" => {
                        if let Some(event) = &mut pending {
                            event.detail.chat = Some(ChatDetail {
                                chatroom: attribute(&attributes, "chatroom").unwrap_or_default(),
                                id: attribute(&attributes, "id").unwrap_or_default(),
                                sender_callsign: attribute(&attributes, "senderCallsign")
                                    .unwrap_or_default(),
                                recipients: Vec::new(),
                            });
                        }
                    }
                    "chatgrp" => {
                        if let Some(chat) = pending.as_mut().and_then(|e| e.detail.chat.as_mut()) {
                            let mut index = 1;
                            while let Some(uid) = attribute(&attributes, &format!("uid{index}")) {
                                chat.recipients.push(uid);
                                index += 1;
                            }
                        }
                    }
                    "remarks" => {
                        in_remarks = true;
                        remarks_text.clear();
                    }
                    _ => {}
                }
            }
            ReaderEvent::Characters(text) => {
                if in_remarks {
                    remarks_text.push_str(&text);
                }
            }
            ReaderEvent::EndElement { name } => match name.local_name.as_str() {
                "remarks" => {
                    in_remarks = false;
                    if let Some(event) = &mut pending {
                        event.detail.remarks = Some(remarks_text.clone());
                    }
                }
                "event" => {
                    if let Some(event) = pending.take() {
                        events.push(event.finish()?);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    if !saw_root {
        return Err(CotError::Invalid("empty document".to_string()));
    }
    Ok(events)
}

/// Validate the CoT shape: an `event` (or `events` of events) where every
/// event carries `version`, `uid`, `type`, `time` and a `point` with
/// `lat` and `lon`. Any other shape is rejected.
pub fn validate(document: &str) -> bool {
    let reader = EventReader::new(document.as_bytes());
    let mut depth = 0usize;
    let mut root_is_batch = false;
    let mut event_count = 0usize;
    let mut current_ok = false;
    let mut current_has_point = false;
    let mut all_ok = true;

    for entry in reader {
        let Ok(entry) = entry else { return false };
        match entry {
            ReaderEvent::StartElement {
                name, attributes, ..
            } => {
                let element = name.local_name.as_str();
                if depth == 0 {
                    match element {
                        "events" => root_is_batch = true,
                        "event" => {}
                        _ => return false,
                    }
                }
                if element == "event" {
                    if (depth == 0) == root_is_batch {
                        // an event must sit exactly under the expected root
                        return false;
                    }
                    event_count += 1;
                    current_ok = ["version", "uid", "type", "time"]
                        .iter()
                        .all(|required| attribute(&attributes, required).is_some());
                    current_has_point = false;
                }
                if element == "point" {
                    current_has_point = attribute(&attributes, "lat").is_some()
                        && attribute(&attributes, "lon").is_some();
                }
                depth += 1;
            }
            ReaderEvent::EndElement { name } => {
                depth = depth.saturating_sub(1);
                if name.local_name == "event" {
                    all_ok &= current_ok && current_has_point;
                }
            }
            _ => {}
        }
    }

    all_ok && event_count > 0
}
