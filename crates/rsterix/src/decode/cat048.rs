/**
 * Category 048 — Monoradar Target Reports.
 *
 * The UAP covers 28 field reference numbers over four FSPEC octets; the
 * decoder extracts the engineering subset used by the plot pipeline and
 * walks the remaining items by their declared formats so that a record
 * carrying unmodelled items still parses.
 */
use deku::prelude::*;
use serde::Serialize;

use super::fspec::Fspec;
use super::items::*;
use super::{item_length, ItemFormat, RecordParse, UapEntry};
use crate::error::DecodeError;

#[rustfmt::skip]
pub(crate) static CAT048_UAP: [Option<UapEntry>; 28] = [
    Some(UapEntry { item: "I048/010", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/140", format: ItemFormat::Fixed(3) }),
    Some(UapEntry { item: "I048/020", format: ItemFormat::Variable }),
    Some(UapEntry { item: "I048/040", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I048/070", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/090", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/130", format: ItemFormat::Compound }),
    Some(UapEntry { item: "I048/220", format: ItemFormat::Fixed(3) }),
    Some(UapEntry { item: "I048/240", format: ItemFormat::Fixed(6) }),
    Some(UapEntry { item: "I048/250", format: ItemFormat::Repetitive(8) }),
    Some(UapEntry { item: "I048/161", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/042", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I048/200", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I048/170", format: ItemFormat::Variable }),
    Some(UapEntry { item: "I048/210", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I048/030", format: ItemFormat::Variable }),
    Some(UapEntry { item: "I048/080", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/100", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I048/110", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/120", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/230", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/260", format: ItemFormat::Fixed(7) }),
    Some(UapEntry { item: "I048/055", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I048/050", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/065", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I048/060", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I048/SP",  format: ItemFormat::Explicit }),
    Some(UapEntry { item: "I048/RE",  format: ItemFormat::Explicit }),
];

/// One decoded Cat 048 record. Absent items are `None`.
#[derive(Debug, Default, PartialEq, Serialize, Clone)]
pub struct Cat048Record {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSourceIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<TimeOfDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_descriptor: Option<TargetDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polar_position: Option<PolarPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_3a: Option<Mode3ACode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_level: Option<FlightLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_characteristics: Option<PlotCharacteristics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aircraft_address: Option<AircraftAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<Callsign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<TrackNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_vector: Option<GroundVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_status: Option<TrackStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<WarningConditions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doppler_speed: Option<DopplerSpeed>,
}

impl Cat048Record {
    pub fn decode(data: &[u8]) -> Result<RecordParse<Self>, DecodeError> {
        let (fspec, mut pos) = Fspec::read(data)?;
        let mut record = Cat048Record::default();
        let mut truncated = false;

        for frn in fspec.items() {
            let Some(entry) = CAT048_UAP.get(frn - 1).and_then(|e| e.as_ref()) else {
                truncated = true;
                break;
            };
            let Some(len) = item_length(&entry.format, &data[pos..]) else {
                super::note_short_item(entry.item);
                truncated = true;
                break;
            };
            if record.apply_item(frn, &data[pos..pos + len]).is_err() {
                super::note_short_item(entry.item);
                truncated = true;
                break;
            }
            pos += len;
        }

        Ok(RecordParse {
            record,
            consumed: pos,
            truncated,
        })
    }

    fn apply_item(&mut self, frn: usize, bytes: &[u8]) -> Result<(), DekuError> {
        match frn {
            1 => self.data_source = Some(DataSourceIdentifier::from_bytes((bytes, 0))?.1),
            2 => self.time_of_day = Some(TimeOfDay::from_bytes((bytes, 0))?.1),
            3 => self.target_descriptor = Some(TargetDescriptor::from_bytes((bytes, 0))?.1),
            4 => self.polar_position = Some(PolarPosition::from_bytes((bytes, 0))?.1),
            5 => self.mode_3a = Some(Mode3ACode::from_bytes((bytes, 0))?.1),
            6 => self.flight_level = Some(FlightLevel::from_bytes((bytes, 0))?.1),
            7 => {
                self.plot_characteristics = PlotCharacteristics::decode(bytes)
                    .ok()
                    .map(|(item, _)| item)
            }
            8 => self.aircraft_address = Some(AircraftAddress::from_bytes((bytes, 0))?.1),
            9 => self.callsign = Callsign::decode(bytes).ok(),
            11 => self.track_number = Some(TrackNumber::from_bytes((bytes, 0))?.1),
            13 => self.ground_vector = Some(GroundVector::from_bytes((bytes, 0))?.1),
            14 => self.track_status = Some(TrackStatus::from_bytes((bytes, 0))?.1),
            16 => self.warnings = WarningConditions::decode(bytes).ok().map(|(item, _)| item),
            20 => self.doppler_speed = Some(DopplerSpeed::from_bytes((bytes, 0))?.1),
            _ => {} // consumed but not modelled
        }
        Ok(())
    }

    /// Encode the record (FSPEC plus items in UAP order). Only the
    /// modelled items are emitted; [`Self::decode`] of the result yields
    /// the record back.
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut fspec = Fspec::default();
        let mut body = Vec::new();
        let to_deku =
            |e: DekuError| DecodeError::MalformedFrame(format!("item encoding failed: {e}"));

        if let Some(item) = &self.data_source {
            fspec.set(1);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.time_of_day {
            fspec.set(2);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.target_descriptor {
            fspec.set(3);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.polar_position {
            fspec.set(4);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.mode_3a {
            fspec.set(5);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.flight_level {
            fspec.set(6);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.plot_characteristics {
            fspec.set(7);
            body.extend(item.encode());
        }
        if let Some(item) = &self.aircraft_address {
            fspec.set(8);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.callsign {
            fspec.set(9);
            body.extend(item.encode());
        }
        if let Some(item) = &self.track_number {
            fspec.set(11);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.ground_vector {
            fspec.set(13);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.track_status {
            fspec.set(14);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.warnings {
            fspec.set(16);
            body.extend(item.encode());
        }
        if let Some(item) = &self.doppler_speed {
            fspec.set(20);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }

        let mut out = fspec.to_bytes();
        out.extend(body);
        Ok(out)
    }
}
