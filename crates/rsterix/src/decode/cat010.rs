/**
 * Category 010 — Monosensor Surface Movement Data.
 *
 * Surface reports share their item formats with Cat 048/021; the plot
 * pipeline keeps the polar position, identity and velocity subset.
 */
use deku::prelude::*;
use serde::Serialize;

use super::fspec::Fspec;
use super::items::*;
use super::{item_length, ItemFormat, RecordParse, UapEntry};
use crate::error::DecodeError;

#[rustfmt::skip]
pub(crate) static CAT010_UAP: [Option<UapEntry>; 26] = [
    Some(UapEntry { item: "I010/010", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I010/020", format: ItemFormat::Variable }),
    Some(UapEntry { item: "I010/040", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I010/041", format: ItemFormat::Fixed(8) }),
    Some(UapEntry { item: "I010/042", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I010/200", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I010/202", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I010/161", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I010/170", format: ItemFormat::Variable }),
    Some(UapEntry { item: "I010/060", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I010/220", format: ItemFormat::Fixed(3) }),
    Some(UapEntry { item: "I010/245", format: ItemFormat::Fixed(6) }),
    Some(UapEntry { item: "I010/250", format: ItemFormat::Repetitive(8) }),
    Some(UapEntry { item: "I010/300", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I010/090", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I010/091", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I010/270", format: ItemFormat::Variable }),
    Some(UapEntry { item: "I010/550", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I010/310", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I010/500", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I010/280", format: ItemFormat::Repetitive(2) }),
    Some(UapEntry { item: "I010/131", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I010/210", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I010/140", format: ItemFormat::Fixed(3) }),
    Some(UapEntry { item: "I010/RE",  format: ItemFormat::Explicit }),
    Some(UapEntry { item: "I010/SP",  format: ItemFormat::Explicit }),
];

#[derive(Debug, Default, PartialEq, Serialize, Clone)]
pub struct Cat010Record {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSourceIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polar_position: Option<PolarPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_vector: Option<GroundVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<TrackNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_3a: Option<Mode3ACode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aircraft_address: Option<AircraftAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<Callsign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<TimeOfDay>,
}

impl Cat010Record {
    pub fn decode(data: &[u8]) -> Result<RecordParse<Self>, DecodeError> {
        let (fspec, mut pos) = Fspec::read(data)?;
        let mut record = Cat010Record::default();
        let mut truncated = false;

        for frn in fspec.items() {
            let Some(entry) = CAT010_UAP.get(frn - 1).and_then(|e| e.as_ref()) else {
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
            3 => self.polar_position = Some(PolarPosition::from_bytes((bytes, 0))?.1),
            6 => self.ground_vector = Some(GroundVector::from_bytes((bytes, 0))?.1),
            8 => self.track_number = Some(TrackNumber::from_bytes((bytes, 0))?.1),
            10 => self.mode_3a = Some(Mode3ACode::from_bytes((bytes, 0))?.1),
            11 => self.aircraft_address = Some(AircraftAddress::from_bytes((bytes, 0))?.1),
            12 => self.callsign = Callsign::decode(bytes).ok(),
            24 => self.time_of_day = Some(TimeOfDay::from_bytes((bytes, 0))?.1),
            _ => {}
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut fspec = Fspec::default();
        let mut body = Vec::new();
        let to_deku =
            |e: DekuError| DecodeError::MalformedFrame(format!("item encoding failed: {e}"));

        if let Some(item) = &self.data_source {
            fspec.set(1);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.polar_position {
            fspec.set(3);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.ground_vector {
            fspec.set(6);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.track_number {
            fspec.set(8);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.mode_3a {
            fspec.set(10);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.aircraft_address {
            fspec.set(11);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.callsign {
            fspec.set(12);
            body.extend(item.encode());
        }
        if let Some(item) = &self.time_of_day {
            fspec.set(24);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }

        let mut out = fspec.to_bytes();
        out.extend(body);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_record_round_trip() {
        let record = Cat010Record {
            data_source: Some(DataSourceIdentifier { sac: 7, sic: 1 }),
            polar_position: Some(PolarPosition::from_measurement(0.5, 213.75)),
            ground_vector: Some(GroundVector::from_measurement(15.0, 213.75)),
            callsign: Some(Callsign("GROUND1".into())),
            time_of_day: Some(TimeOfDay::from_seconds(43_200.0)),
            ..Cat010Record::default()
        };
        let encoded = record.encode().unwrap();
        let parse = Cat010Record::decode(&encoded).unwrap();
        assert!(!parse.truncated);
        assert_eq!(parse.consumed, encoded.len());
        assert_eq!(parse.record, record);
    }

    #[test]
    fn four_octet_fspec() {
        let record = Cat010Record {
            data_source: Some(DataSourceIdentifier { sac: 7, sic: 1 }),
            time_of_day: Some(TimeOfDay::from_seconds(0.5)),
            ..Cat010Record::default()
        };
        let encoded = record.encode().unwrap();
        // FRN 24 sits in the fourth FSPEC octet
        assert_eq!(encoded[0] & 0x01, 0x01);
        assert_eq!(encoded[1] & 0x01, 0x01);
        assert_eq!(encoded[2] & 0x01, 0x01);
        assert_eq!(encoded[3] & 0x01, 0x00);
        let parse = Cat010Record::decode(&encoded).unwrap();
        assert_eq!(parse.record, record);
    }
}
