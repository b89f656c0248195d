/**
 * Category 021 — ADS-B Target Reports.
 *
 * Positions arrive directly in WGS-84, so no polar conversion applies;
 * the plot keeps the reported coordinates and the transponder identity.
 */
use deku::prelude::*;
use serde::Serialize;

use super::fspec::Fspec;
use super::items::*;
use super::{item_length, ItemFormat, RecordParse, UapEntry};
use crate::error::DecodeError;

#[rustfmt::skip]
pub(crate) static CAT021_UAP: [Option<UapEntry>; 28] = [
    Some(UapEntry { item: "I021/010", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/040", format: ItemFormat::Fixed(6) }),
    Some(UapEntry { item: "I021/030", format: ItemFormat::Fixed(3) }),
    Some(UapEntry { item: "I021/130", format: ItemFormat::Fixed(8) }),
    Some(UapEntry { item: "I021/080", format: ItemFormat::Fixed(3) }),
    Some(UapEntry { item: "I021/140", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/090", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/210", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I021/230", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/145", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/150", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/151", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/152", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/155", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/157", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/160", format: ItemFormat::Fixed(4) }),
    Some(UapEntry { item: "I021/165", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/170", format: ItemFormat::Fixed(6) }),
    Some(UapEntry { item: "I021/095", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I021/032", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I021/200", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I021/020", format: ItemFormat::Variable }),
    Some(UapEntry { item: "I021/220", format: ItemFormat::Compound }),
    Some(UapEntry { item: "I021/146", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/148", format: ItemFormat::Fixed(2) }),
    Some(UapEntry { item: "I021/110", format: ItemFormat::Variable }),
    Some(UapEntry { item: "I021/016", format: ItemFormat::Fixed(1) }),
    Some(UapEntry { item: "I021/008", format: ItemFormat::Fixed(1) }),
];

#[derive(Debug, Default, PartialEq, Serialize, Clone)]
pub struct Cat021Record {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSourceIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Wgs84Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<TimeOfDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aircraft_address: Option<AircraftAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_level: Option<FlightLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<Callsign>,
}

impl Cat021Record {
    pub fn decode(data: &[u8]) -> Result<RecordParse<Self>, DecodeError> {
        let (fspec, mut pos) = Fspec::read(data)?;
        let mut record = Cat021Record::default();
        let mut truncated = false;

        for frn in fspec.items() {
            let Some(entry) = CAT021_UAP.get(frn - 1).and_then(|e| e.as_ref()) else {
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
            2 => self.position = Some(Wgs84Position::from_bytes((bytes, 0))?.1),
            3 => self.time_of_day = Some(TimeOfDay::from_bytes((bytes, 0))?.1),
            5 => self.aircraft_address = Some(AircraftAddress::from_bytes((bytes, 0))?.1),
            10 => self.flight_level = Some(FlightLevel::from_bytes((bytes, 0))?.1),
            18 => self.callsign = Callsign::decode(bytes).ok(),
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
        if let Some(item) = &self.position {
            fspec.set(2);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.time_of_day {
            fspec.set(3);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.aircraft_address {
            fspec.set(5);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.flight_level {
            fspec.set(10);
            body.extend(item.to_bytes().map_err(to_deku)?);
        }
        if let Some(item) = &self.callsign {
            fspec.set(18);
            body.extend(item.encode());
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
    fn wgs84_record_round_trip() {
        let record = Cat021Record {
            data_source: Some(DataSourceIdentifier { sac: 0, sic: 2 }),
            position: Some(Wgs84Position::from_degrees(28.0836, -80.6081)),
            aircraft_address: Some(AircraftAddress(0x123456)),
            flight_level: Some(FlightLevel::from_level(120.0)),
            callsign: Some(Callsign("N123AB".into())),
            ..Cat021Record::default()
        };
        let encoded = record.encode().unwrap();
        let parse = Cat021Record::decode(&encoded).unwrap();
        assert!(!parse.truncated);
        assert_eq!(parse.consumed, encoded.len());
        assert_eq!(parse.record, record);

        let position = parse.record.position.unwrap();
        assert!((position.latitude_deg() - 28.0836).abs() < 1e-4);
        assert!((position.longitude_deg() + 80.6081).abs() < 1e-4);
    }

    #[test]
    fn address_spans_two_fspec_octets() {
        let record = Cat021Record {
            data_source: Some(DataSourceIdentifier { sac: 0, sic: 2 }),
            aircraft_address: Some(AircraftAddress(0xABCDEF)),
            ..Cat021Record::default()
        };
        let encoded = record.encode().unwrap();
        // FRN 5 sits in the first octet, so a single-octet FSPEC suffices
        assert_eq!(encoded[0] & 0x01, 0x00);
        let parse = Cat021Record::decode(&encoded).unwrap();
        assert_eq!(
            parse.record.aircraft_address,
            Some(AircraftAddress(0xABCDEF))
        );
    }

    #[test]
    fn callsign_needs_second_octet() {
        let record = Cat021Record {
            callsign: Some(Callsign("TEST01".into())),
            ..Cat021Record::default()
        };
        let encoded = record.encode().unwrap();
        // FRN 18 lives in the third FSPEC octet
        assert_eq!(encoded[0] & 0x01, 0x01);
        assert_eq!(encoded[1] & 0x01, 0x01);
        let parse = Cat021Record::decode(&encoded).unwrap();
        assert_eq!(parse.record.callsign, Some(Callsign("TEST01".into())));
    }
}
