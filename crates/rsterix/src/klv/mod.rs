/**
 * MISB KLV codec: ST 0601 (UAS Datalink Local Set) and ST 0902 (VMTi
 * Local Set).
 *
 * A packet is a 16-byte SMPTE Universal Key, a BER-encoded length, and a
 * Local Set of BER-OID-keyed items. The first item of every Local Set is
 * the 16-bit checksum,
 * `(0x10000 − Σ 16-bit big-endian words) mod 0x10000`, computed over the
 * universal key and every item that follows the checksum item. A packet
 * whose stored checksum does not match is rejected whole.
 */
pub mod st0601;
pub mod st0902;

use chrono::{DateTime, Utc};

use crate::error::KlvError;
use crate::track::TrackSummary;
pub use st0601::UasDatalinkSet;
pub use st0902::{VmtiSet, VmtiTarget};

/// MISB ST 0601 UAS Datalink Local Set Universal Key.
pub const UAS_DATALINK_LS_KEY: [u8; 16] = [
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x0B, 0x01, 0x01, 0x0E, 0x01, 0x03, 0x01, 0x01, 0x00, 0x00,
    0x00,
];

/// MISB ST 0902 VMTi Local Set Universal Key. Differs from ST 0601 in
/// byte 12 (0x06 instead of 0x01).
pub const VMTI_LS_KEY: [u8; 16] = [
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x0B, 0x01, 0x01, 0x0E, 0x01, 0x03, 0x03, 0x06, 0x00, 0x00,
    0x00,
];

const CHECKSUM_KEY: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KlvStandard {
    #[default]
    St0601,
    St0902,
}

impl std::str::FromStr for KlvStandard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "st0601" | "0601" => Ok(KlvStandard::St0601),
            "st0902" | "0902" => Ok(KlvStandard::St0902),
            other => Err(format!("unknown KLV standard {other:?}")),
        }
    }
}

/// One decoded packet, tagged by standard.
#[derive(Debug, Clone, PartialEq)]
pub enum KlvPacket {
    St0601(UasDatalinkSet),
    St0902(VmtiSet),
}

/// BER length: short form up to 127, long form `0x8n` plus n big-endian
/// octets beyond.
pub fn encode_ber_length(length: usize) -> Vec<u8> {
    if length <= 127 {
        return vec![length as u8];
    }
    let mut octets = Vec::new();
    let mut remaining = length;
    while remaining > 0 {
        octets.insert(0, (remaining & 0xFF) as u8);
        remaining >>= 8;
    }
    let mut out = vec![0x80 | octets.len() as u8];
    out.extend(octets);
    out
}

/// Returns `(length, octets consumed)`.
pub fn decode_ber_length(data: &[u8]) -> Result<(usize, usize), KlvError> {
    let first = *data.first().ok_or(KlvError::Truncated("BER length"))?;
    if first <= 127 {
        return Ok((first as usize, 1));
    }
    let count = (first & 0x7F) as usize;
    if count == 0 || count > 8 {
        return Err(KlvError::BadLength);
    }
    if data.len() < 1 + count {
        return Err(KlvError::Truncated("BER length"));
    }
    let mut length = 0usize;
    for &octet in &data[1..1 + count] {
        length = (length << 8) | octet as usize;
    }
    Ok((length, 1 + count))
}

/// BER-OID key: 7 bits per octet, MSB set on every non-terminal octet.
pub fn encode_ber_oid(key: u32) -> Vec<u8> {
    if key <= 127 {
        return vec![key as u8];
    }
    let mut out = vec![(key & 0x7F) as u8];
    let mut remaining = key >> 7;
    while remaining > 0 {
        out.insert(0, ((remaining & 0x7F) as u8) | 0x80);
        remaining >>= 7;
    }
    out
}

/// Returns `(key, octets consumed)`.
pub fn decode_ber_oid(data: &[u8]) -> Result<(u32, usize), KlvError> {
    let mut key = 0u32;
    for (index, &octet) in data.iter().enumerate() {
        if index >= 4 {
            return Err(KlvError::BadLength);
        }
        key = (key << 7) | (octet & 0x7F) as u32;
        if octet & 0x80 == 0 {
            return Ok((key, index + 1));
        }
    }
    Err(KlvError::Truncated("BER-OID key"))
}

/// Running 16-bit checksum over big-endian words; a trailing odd byte
/// contributes as the high half of a word.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = 0u16;
    for chunk in data.chunks(2) {
        let word = if chunk.len() == 2 {
            u16::from_be_bytes([chunk[0], chunk[1]])
        } else {
            (chunk[0] as u16) << 8
        };
        sum = sum.wrapping_add(word);
    }
    (0x10000u32 - sum as u32) as u16
}

/// Serialises `key`/`length`/`value` items into a Local Set body.
#[derive(Debug, Default)]
pub(crate) struct LocalSetWriter {
    buf: Vec<u8>,
}

impl LocalSetWriter {
    pub fn put(&mut self, key: u32, value: &[u8]) {
        self.buf.extend(encode_ber_oid(key));
        self.buf.extend(encode_ber_length(value.len()));
        self.buf.extend_from_slice(value);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Iterates `(key, value)` items of a Local Set body.
pub(crate) struct LocalSetReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LocalSetReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        LocalSetReader { data, pos: 0 }
    }
}

impl<'a> Iterator for LocalSetReader<'a> {
    type Item = Result<(u32, &'a [u8]), KlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        let step = (|| {
            let (key, key_len) = decode_ber_oid(rest)?;
            let (length, length_len) = decode_ber_length(&rest[key_len..])?;
            let start = key_len + length_len;
            if rest.len() < start + length {
                return Err(KlvError::Truncated("local set item"));
            }
            Ok((key, &rest[start..start + length], start + length))
        })();
        match step {
            Ok((key, value, consumed)) => {
                self.pos += consumed;
                Some(Ok((key, value)))
            }
            Err(e) => {
                self.pos = self.data.len();
                Some(Err(e))
            }
        }
    }
}

/// Assemble a full packet: checksum item first, BER length, universal key.
pub(crate) fn seal_packet(universal_key: &[u8; 16], items: Vec<u8>) -> Vec<u8> {
    let mut checksummed = Vec::with_capacity(16 + items.len());
    checksummed.extend_from_slice(universal_key);
    checksummed.extend_from_slice(&items);
    let sum = checksum(&checksummed);

    let mut local_set = Vec::with_capacity(items.len() + 4);
    local_set.extend(encode_ber_oid(CHECKSUM_KEY));
    local_set.extend(encode_ber_length(2));
    local_set.extend(sum.to_be_bytes());
    local_set.extend(items);

    let mut packet = Vec::with_capacity(16 + 5 + local_set.len());
    packet.extend_from_slice(universal_key);
    packet.extend(encode_ber_length(local_set.len()));
    packet.extend(local_set);
    packet
}

/// Split a packet, verify its checksum, and hand back the items after the
/// checksum item plus the total octets consumed.
pub(crate) fn open_packet<'a>(
    data: &'a [u8],
    universal_key: &[u8; 16],
) -> Result<(&'a [u8], usize), KlvError> {
    if data.len() < 16 {
        return Err(KlvError::Truncated("universal key"));
    }
    if &data[..16] != universal_key {
        return Err(KlvError::UnknownKey(hex::encode(&data[..16])));
    }
    let (length, length_len) = decode_ber_length(&data[16..])?;
    let total = 16 + length_len + length;
    if data.len() < total {
        return Err(KlvError::Truncated("local set"));
    }
    let local_set = &data[16 + length_len..total];

    let (key, key_len) = decode_ber_oid(local_set)?;
    if key != CHECKSUM_KEY {
        return Err(KlvError::MissingChecksum);
    }
    let (value_len, value_len_len) = decode_ber_length(&local_set[key_len..])?;
    if value_len != 2 || local_set.len() < key_len + value_len_len + 2 {
        return Err(KlvError::MissingChecksum);
    }
    let stored = u16::from_be_bytes([
        local_set[key_len + value_len_len],
        local_set[key_len + value_len_len + 1],
    ]);
    let items = &local_set[key_len + value_len_len + 2..];

    let mut checksummed = Vec::with_capacity(16 + items.len());
    checksummed.extend_from_slice(universal_key);
    checksummed.extend_from_slice(items);
    let computed = checksum(&checksummed);
    if computed != stored {
        return Err(KlvError::ChecksumFailure { stored, computed });
    }
    Ok((items, total))
}

/// Decode one packet, dispatching on the universal key.
pub fn decode_packet(data: &[u8]) -> Result<KlvPacket, KlvError> {
    if data.len() >= 16 && data[..16] == UAS_DATALINK_LS_KEY {
        return Ok(KlvPacket::St0601(UasDatalinkSet::decode(data)?.0));
    }
    if data.len() >= 16 && data[..16] == VMTI_LS_KEY {
        return Ok(KlvPacket::St0902(VmtiSet::decode(data)?.0));
    }
    if data.len() < 16 {
        return Err(KlvError::Truncated("universal key"));
    }
    Err(KlvError::UnknownKey(hex::encode(&data[..16])))
}

/// Decode a stream of concatenated packets.
pub fn decode_stream(data: &[u8]) -> Result<Vec<KlvPacket>, KlvError> {
    let mut packets = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let rest = &data[pos..];
        let (packet, consumed) = if rest.len() >= 16 && rest[..16] == UAS_DATALINK_LS_KEY {
            let (set, consumed) = UasDatalinkSet::decode(rest)?;
            (KlvPacket::St0601(set), consumed)
        } else if rest.len() >= 16 && rest[..16] == VMTI_LS_KEY {
            let (set, consumed) = VmtiSet::decode(rest)?;
            (KlvPacket::St0902(set), consumed)
        } else {
            return Err(KlvError::UnknownKey(hex::encode(
                &rest[..rest.len().min(16)],
            )));
        };
        packets.push(packet);
        pos += consumed;
    }
    Ok(packets)
}

/// Encode every track as one packet of the chosen standard, concatenated.
pub fn encode_stream(
    tracks: &[TrackSummary],
    standard: KlvStandard,
    now: DateTime<Utc>,
) -> Vec<u8> {
    let mut stream = Vec::new();
    for track in tracks {
        match standard {
            KlvStandard::St0601 => {
                stream.extend(UasDatalinkSet::from_track(track, now).encode())
            }
            KlvStandard::St0902 => stream.extend(VmtiSet::from_track(track, now).encode()),
        }
    }
    stream
}

/// Structural validation: known universal key and a BER length that
/// matches the packet size exactly.
pub fn validate_packet(data: &[u8]) -> bool {
    if data.len() < 17 {
        return false;
    }
    if data[..16] != UAS_DATALINK_LS_KEY && data[..16] != VMTI_LS_KEY {
        return false;
    }
    match decode_ber_length(&data[16..]) {
        Ok((length, length_len)) => data.len() == 16 + length_len + length,
        Err(_) => false,
    }
}

// value codecs shared by both local sets

pub(crate) fn read_u8(value: &[u8]) -> Result<u8, KlvError> {
    value
        .first()
        .copied()
        .ok_or(KlvError::Truncated("uint8 value"))
}

pub(crate) fn read_u16(value: &[u8]) -> Result<u16, KlvError> {
    if value.len() < 2 {
        return Err(KlvError::Truncated("uint16 value"));
    }
    Ok(u16::from_be_bytes([value[0], value[1]]))
}

pub(crate) fn read_i16(value: &[u8]) -> Result<i16, KlvError> {
    read_u16(value).map(|v| v as i16)
}

pub(crate) fn read_u32(value: &[u8]) -> Result<u32, KlvError> {
    if value.len() < 4 {
        return Err(KlvError::Truncated("uint32 value"));
    }
    Ok(u32::from_be_bytes([value[0], value[1], value[2], value[3]]))
}

pub(crate) fn read_i32(value: &[u8]) -> Result<i32, KlvError> {
    read_u32(value).map(|v| v as i32)
}

pub(crate) fn read_u64(value: &[u8]) -> Result<u64, KlvError> {
    if value.len() < 8 {
        return Err(KlvError::Truncated("uint64 value"));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&value[..8]);
    Ok(u64::from_be_bytes(bytes))
}

pub(crate) fn read_string(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

/// ST 0601/0902 latitude scaling: `raw · 90 / (2³¹ − 1)` degrees.
pub(crate) fn encode_latitude(degrees: f64) -> i32 {
    (degrees * (i32::MAX as f64) / 90.0).round() as i32
}

pub(crate) fn decode_latitude(raw: i32) -> f64 {
    raw as f64 * 90.0 / i32::MAX as f64
}

/// Longitude scaling: `raw · 180 / (2³¹ − 1)` degrees.
pub(crate) fn encode_longitude(degrees: f64) -> i32 {
    (degrees * (i32::MAX as f64) / 180.0).round() as i32
}

pub(crate) fn decode_longitude(raw: i32) -> f64 {
    raw as f64 * 180.0 / i32::MAX as f64
}

/// Heading scaling: `raw · 360 / 65536` degrees.
pub(crate) fn encode_heading(degrees: f64) -> u16 {
    ((degrees.rem_euclid(360.0)) * 65536.0 / 360.0).round() as u16
}

pub(crate) fn decode_heading(raw: u16) -> f64 {
    raw as f64 * 360.0 / 65536.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ber_length_forms() {
        assert_eq!(encode_ber_length(0), vec![0x00]);
        assert_eq!(encode_ber_length(127), vec![0x7F]);
        assert_eq!(encode_ber_length(128), vec![0x81, 0x80]);
        assert_eq!(encode_ber_length(300), vec![0x82, 0x01, 0x2C]);

        assert_eq!(decode_ber_length(&[0x7F]).unwrap(), (127, 1));
        assert_eq!(decode_ber_length(&[0x81, 0x80]).unwrap(), (128, 2));
        assert_eq!(decode_ber_length(&[0x82, 0x01, 0x2C]).unwrap(), (300, 3));
        assert!(decode_ber_length(&[0x80]).is_err());
        assert!(decode_ber_length(&[]).is_err());
    }

    #[test]
    fn ber_oid_keys() {
        assert_eq!(encode_ber_oid(1), vec![0x01]);
        assert_eq!(encode_ber_oid(127), vec![0x7F]);
        assert_eq!(encode_ber_oid(128), vec![0x81, 0x00]);
        assert_eq!(encode_ber_oid(200), vec![0x81, 0x48]);

        for key in [1u32, 101, 127, 128, 200, 16384] {
            let encoded = encode_ber_oid(key);
            assert_eq!(decode_ber_oid(&encoded).unwrap(), (key, encoded.len()));
        }
    }

    #[test]
    fn checksum_cancels_itself() {
        let data = b"surveillance metadata";
        let sum = checksum(data);
        // appending the complement word drives the running sum to zero
        let mut whole = data.to_vec();
        whole.extend(sum.to_be_bytes());
        let mut total = 0u16;
        for chunk in whole.chunks(2) {
            let word = if chunk.len() == 2 {
                u16::from_be_bytes([chunk[0], chunk[1]])
            } else {
                (chunk[0] as u16) << 8
            };
            total = total.wrapping_add(word);
        }
        assert_eq!(total, 0);
    }

    #[test]
    fn local_set_reader_walks_items() {
        let mut writer = LocalSetWriter::default();
        writer.put(2, &[0xAA; 8]);
        writer.put(65, &[16]);
        writer.put(200, b"wide key");
        let bytes = writer.into_bytes();

        let items: Vec<(u32, Vec<u8>)> = LocalSetReader::new(&bytes)
            .map(|item| item.map(|(k, v)| (k, v.to_vec())))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], (2, vec![0xAA; 8]));
        assert_eq!(items[1], (65, vec![16]));
        assert_eq!(items[2], (200, b"wide key".to_vec()));
    }

    #[test]
    fn seal_and_open_round_trip() {
        let mut writer = LocalSetWriter::default();
        writer.put(2, &1_718_000_000_000_000u64.to_be_bytes());
        writer.put(65, &[16]);
        let packet = seal_packet(&UAS_DATALINK_LS_KEY, writer.into_bytes());

        assert!(validate_packet(&packet));
        let (items, consumed) = open_packet(&packet, &UAS_DATALINK_LS_KEY).unwrap();
        assert_eq!(consumed, packet.len());
        let parsed: Vec<u32> = LocalSetReader::new(items)
            .map(|item| item.map(|(k, _)| k))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(parsed, vec![2, 65]);
    }

    #[test]
    fn any_payload_flip_fails_the_checksum() {
        let mut writer = LocalSetWriter::default();
        writer.put(2, &1_718_000_000_000_000u64.to_be_bytes());
        writer.put(3, b"MISSION-7");
        let packet = seal_packet(&UAS_DATALINK_LS_KEY, writer.into_bytes());
        let (length, length_len) = decode_ber_length(&packet[16..]).unwrap();
        assert_eq!(packet.len(), 16 + length_len + length);

        // every byte after the checksum item value participates
        let first_item = 16 + length_len + 4;
        for index in first_item..packet.len() {
            let mut corrupted = packet.clone();
            corrupted[index] ^= 0x01;
            assert!(
                matches!(
                    open_packet(&corrupted, &UAS_DATALINK_LS_KEY),
                    Err(KlvError::ChecksumFailure { .. })
                ),
                "flip at {index} went unnoticed"
            );
        }

        // flipping the stored checksum itself is also caught
        let mut corrupted = packet.clone();
        corrupted[first_item - 1] ^= 0x01;
        assert!(open_packet(&corrupted, &UAS_DATALINK_LS_KEY).is_err());
    }

    #[test]
    fn wrong_universal_key_is_rejected() {
        let packet = seal_packet(&UAS_DATALINK_LS_KEY, Vec::new());
        assert!(matches!(
            open_packet(&packet, &VMTI_LS_KEY),
            Err(KlvError::UnknownKey(_))
        ));
    }

    #[test]
    fn universal_keys_differ_in_byte_12() {
        assert_eq!(UAS_DATALINK_LS_KEY[12], 0x01);
        assert_eq!(VMTI_LS_KEY[12], 0x06);
        assert_eq!(UAS_DATALINK_LS_KEY[..12], VMTI_LS_KEY[..12]);
        assert_eq!(UAS_DATALINK_LS_KEY[13..], VMTI_LS_KEY[13..]);
    }

    #[test]
    fn coordinate_scalings() {
        let lat = 28.0836;
        assert!((decode_latitude(encode_latitude(lat)) - lat).abs() < 1e-7);
        let lon = -80.6081;
        assert!((decode_longitude(encode_longitude(lon)) - lon).abs() < 1e-7);
        let heading = 271.5;
        assert!((decode_heading(encode_heading(heading)) - heading).abs() < 0.01);
    }
}
