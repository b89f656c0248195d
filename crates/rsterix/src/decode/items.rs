/**
 * Data item payloads shared by the Category 10, 21 and 48 UAPs.
 *
 * Fixed-format items are deku structs so that the bit layout is written
 * once and both directions (decode for the pipeline, encode for fixtures
 * and round-trip checks) derive from it. Items whose length depends on
 * their content (FX chains, compound presence octets, 6-bit text) carry
 * hand-written codecs.
 */
use deku::prelude::*;
use serde::ser::{Serialize, Serializer};
use std::fmt;

use crate::error::DecodeError;

/// SAC/SIC pair identifying the data source (I048/010, I021/010, I010/010)
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct DataSourceIdentifier {
    pub sac: u8,
    pub sic: u8,
}

impl fmt::Display for DataSourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}/{:03}", self.sac, self.sic)
    }
}

/// Measured position in polar coordinates (I048/040, I010/040)
///
/// ρ has a 1/256 NM LSB, θ a 360/2¹⁶ degree LSB.
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct PolarPosition {
    #[deku(endian = "big")]
    pub rho: u16,
    #[deku(endian = "big")]
    pub theta: u16,
}

impl PolarPosition {
    pub fn range_nm(&self) -> f64 {
        self.rho as f64 / 256.0
    }

    pub fn azimuth_deg(&self) -> f64 {
        self.theta as f64 * 360.0 / 65536.0
    }

    pub fn from_measurement(range_nm: f64, azimuth_deg: f64) -> Self {
        PolarPosition {
            rho: (range_nm * 256.0).round() as u16,
            theta: ((azimuth_deg.rem_euclid(360.0)) * 65536.0 / 360.0).round() as u16,
        }
    }
}

/// Mode 3/A code (I048/070, I010/060), 12 bits of octal digits plus the
/// V/G/L status bits in the upper nibble.
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct Mode3ACode(#[deku(endian = "big")] pub u16);

impl Mode3ACode {
    pub fn code(&self) -> u16 {
        self.0 & 0x0FFF
    }

    /// The conventional 4-digit octal rendering, e.g. `"1234"`.
    pub fn octal_string(&self) -> String {
        format!("{:04o}", self.code())
    }

    pub fn from_octal(code: &str) -> Option<Self> {
        u16::from_str_radix(code, 8)
            .ok()
            .filter(|c| *c <= 0o7777)
            .map(Mode3ACode)
    }
}

impl fmt::Display for Mode3ACode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.octal_string())
    }
}

/// Flight level in binary representation (I048/090, I021/145), 1/4 FL LSB,
/// signed.
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct FlightLevel(#[deku(endian = "big")] pub i16);

impl FlightLevel {
    pub fn level(&self) -> f64 {
        self.0 as f64 / 4.0
    }

    /// Flight levels are hundreds of feet.
    pub fn altitude_ft(&self) -> f64 {
        self.level() * 100.0
    }

    pub fn from_level(level: f64) -> Self {
        FlightLevel((level * 4.0).round() as i16)
    }
}

/// Radial Doppler speed (I048/120), 1 kt LSB, signed, positive away from
/// the radar.
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct DopplerSpeed(#[deku(endian = "big")] pub i16);

impl DopplerSpeed {
    pub fn speed_kt(&self) -> f64 {
        self.0 as f64
    }

    pub fn speed_ms(&self) -> f64 {
        self.0 as f64 * 0.514444
    }
}

/// Time of day (I048/140, I021/030, I010/140): seconds since UTC midnight,
/// 1/128 s LSB, on 24 bits.
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct TimeOfDay(#[deku(bits = "24", endian = "big")] pub u32);

impl TimeOfDay {
    pub fn seconds(&self) -> f64 {
        self.0 as f64 / 128.0
    }

    pub fn from_seconds(seconds: f64) -> Self {
        TimeOfDay(((seconds.rem_euclid(86_400.0)) * 128.0).round() as u32 & 0x00FF_FFFF)
    }
}

/// Local track number (I048/161, I010/161)
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct TrackNumber(#[deku(endian = "big")] pub u16);

/// Calculated track velocity in polar coordinates (I048/200, I010/200):
/// ground speed with a 1 kt LSB, heading with a 360/2¹⁶ degree LSB.
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct GroundVector {
    #[deku(endian = "big")]
    pub speed: u16,
    #[deku(endian = "big")]
    pub heading: u16,
}

impl GroundVector {
    pub fn speed_kt(&self) -> f64 {
        self.speed as f64
    }

    pub fn speed_ms(&self) -> f64 {
        self.speed as f64 * 0.514444
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading as f64 * 360.0 / 65536.0
    }

    pub fn from_measurement(speed_kt: f64, heading_deg: f64) -> Self {
        GroundVector {
            speed: speed_kt.round() as u16,
            heading: ((heading_deg.rem_euclid(360.0)) * 65536.0 / 360.0).round() as u16,
        }
    }
}

/// 24-bit ICAO aircraft address (I048/220, I021/080, I010/220)
#[derive(PartialEq, Eq, PartialOrd, Ord, DekuRead, DekuWrite, Hash, Copy, Clone)]
pub struct AircraftAddress(#[deku(bits = "24", endian = "big")] pub u32);

impl fmt::Debug for AircraftAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

impl fmt::Display for AircraftAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

impl Serialize for AircraftAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:06X}", self.0))
    }
}

impl core::str::FromStr for AircraftAddress {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(u32::from_str_radix(s, 16)?))
    }
}

/// The IA-5 subset used by the 6-bit callsign packing.
const CALLSIGN_CHARSET: &[u8; 64] =
    b" ABCDEFGHIJKLMNOPQRSTUVWXYZ????? ???????????????0123456789??????";

/// Aircraft identification (I048/240, I021/170, I010/245): eight
/// characters packed four per three octets, trailing spaces trimmed.
#[derive(Debug, PartialEq, Eq, serde::Serialize, Clone)]
pub struct Callsign(pub String);

impl Callsign {
    pub const ENCODED_LEN: usize = 6;

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < Self::ENCODED_LEN {
            return Err(DecodeError::ShortItem { item: "callsign" });
        }
        let mut callsign = String::with_capacity(8);
        for chunk in data[..Self::ENCODED_LEN].chunks(3) {
            let val = ((chunk[0] as u32) << 16) | ((chunk[1] as u32) << 8) | chunk[2] as u32;
            for shift in [18u32, 12, 6, 0] {
                callsign.push(CALLSIGN_CHARSET[((val >> shift) & 0x3F) as usize] as char);
            }
        }
        Ok(Callsign(callsign.trim_end().to_string()))
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut sixbit = [0u8; 8];
        for (i, slot) in sixbit.iter_mut().enumerate() {
            let c = self.0.as_bytes().get(i).copied().unwrap_or(b' ');
            *slot = match c {
                b'A'..=b'Z' => c - b'A' + 1,
                b'0'..=b'9' => c - b'0' + 48,
                _ => 32, // anything unmappable packs as space
            };
        }
        let mut out = [0u8; Self::ENCODED_LEN];
        for (i, chunk) in sixbit.chunks(4).enumerate() {
            let val = ((chunk[0] as u32) << 18)
                | ((chunk[1] as u32) << 12)
                | ((chunk[2] as u32) << 6)
                | chunk[3] as u32;
            out[i * 3] = (val >> 16) as u8;
            out[i * 3 + 1] = (val >> 8) as u8;
            out[i * 3 + 2] = val as u8;
        }
        out
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// WGS-84 position (I021/040): latitude and longitude on 24 bits each,
/// signed two's complement, 180/2²³ degree LSB.
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct Wgs84Position {
    #[deku(bits = "24", endian = "big")]
    pub lat_raw: u32,
    #[deku(bits = "24", endian = "big")]
    pub lon_raw: u32,
}

const WGS84_LSB: f64 = 180.0 / 8_388_608.0; // 180 / 2^23

fn sign_extend_24(raw: u32) -> i32 {
    if raw & 0x0080_0000 != 0 {
        raw as i32 - 0x0100_0000
    } else {
        raw as i32
    }
}

impl Wgs84Position {
    pub fn latitude_deg(&self) -> f64 {
        sign_extend_24(self.lat_raw) as f64 * WGS84_LSB
    }

    pub fn longitude_deg(&self) -> f64 {
        sign_extend_24(self.lon_raw) as f64 * WGS84_LSB
    }

    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Wgs84Position {
            lat_raw: ((latitude / WGS84_LSB).round() as i32 as u32) & 0x00FF_FFFF,
            lon_raw: ((longitude / WGS84_LSB).round() as i32 as u32) & 0x00FF_FFFF,
        }
    }
}

/// Target report descriptor (I048/020), first octet plus one optional
/// extension.
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct TargetDescriptor {
    #[deku(bits = "3")]
    pub typ: u8,
    #[deku(bits = "1")]
    pub sim: u8,
    #[deku(bits = "1")]
    pub rdp: u8,
    #[deku(bits = "1")]
    pub spi: u8,
    #[deku(bits = "1")]
    pub rab: u8,
    #[deku(bits = "1")]
    fx: u8,
    #[deku(cond = "*fx == 1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<DescriptorExtension>,
}

#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct DescriptorExtension {
    #[deku(bits = "1")]
    pub tst: u8,
    #[deku(bits = "6")]
    spare: u8,
    #[deku(bits = "1")]
    fx: u8,
}

impl TargetDescriptor {
    pub fn new(typ: u8) -> Self {
        TargetDescriptor {
            typ: typ & 0x07,
            sim: 0,
            rdp: 0,
            spi: 0,
            rab: 0,
            fx: 0,
            extension: None,
        }
    }

    pub fn type_description(&self) -> &'static str {
        match self.typ {
            0 => "No detection",
            1 => "Single PSR detection",
            2 => "Single SSR detection",
            3 => "SSR + PSR detection",
            4 => "Single ModeS All-Call",
            5 => "Single ModeS Roll-Call",
            6 => "ModeS All-Call + PSR",
            _ => "ModeS Roll-Call + PSR",
        }
    }

    pub fn test_target(&self) -> bool {
        self.extension.map(|e| e.tst == 1).unwrap_or(false)
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_description())
    }
}

/// Track status (I048/170), first octet.
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, DekuWrite, Copy, Clone)]
pub struct TrackStatus {
    /// Confirmed (0) vs tentative (1) track
    #[deku(bits = "1")]
    pub cnf: u8,
    /// Last report for this track
    #[deku(bits = "1")]
    pub tre: u8,
    /// Coasted (extrapolated) report
    #[deku(bits = "1")]
    pub cst: u8,
    /// Horizontal maneuver
    #[deku(bits = "1")]
    pub mah: u8,
    #[deku(bits = "1")]
    pub tcc: u8,
    /// Smoothed rather than measured position
    #[deku(bits = "1")]
    pub sth: u8,
    #[deku(bits = "1")]
    pub tom: u8,
    #[deku(bits = "1")]
    fx: u8,
}

/// Warning/error conditions (I048/030), an FX chain of 7-bit groups.
#[derive(Debug, Default, PartialEq, Eq, serde::Serialize, Clone)]
pub struct WarningConditions {
    pub octets: Vec<u8>,
}

const WARNING_NAMES: [&str; 7] = [
    "Garbled reply",
    "Reflection",
    "Sidelobe reply",
    "Split plot",
    "Second time around reply",
    "Angels",
    "Slow moving target",
];

impl WarningConditions {
    pub fn decode(data: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut octets = Vec::new();
        for &byte in data {
            octets.push(byte);
            if byte & 0x01 == 0 {
                let len = octets.len();
                return Ok((WarningConditions { octets }, len));
            }
            if octets.len() >= 10 {
                let len = octets.len();
                return Ok((WarningConditions { octets }, len));
            }
        }
        Err(DecodeError::ShortItem { item: "I048/030" })
    }

    pub fn encode(&self) -> Vec<u8> {
        if self.octets.is_empty() {
            vec![0x00]
        } else {
            self.octets.clone()
        }
    }

    /// Names of the conditions flagged in the first octet.
    pub fn conditions(&self) -> Vec<&'static str> {
        let first = self.octets.first().copied().unwrap_or(0);
        (1..=7)
            .filter(|bit| first & (1 << bit) != 0)
            .map(|bit| WARNING_NAMES[bit - 1])
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.octets.iter().all(|o| o & 0xFE == 0)
    }
}

/// Radar plot characteristics (I048/130): a presence octet followed by one
/// octet per announced subfield (SRL, SRR, SAM, PRL, PAM, RPD, APD).
#[derive(Debug, Default, PartialEq, Eq, serde::Serialize, Clone)]
pub struct PlotCharacteristics {
    pub presence: u8,
    pub subfields: Vec<u8>,
}

impl PlotCharacteristics {
    pub fn decode(data: &[u8]) -> Result<(Self, usize), DecodeError> {
        let presence = *data
            .first()
            .ok_or(DecodeError::ShortItem { item: "I048/130" })?;
        let count = (presence & 0xFE).count_ones() as usize;
        if data.len() < 1 + count {
            return Err(DecodeError::ShortItem { item: "I048/130" });
        }
        Ok((
            PlotCharacteristics {
                presence,
                subfields: data[1..1 + count].to_vec(),
            },
            1 + count,
        ))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.presence];
        out.extend_from_slice(&self.subfields);
        out
    }

    fn subfield(&self, mask: u8) -> Option<u8> {
        if self.presence & mask == 0 {
            return None;
        }
        // subfields are stored in presence-bit order, bit 8 first
        let index = (self.presence & 0xFE & !(mask | (mask - 1))).count_ones() as usize;
        self.subfields.get(index).copied()
    }

    /// Amplitude of the received plot (SAM subfield), dBm.
    pub fn amplitude_dbm(&self) -> Option<i8> {
        self.subfield(0x20).map(|v| v as i8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlit::hex;

    #[test]
    fn polar_position_units() {
        let bytes = hex!("0A804000");
        let (_, item) = PolarPosition::from_bytes((&bytes, 0)).unwrap();
        assert_eq!(item.range_nm(), 10.5);
        assert_eq!(item.azimuth_deg(), 90.0);
        assert_eq!(item.to_bytes().unwrap(), bytes.to_vec());
    }

    #[test]
    fn mode_3a_octal() {
        let item = Mode3ACode::from_octal("1234").unwrap();
        assert_eq!(item.octal_string(), "1234");
        assert_eq!(item.0, 0o1234);
        let bytes = item.to_bytes().unwrap();
        let (_, back) = Mode3ACode::from_bytes((&bytes, 0)).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn flight_level_signed() {
        let (_, item) = FlightLevel::from_bytes((&hex!("FFFC"), 0)).unwrap();
        assert_eq!(item.level(), -1.0);
        let (_, item) = FlightLevel::from_bytes((&hex!("0578"), 0)).unwrap();
        assert_eq!(item.level(), 350.0);
        assert_eq!(item.altitude_ft(), 35_000.0);
    }

    #[test]
    fn time_of_day_lsb() {
        let (_, item) = TimeOfDay::from_bytes((&hex!("020000"), 0)).unwrap();
        assert_eq!(item.seconds(), 1024.0);
        assert_eq!(TimeOfDay::from_seconds(1024.0), item);
    }

    #[test]
    fn callsign_packing() {
        let callsign = Callsign("DAL123".to_string());
        let encoded = callsign.encode();
        let decoded = Callsign::decode(&encoded).unwrap();
        assert_eq!(decoded, callsign);
    }

    #[test]
    fn callsign_trims_trailing_spaces() {
        let full = Callsign("AB".to_string());
        let decoded = Callsign::decode(&full.encode()).unwrap();
        assert_eq!(decoded.0, "AB");
    }

    #[test]
    fn wgs84_scaling() {
        let item = Wgs84Position::from_degrees(28.0836, -80.6081);
        assert!((item.latitude_deg() - 28.0836).abs() < 1e-4);
        assert!((item.longitude_deg() + 80.6081).abs() < 1e-4);
        let bytes = item.to_bytes().unwrap();
        assert_eq!(bytes.len(), 6);
        let (_, back) = Wgs84Position::from_bytes((&bytes, 0)).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn target_descriptor_bits() {
        // TYP=2 (single SSR), no flags, no extension
        let (_, item) = TargetDescriptor::from_bytes((&hex!("40"), 0)).unwrap();
        assert_eq!(item.typ, 2);
        assert_eq!(item.type_description(), "Single SSR detection");
        assert!(item.extension.is_none());
        assert_eq!(item.to_bytes().unwrap(), vec![0x40]);
    }

    #[test]
    fn target_descriptor_extension() {
        // FX set, extension announces a test target
        let (_, item) = TargetDescriptor::from_bytes((&hex!("4180"), 0)).unwrap();
        assert!(item.test_target());
        assert_eq!(item.to_bytes().unwrap(), vec![0x41, 0x80]);
    }

    #[test]
    fn warning_conditions_names() {
        let (item, consumed) = WarningConditions::decode(&[0x06]).unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(item.conditions(), vec!["Garbled reply", "Reflection"]);
    }

    #[test]
    fn plot_characteristics_amplitude() {
        // presence announces SAM only
        let (item, consumed) = PlotCharacteristics::decode(&[0x20, 0xF6]).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(item.amplitude_dbm(), Some(-10));
        assert_eq!(item.encode(), vec![0x20, 0xF6]);
    }

    #[test]
    fn aircraft_address_hex() {
        let (_, addr) = AircraftAddress::from_bytes((&hex!("123456"), 0)).unwrap();
        assert_eq!(format!("{addr}"), "123456");
        assert_eq!(addr.to_bytes().unwrap(), hex!("123456").to_vec());
    }
}
