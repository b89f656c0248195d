pub mod cat010;
pub mod cat021;
pub mod cat048;
pub mod fspec;
pub mod items;
pub mod time;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::warn;

use crate::error::DecodeError;
use cat010::Cat010Record;
use cat021::Cat021Record;
use cat048::Cat048Record;

/**
 * The entry point for ASTERIX payloads.
 *
 * A UDP payload carries one or more data blocks, each framed by a 1-byte
 * category and a 2-byte big-endian length covering the whole block. Each
 * block contains one or more FSPEC-driven records of that category.
 *
 * The decoder is stateless with respect to prior payloads; counters for
 * dropped data are kept process-wide and surfaced by [`decoder_stats`].
 */

/// One decoded record, tagged by category.
#[derive(Debug, PartialEq, Serialize, Clone)]
#[serde(tag = "category")]
pub enum Record {
    #[serde(rename = "10")]
    Cat010(Cat010Record),
    #[serde(rename = "21")]
    Cat021(Cat021Record),
    #[serde(rename = "48")]
    Cat048(Cat048Record),
}

/// A decoded data block: every record of one CAT/LEN frame.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct DataBlock {
    pub category: u8,
    pub records: Vec<Record>,
}

/// The byte-level shape of a UAP entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemFormat {
    /// Fixed length in octets.
    Fixed(usize),
    /// FX-chained octets, terminated by the first octet with bit 1 clear.
    Variable,
    /// A repetition-count octet followed by count × n octets.
    Repetitive(usize),
    /// A length octet (including itself) followed by the payload.
    Explicit,
    /// A presence octet followed by one octet per announced subfield.
    Compound,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct UapEntry {
    pub item: &'static str,
    pub format: ItemFormat,
}

/// Result of parsing one record. `truncated` marks a record that ended
/// mid-item: the items decoded before the truncation are kept, the rest
/// of the block is abandoned.
#[derive(Debug)]
pub struct RecordParse<T> {
    pub record: T,
    pub consumed: usize,
    pub truncated: bool,
}

/// Number of octets the item at the head of `data` occupies, or `None`
/// when the data runs out before the item ends.
pub(crate) fn item_length(format: &ItemFormat, data: &[u8]) -> Option<usize> {
    match format {
        ItemFormat::Fixed(n) => (data.len() >= *n).then_some(*n),
        ItemFormat::Variable => {
            let mut len = 0;
            for &byte in data {
                len += 1;
                if byte & 0x01 == 0 || len >= 10 {
                    return Some(len);
                }
            }
            None
        }
        ItemFormat::Repetitive(n) => {
            let count = *data.first()? as usize;
            let needed = 1 + count * n;
            (data.len() >= needed).then_some(needed)
        }
        ItemFormat::Explicit => {
            let len = *data.first()? as usize;
            if len == 0 {
                return None;
            }
            (data.len() >= len).then_some(len)
        }
        ItemFormat::Compound => {
            let presence = *data.first()?;
            let needed = 1 + (presence & 0xFE).count_ones() as usize;
            (data.len() >= needed).then_some(needed)
        }
    }
}

static MALFORMED_FRAMES: AtomicU64 = AtomicU64::new(0);
static DROPPED_RECORDS: AtomicU64 = AtomicU64::new(0);
static SHORT_ITEMS: AtomicU64 = AtomicU64::new(0);
static UNSUPPORTED_BLOCKS: AtomicU64 = AtomicU64::new(0);
static WARNED_CATEGORIES: Lazy<Mutex<HashSet<u8>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Process-wide counters for data the decoder had to drop.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct DecoderStats {
    pub malformed_frames: u64,
    pub dropped_records: u64,
    pub short_items: u64,
    pub unsupported_blocks: u64,
}

pub fn decoder_stats() -> DecoderStats {
    DecoderStats {
        malformed_frames: MALFORMED_FRAMES.load(Ordering::Relaxed),
        dropped_records: DROPPED_RECORDS.load(Ordering::Relaxed),
        short_items: SHORT_ITEMS.load(Ordering::Relaxed),
        unsupported_blocks: UNSUPPORTED_BLOCKS.load(Ordering::Relaxed),
    }
}

pub(crate) fn note_short_item(item: &'static str) {
    SHORT_ITEMS.fetch_add(1, Ordering::Relaxed);
    warn!("record truncated while reading {item}");
}

fn note_unsupported(category: u8) {
    UNSUPPORTED_BLOCKS.fetch_add(1, Ordering::Relaxed);
    // Log once per unique category for the process lifetime.
    if let Ok(mut warned) = WARNED_CATEGORIES.lock() {
        if warned.insert(category) {
            warn!("dropping ASTERIX category {category}, not in {{10, 21, 48}}");
        }
    }
}

/// Decode every data block of a UDP payload.
///
/// Blocks of unsupported categories are skipped (counted, logged once per
/// category). Any framing inconsistency rejects the payload as a whole
/// with [`DecodeError::MalformedFrame`].
pub fn decode_blocks(payload: &[u8]) -> Result<Vec<DataBlock>, DecodeError> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while pos < payload.len() {
        let rest = &payload[pos..];
        if rest.len() < 3 {
            MALFORMED_FRAMES.fetch_add(1, Ordering::Relaxed);
            return Err(DecodeError::MalformedFrame(format!(
                "{} leftover bytes, block header needs 3",
                rest.len()
            )));
        }
        let category = rest[0];
        let length = u16::from_be_bytes([rest[1], rest[2]]) as usize;
        if length < 3 {
            MALFORMED_FRAMES.fetch_add(1, Ordering::Relaxed);
            return Err(DecodeError::MalformedFrame(format!(
                "block length {length} below minimum 3"
            )));
        }
        if length > rest.len() {
            MALFORMED_FRAMES.fetch_add(1, Ordering::Relaxed);
            return Err(DecodeError::MalformedFrame(format!(
                "block length {length} exceeds remaining payload {}",
                rest.len()
            )));
        }

        let body = &rest[3..length];
        match category {
            10 | 21 | 48 => blocks.push(decode_block(category, body)),
            other => note_unsupported(other),
        }
        pos += length;
    }

    Ok(blocks)
}

fn decode_block(category: u8, body: &[u8]) -> DataBlock {
    let mut records = Vec::new();
    let mut pos = 0;

    while pos < body.len() {
        let rest = &body[pos..];
        let (record, consumed, truncated) = match category {
            10 => match Cat010Record::decode(rest) {
                Ok(parse) => (Record::Cat010(parse.record), parse.consumed, parse.truncated),
                Err(_) => break,
            },
            21 => match Cat021Record::decode(rest) {
                Ok(parse) => (Record::Cat021(parse.record), parse.consumed, parse.truncated),
                Err(_) => break,
            },
            _ => match Cat048Record::decode(rest) {
                Ok(parse) => (Record::Cat048(parse.record), parse.consumed, parse.truncated),
                Err(_) => break,
            },
        };
        records.push(record);
        if truncated {
            // items past the truncation cannot be resynchronised
            DROPPED_RECORDS.fetch_add(1, Ordering::Relaxed);
            break;
        }
        if consumed == 0 {
            break;
        }
        pos += consumed;
    }

    DataBlock { category, records }
}

/// Frame a set of records as one data block (CAT, LEN, records).
pub fn encode_block(category: u8, records: &[Record]) -> Result<Vec<u8>, DecodeError> {
    let mut body = Vec::new();
    for record in records {
        match record {
            Record::Cat010(r) => body.extend(r.encode()?),
            Record::Cat021(r) => body.extend(r.encode()?),
            Record::Cat048(r) => body.extend(r.encode()?),
        }
    }
    let length = body.len() + 3;
    if length > u16::MAX as usize {
        return Err(DecodeError::MalformedFrame(format!(
            "encoded block length {length} exceeds 16 bits"
        )));
    }
    let mut out = Vec::with_capacity(length);
    out.push(category);
    out.extend((length as u16).to_be_bytes());
    out.extend(body);
    Ok(out)
}
