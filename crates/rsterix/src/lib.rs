#![doc = include_str!("../readme.md")]
pub mod config;
pub mod cot;
pub mod decode;
pub mod error;
pub mod geo;
pub mod klv;
pub mod pipeline;
pub mod plot;
pub mod source;
pub mod track;

pub mod prelude {
    /// This re-export is necessary to decode item payloads
    pub use deku::prelude::*;

    pub use crate::config::Config;
    pub use crate::decode::cat010::Cat010Record;
    pub use crate::decode::cat021::Cat021Record;
    pub use crate::decode::cat048::Cat048Record;
    /// The root entry points for ASTERIX payloads
    pub use crate::decode::{decode_blocks, DataBlock, Record};
    pub use crate::error::{CotError, DecodeError, KlvError};
    pub use crate::geo::Position;
    pub use crate::plot::{Plot, SensorType};
    pub use crate::track::{Track, TrackEstimator, TrackState, TrackSummary};

    /// This re-export is necessary for stream-based sources
    pub use futures_util::stream::StreamExt;

    pub use crate::pipeline::Pipeline;
    pub use crate::source::udp;
}
