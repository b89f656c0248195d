use thiserror::Error;

/// Errors raised while decoding ASTERIX data blocks.
///
/// Framing errors reject the whole payload; item-level errors drop the
/// affected record (or field) and let the caller carry on with the rest.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DecodeError {
    /// Block framing invalid: LEN runs past the payload, LEN < 3, or
    /// leftover bytes do not form another block.
    #[error("malformed ASTERIX frame: {0}")]
    MalformedFrame(String),

    /// The category octet names a category outside {10, 21, 48}.
    #[error("unsupported ASTERIX category {0}")]
    UnsupportedCategory(u8),

    /// A record ended in the middle of a data item. Items decoded before
    /// the truncation are still emitted.
    #[error("record truncated while reading {item}")]
    ShortItem { item: &'static str },

    /// A decoded value fails its range invariant. The field is discarded,
    /// the record is otherwise kept.
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),
}

/// Errors raised by the Cursor-on-Target codec.
#[derive(Debug, Error)]
pub enum CotError {
    #[error("invalid CoT document: {0}")]
    Invalid(String),

    #[error("missing required attribute {0}")]
    MissingAttribute(&'static str),

    #[error(transparent)]
    Read(#[from] xml::reader::Error),

    #[error(transparent)]
    Write(#[from] xml::writer::Error),
}

/// Errors raised by the KLV codec.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum KlvError {
    /// The packet checksum does not match the recomputed value. The
    /// packet is rejected as a whole.
    #[error("checksum mismatch (stored {stored:#06x}, computed {computed:#06x})")]
    ChecksumFailure { stored: u16, computed: u16 },

    #[error("unknown universal key {0}")]
    UnknownKey(String),

    #[error("truncated KLV packet while reading {0}")]
    Truncated(&'static str),

    #[error("invalid BER length encoding")]
    BadLength,

    #[error("local set does not start with a checksum item")]
    MissingChecksum,
}

/// Invalid configuration detected at startup. Fatal.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// The Kalman innovation covariance could not be inverted. The update is
/// skipped: the predicted state is kept and the covariance left unchanged.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("kalman update ill-conditioned, keeping predicted state")]
pub struct FilterDiverged;

/// Errors surfaced by the running pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("pipeline task failed: {0}")]
    Task(String),
}
