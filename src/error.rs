#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A read would extend past the end of the buffer. The cursor position is
    /// unchanged when this is returned.
    #[error("read of {want} bits at bit {position} exceeds {available} bits available")]
    OutOfRange {
        position: usize,
        want: usize,
        available: usize,
    },

    #[error("position {position} outside buffer of {len_bits} bits")]
    InvalidPosition { position: usize, len_bits: usize },

    /// No container's restrictions matched the header.
    #[error("no container matched header with apid {apid}")]
    UnrecognizedType { apid: u16 },

    /// More than one container's restrictions matched the header. This is a
    /// schema defect, never resolved by priority.
    #[error("containers {0:?} all matched the same header")]
    AmbiguousType(Vec<String>),

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid schema document: {0}")]
    SchemaFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
