use thiserror::Error;

/// Errors surfaced by the datastore engine.
///
/// Only locally-initiated operations return these. Failures on the receive
/// path (unknown reply uuid, unattached namespace, bad inbound writes) are
/// logged and dropped by the dispatcher instead, see
/// [`Datastore::receive`](crate::Datastore::receive).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A path segment contains a character reserved by the pointer syntax.
    #[error("path segment {0:?} contains a reserved character ('/' or '~')")]
    ReservedCharacter(String),

    /// A write tried to traverse a value that is neither an object nor an
    /// array.
    #[error("cannot traverse scalar value at segment {0:?}")]
    NotAnObject(String),

    /// `push` addressed a value that is not an array.
    #[error("cannot append to non-array value at {0:?}")]
    NotAnArray(String),

    /// An array was addressed with a non-numeric or out-of-range segment.
    #[error("invalid array index {0:?}")]
    InvalidIndex(String),
}

pub type Result<T> = std::result::Result<T, Error>;
