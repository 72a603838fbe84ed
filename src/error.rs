//! Crate-wide error type.

use std::io;
use thiserror::Error;

use crate::model::{ObjectId, ObjectKind};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the object database, the window cache, and the
/// walkers.
///
/// Walk termination requested by a filter is not an error; filters
/// return a three-valued verdict instead (see
/// [`crate::tree::Verdict`]).
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying read or open failure, propagated unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The requested object does not exist in the database.
    #[error("object {0} not found")]
    MissingObject(ObjectId),
    /// The object exists but is not of the kind the caller required.
    #[error("object {id} is not a {expected}")]
    IncorrectObjectType {
        /// Identity of the offending object.
        id: ObjectId,
        /// The kind the caller required.
        expected: ObjectKind,
    },
    /// The object's payload failed to parse.
    #[error("object {id} is corrupt: {reason}")]
    CorruptObject {
        /// Identity of the offending object.
        id: ObjectId,
        /// What the parser choked on.
        reason: String,
    },
    /// Container-level damage not attributable to a single object.
    #[error("corruption detected: {0}")]
    Corrupt(String),
    /// A configuration value was rejected at reconfigure time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// API misuse, e.g. incompatible filter combinations.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
}

impl Error {
    pub(crate) fn corrupt_object(id: ObjectId, reason: impl Into<String>) -> Self {
        Error::CorruptObject {
            id,
            reason: reason.into(),
        }
    }
}
