use std::fmt;

use mangle_common::ValueError;
use mangle_link::LinkError;
use serde::Serialize;
use thiserror::Error;

use crate::Entity;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} {name:?} already exists with a different shape")]
    Conflict { entity: Entity, name: String },
    #[error("{entity} {name:?} not found")]
    NotFound { entity: Entity, name: String },
    #[error("{entity} {name:?} is in use ({refs} references)")]
    InUse { entity: Entity, name: String, refs: usize },
    #[error("field {field:?} at offset {offset} ({len} bytes) is out of bounds for a {plen} byte packet")]
    OutOfBounds { field: String, offset: i32, len: usize, plen: usize },
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("Malformed: {0}")]
    Malformed(String),
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

impl Error {
    pub(crate) fn not_found(entity: Entity, name: &str) -> Self {
        Self::NotFound { entity, name: name.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InUse { .. } => ErrorKind::InUse,
            Self::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            Self::Value(ValueError::Overflow { .. }) => ErrorKind::Overflow,
            Self::Value(ValueError::LengthMismatch { .. }) => ErrorKind::LengthMismatch,
            Self::Value(ValueError::Malformed(_)) | Self::Malformed(_) => ErrorKind::Malformed,
            Self::Link(LinkError::NoSuchInterface(_)) => ErrorKind::NotFound,
            Self::Link(_) => ErrorKind::Io,
        }
    }
}

/// Coarse classification of [`Error`]s, as reported to the control protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Conflict,
    NotFound,
    InUse,
    OutOfBounds,
    Overflow,
    LengthMismatch,
    Malformed,
    Io,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::InUse => "in_use",
            Self::OutOfBounds => "out_of_bounds",
            Self::Overflow => "overflow",
            Self::LengthMismatch => "length_mismatch",
            Self::Malformed => "malformed",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
