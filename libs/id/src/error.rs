//! Id parse errors.

use thiserror::Error;

/// Why a string is not a valid id. Ids arrive from browsers and snapshot
/// files, so every malformed shape gets its own variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("id is empty")]
    Empty,

    #[error("id prefix is '{actual}', expected '{expected}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    #[error("id has no '_' between prefix and ulid")]
    MissingSeparator,

    #[error("id carries an invalid ulid: {0}")]
    InvalidUlid(String),
}

impl IdError {
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
