// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Bad CSV format: expected {expected} fields, got {actual}")]
    BadCsvFormat { expected: usize, actual: usize },

    #[error("Measurement output spans {0} lines, expected one")]
    MultiLine(usize),

    #[error("Empty measurement output")]
    EmptyRecord,

    #[error("Unknown reason code: {0}")]
    UnknownReason(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
