//! Protocol exception codes
//!
//! Codes the simulation reports in exception frames when it rejects a request.
//! Unknown codes are preserved as [`ExceptionCode::Other`].

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionCode {
    None,
    Error,
    SizeMismatch,
    UnrecognizedId,
    Unopened,
    VersionMismatch,
    TooManyGroups,
    NameUnrecognized,
    TooManyEventNames,
    EventIdDuplicate,
    TooManyMaps,
    TooManyObjects,
    TooManyRequests,
    InvalidDataType,
    InvalidDataSize,
    DataError,
    InvalidArray,
    OperationInvalidForObjectType,
    IllegalOperation,
    AlreadySubscribed,
    InvalidEnum,
    DefinitionError,
    DuplicateId,
    DatumId,
    OutOfBounds,
    Other(u32),
}

impl ExceptionCode {
    pub fn from_raw(code: u32) -> Self {
        match code {
            0 => ExceptionCode::None,
            1 => ExceptionCode::Error,
            2 => ExceptionCode::SizeMismatch,
            3 => ExceptionCode::UnrecognizedId,
            4 => ExceptionCode::Unopened,
            5 => ExceptionCode::VersionMismatch,
            6 => ExceptionCode::TooManyGroups,
            7 => ExceptionCode::NameUnrecognized,
            8 => ExceptionCode::TooManyEventNames,
            9 => ExceptionCode::EventIdDuplicate,
            10 => ExceptionCode::TooManyMaps,
            11 => ExceptionCode::TooManyObjects,
            12 => ExceptionCode::TooManyRequests,
            18 => ExceptionCode::InvalidDataType,
            19 => ExceptionCode::InvalidDataSize,
            20 => ExceptionCode::DataError,
            21 => ExceptionCode::InvalidArray,
            24 => ExceptionCode::OperationInvalidForObjectType,
            25 => ExceptionCode::IllegalOperation,
            26 => ExceptionCode::AlreadySubscribed,
            27 => ExceptionCode::InvalidEnum,
            28 => ExceptionCode::DefinitionError,
            29 => ExceptionCode::DuplicateId,
            30 => ExceptionCode::DatumId,
            31 => ExceptionCode::OutOfBounds,
            other => ExceptionCode::Other(other),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            ExceptionCode::None => 0,
            ExceptionCode::Error => 1,
            ExceptionCode::SizeMismatch => 2,
            ExceptionCode::UnrecognizedId => 3,
            ExceptionCode::Unopened => 4,
            ExceptionCode::VersionMismatch => 5,
            ExceptionCode::TooManyGroups => 6,
            ExceptionCode::NameUnrecognized => 7,
            ExceptionCode::TooManyEventNames => 8,
            ExceptionCode::EventIdDuplicate => 9,
            ExceptionCode::TooManyMaps => 10,
            ExceptionCode::TooManyObjects => 11,
            ExceptionCode::TooManyRequests => 12,
            ExceptionCode::InvalidDataType => 18,
            ExceptionCode::InvalidDataSize => 19,
            ExceptionCode::DataError => 20,
            ExceptionCode::InvalidArray => 21,
            ExceptionCode::OperationInvalidForObjectType => 24,
            ExceptionCode::IllegalOperation => 25,
            ExceptionCode::AlreadySubscribed => 26,
            ExceptionCode::InvalidEnum => 27,
            ExceptionCode::DefinitionError => 28,
            ExceptionCode::DuplicateId => 29,
            ExceptionCode::DatumId => 30,
            ExceptionCode::OutOfBounds => 31,
            ExceptionCode::Other(code) => *code,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ExceptionCode::None => "NONE",
            ExceptionCode::Error => "ERROR",
            ExceptionCode::SizeMismatch => "SIZE_MISMATCH",
            ExceptionCode::UnrecognizedId => "UNRECOGNIZED_ID",
            ExceptionCode::Unopened => "UNOPENED",
            ExceptionCode::VersionMismatch => "VERSION_MISMATCH",
            ExceptionCode::TooManyGroups => "TOO_MANY_GROUPS",
            ExceptionCode::NameUnrecognized => "NAME_UNRECOGNIZED",
            ExceptionCode::TooManyEventNames => "TOO_MANY_EVENT_NAMES",
            ExceptionCode::EventIdDuplicate => "EVENT_ID_DUPLICATE",
            ExceptionCode::TooManyMaps => "TOO_MANY_MAPS",
            ExceptionCode::TooManyObjects => "TOO_MANY_OBJECTS",
            ExceptionCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ExceptionCode::InvalidDataType => "INVALID_DATA_TYPE",
            ExceptionCode::InvalidDataSize => "INVALID_DATA_SIZE",
            ExceptionCode::DataError => "DATA_ERROR",
            ExceptionCode::InvalidArray => "INVALID_ARRAY",
            ExceptionCode::OperationInvalidForObjectType => "OPERATION_INVALID_FOR_OBJECT_TYPE",
            ExceptionCode::IllegalOperation => "ILLEGAL_OPERATION",
            ExceptionCode::AlreadySubscribed => "ALREADY_SUBSCRIBED",
            ExceptionCode::InvalidEnum => "INVALID_ENUM",
            ExceptionCode::DefinitionError => "DEFINITION_ERROR",
            ExceptionCode::DuplicateId => "DUPLICATE_ID",
            ExceptionCode::DatumId => "DATUM_ID",
            ExceptionCode::OutOfBounds => "OUT_OF_BOUNDS",
            ExceptionCode::Other(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.raw())
    }
}
