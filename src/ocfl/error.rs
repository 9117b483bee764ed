use core::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::{error, io};

use thiserror::Error;

use crate::ocfl::validate::ValidationResults;
use crate::ocfl::{LogicalPath, VersionNum};

pub type Result<T, E = OcflError> = core::result::Result<T, E>;

/// Application errors
#[derive(Error)]
pub enum OcflError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Object {object_id} is out of sync: {message}")]
    ObjectOutOfSync { object_id: String, message: String },

    #[error("Logical path {0} already exists. Use the overwrite option if you wish to replace it.")]
    PathAlreadyExists(LogicalPath),

    #[error("Fixity check of {path} failed: expected {algorithm} {expected}; found {actual}")]
    Fixity {
        path: String,
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("Validation of {location} failed:\n{results}")]
    Validation {
        location: String,
        results: ValidationResults,
    },

    #[error("Object {object_id} is corrupt: {message}")]
    CorruptObject { object_id: String, message: String },

    #[error("Illegal state: {0}")]
    InvalidState(String),

    #[error("Illegal argument: {0}")]
    InvalidInput(String),

    #[error("Failed to acquire a lock on {0} within the configured timeout")]
    LockTimeout(String),

    #[error("The repository is closed")]
    Closed,

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Wrapped(Box<dyn error::Error + Send + Sync>),
}

/// Constructs an `OcflError::NotFound` error for an object or object version
pub fn not_found(object_id: &str, version_num: Option<VersionNum>) -> OcflError {
    match version_num {
        Some(version) => OcflError::NotFound(format!("Object {} version {}", object_id, version)),
        None => OcflError::NotFound(format!("Object {}", object_id)),
    }
}

/// Constructs an `OcflError::NotFound` error for a logical path within a version
pub fn not_found_path(object_id: &str, version_num: VersionNum, path: &LogicalPath) -> OcflError {
    OcflError::NotFound(format!(
        "Path {} in object {} version {}",
        path, object_id, version_num
    ))
}

impl Debug for OcflError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<serde_json::Error> for OcflError {
    fn from(e: serde_json::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

impl From<walkdir::Error> for OcflError {
    fn from(e: walkdir::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}
