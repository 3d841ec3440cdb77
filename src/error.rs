//! Error types for dacpac-diff

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading schemas or generating a delta script
#[derive(Error, Debug)]
pub enum DacpacDiffError {
    #[error("Duplicate object in schema model: {name}")]
    DuplicateObject { name: String },

    #[error("Unknown object referenced by {owner}: {name}")]
    UnknownObject { owner: String, name: String },

    #[error("Index {index} references unknown column {column} on {table}")]
    UnknownIndexColumn {
        index: String,
        table: String,
        column: String,
    },

    #[error("Unsupported difference for kind {kind}: {action} of {name}")]
    UnsupportedDifference {
        kind: String,
        action: String,
        name: String,
    },

    #[error("Invalid exclude pattern '{pattern}'")]
    InvalidExcludePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Script writer used out of order: cannot {operation} while in {state}")]
    ScriptState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Failed to read dacpac: {path}")]
    DacpacReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ZIP read error: {message}")]
    ZipError { message: String },

    #[error("Invalid model.xml in {path}: {message}")]
    ModelXmlError { path: PathBuf, message: String },

    #[error("Failed to write script to {path}")]
    OutputWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
