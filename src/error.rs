//! Error types shared across the renderer.

use std::io;

use thiserror::Error;

/// A mesh record that could not be used. Never fatal: unknown tags are
/// skipped and bad numbers end parsing early.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedRecord {
    #[error("line {line}: unknown record tag `{tag}`")]
    UnknownTag { line: usize, tag: String },

    #[error("line {line}: expected three numeric fields")]
    MissingField { line: usize },

    #[error("line {line}: `{field}` is not a number")]
    InvalidField { line: usize, field: String },
}

impl MalformedRecord {
    /// Whether the parser keeps consuming records after this one.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownTag { .. })
    }
}

/// Errors that abort loading a mesh.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("face {face} references vertex {index}, but only {vertex_count} vertices exist")]
    IndexOutOfRange {
        face: usize,
        index: i64,
        vertex_count: usize,
    },

    #[error("failed to read mesh: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by a compute backend. All of them are fatal.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: &'static str, reason: String },

    #[error("GPU is out of memory")]
    OutOfMemory,

    #[error("output image presented before the compute writes were synchronized")]
    MissingBarrier,
}

impl BackendError {
    pub fn resource(what: &'static str, reason: impl ToString) -> Self {
        Self::ResourceCreation {
            what,
            reason: reason.to_string(),
        }
    }
}
