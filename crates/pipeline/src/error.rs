// SPDX-License-Identifier: Apache-2.0

//! Errors for the streaming data pipeline.
//!
//! The taxonomy separates *regular* errors, which a pipeline expects to see
//! and routes to its ordinary failure path (parse failures, missing
//! resources, storage faults, user cancellation), from invariant violations
//! which are wrapped as internal errors. Stage callbacks never panic for
//! data problems; they surface one of these.
//!
//! Errors deliberately hold only owned strings and plain data so they can
//! cross task boundaries and be cloned into the completion future, the sink
//! termination path and external subscribers alike.

use std::fmt;

/// All errors that can occur in the streaming data pipeline.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// An unrecoverable environmental precondition, e.g. an invalid
    /// storage root.
    #[error("Startup error: {message}")]
    StartupConfig {
        /// Description of the failed precondition.
        message: String,
    },

    /// A well-formed parse failure in incoming data.
    #[error("Data corruption: {message}{}", location_suffix(.line, .column))]
    DataCorruption {
        /// Description of the corruption.
        message: String,
        /// One-based line number, when the lexer can supply one.
        line: Option<u64>,
        /// One-based column number, when the lexer can supply one.
        column: Option<u64>,
    },

    /// An invariant violation inside the pipeline machinery.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },

    /// A user-visible termination, e.g. a cancellation request.
    #[error("{message}")]
    Public {
        /// The user-facing message.
        message: String,
    },

    /// A referenced entry is missing from a bundle or listing.
    #[error("Resource not found: {resource}")]
    ResourceNotFound {
        /// The missing entry.
        resource: String,
    },

    /// A storage operation failed; carries the operation key and path.
    #[error("Storage error in {key} [{path}]: {message}")]
    Storage {
        /// The storage operation that failed.
        key: String,
        /// The storage path the operation was applied to.
        path: String,
        /// Description of the failure.
        message: String,
    },
}

fn location_suffix(line: &Option<u64>, column: &Option<u64>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" (line {line}, col {column})"),
        (Some(line), None) => format!(" (line {line})"),
        _ => String::new(),
    }
}

impl Error {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Creates a startup configuration error.
    #[must_use]
    pub fn startup(message: impl Into<String>) -> Self {
        Error::StartupConfig {
            message: message.into(),
        }
    }

    /// Creates a data corruption error without a source location.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Error::DataCorruption {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Creates a data corruption error carrying a source location.
    #[must_use]
    pub fn corruption_at(message: impl Into<String>, line: u64, column: u64) -> Self {
        Error::DataCorruption {
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }

    /// The public error used when a caller cancels a pipeline.
    #[must_use]
    pub fn cancelled() -> Self {
        Error::Public {
            message: "Request to cancel".to_owned(),
        }
    }

    /// True for error kinds a pipeline handles through its regular failure
    /// path; false for invariant violations, which take the unhandled path.
    #[must_use]
    pub fn is_regular(&self) -> bool {
        !matches!(self, Error::Internal { .. })
    }
}

/// The terminal state a pipeline ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Assembled but not started.
    Idle,
    /// Started and processing.
    Running,
    /// Ran to completion.
    Complete,
    /// Failed with an error.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl PipelineState {
    /// True once the pipeline can no longer make progress.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Complete | PipelineState::Failed | PipelineState::Cancelled
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Complete => "complete",
            PipelineState::Failed => "failed",
            PipelineState::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}
