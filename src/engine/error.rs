//! Shared error type for render engine adapters.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Failure inside a render engine adapter. Cancellation is reported as
/// [Step::Cancelled](crate::engine::Step::Cancelled), never as an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Could not run {program}: {source}. Is it installed and on PATH?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} produced no PDF output at {path}")]
    EmptyOutput { program: String, path: PathBuf },

    #[error("{program} reported an invalid page map: {source}")]
    PageMap {
        program: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("Input {path} cannot be rendered: {reason}")]
    Input { path: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}
