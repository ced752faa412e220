//! Error taxonomy for the render → split → write pipeline.
//!
//! Every category names the external tool involved, the logical operation that failed, and
//! keeps the tool's own error as its source so the message is never generic.

use crate::engine::EngineError;
use crate::page_map::ValidationError;
use crate::pdf::PdfError;
use std::path::PathBuf;
use thiserror::Error;

pub const OP_LOAD_MAIN: &str = "load main PDF";
pub const OP_LOAD_COVERS: &str = "load covers PDF";
pub const OP_PRINT_MAIN: &str = "print main PDF";
pub const OP_PRINT_COVERS: &str = "print covers PDF";
pub const OP_PAGE_MAP: &str = "generate page map";
pub const OP_COVER_PAGE_MAP: &str = "generate cover page map";

/// Tool name used for filesystem failures.
pub const FILESYSTEM: &str = "filesystem";

/// Operation name for one section's extraction: `extract section '<id>'`.
pub fn extract_section_operation(section: &str) -> String {
    format!("extract section '{}'", section)
}

/// Why one section could not be extracted.
#[derive(Debug, Error)]
pub enum SectionFailure {
    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Categorized pipeline failure. Cancellation is not an error and never appears here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The combined or covers PDF could not be parsed.
    #[error("{tool}: failed to {operation}: {source}")]
    DocumentLoad {
        tool: &'static str,
        operation: &'static str,
        #[source]
        source: PdfError,
    },

    /// Copy, trim, cover graft, or serialization failed for one section.
    #[error("{tool}: failed to {operation}: {source}")]
    SectionExtraction {
        tool: &'static str,
        section: String,
        operation: String,
        #[source]
        source: SectionFailure,
    },

    /// A render engine failed while printing or reporting a page map.
    #[error("{tool}: failed to {operation}: {source}")]
    Render {
        tool: String,
        operation: &'static str,
        #[source]
        source: EngineError,
    },

    /// One output file could not be written.
    #[error("{}: failed to write {}: {source}", FILESYSTEM, .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every write failure of one run, in the order the writes were attempted.
    #[error("{} output file(s) could not be written:\n{}", .0.len(), list_errors(.0))]
    WriteFailures(Vec<PipelineError>),

    /// The request cannot be run as configured.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

fn list_errors(errors: &[PipelineError]) -> String {
    errors
        .iter()
        .map(|e| format!("  {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

impl PipelineError {
    pub(crate) fn section(tool: &'static str, section: &str, source: impl Into<SectionFailure>) -> Self {
        PipelineError::SectionExtraction {
            tool,
            section: section.to_string(),
            operation: extract_section_operation(section),
            source: source.into(),
        }
    }

    pub(crate) fn render(tool: &str, operation: &'static str, source: EngineError) -> Self {
        PipelineError::Render {
            tool: tool.to_string(),
            operation,
            source,
        }
    }

    /// External tool or library involved, if the error has one.
    pub fn tool(&self) -> Option<&str> {
        match self {
            PipelineError::DocumentLoad { tool, .. } => Some(*tool),
            PipelineError::SectionExtraction { tool, .. } => Some(*tool),
            PipelineError::Render { tool, .. } => Some(tool.as_str()),
            PipelineError::Write { .. } => Some(FILESYSTEM),
            PipelineError::WriteFailures(_) | PipelineError::Config(_) => None,
        }
    }

    /// Logical operation that failed, e.g. `load main PDF` or `extract section 'page-ch1'`.
    pub fn operation(&self) -> Option<String> {
        match self {
            PipelineError::DocumentLoad { operation, .. } => Some(operation.to_string()),
            PipelineError::SectionExtraction { operation, .. } => Some(operation.clone()),
            PipelineError::Render { operation, .. } => Some(operation.to_string()),
            PipelineError::Write { path, .. } => Some(format!("write {}", path.display())),
            PipelineError::WriteFailures(_) | PipelineError::Config(_) => None,
        }
    }

    /// The underlying tool's own message, verbatim.
    pub fn detail(&self) -> String {
        match self {
            PipelineError::DocumentLoad { source, .. } => source.to_string(),
            PipelineError::SectionExtraction { source, .. } => source.to_string(),
            PipelineError::Render { source, .. } => source.to_string(),
            PipelineError::Write { source, .. } => source.to_string(),
            PipelineError::WriteFailures(errors) => list_errors(errors),
            PipelineError::Config(msg) => msg.clone(),
        }
    }
}
