//! folio: render a built HTML publication to one combined PDF and split it into per-section
//! PDFs using the page map the render engine reports.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod page_map;
pub mod pdf;
pub mod pipeline;
pub mod sectioner;

// Re-exports for CLI and consumers.
pub use cancel::CancellationToken;
pub use engine::{
    build_engine, BatchEngine, BatchEngineBuilder, BrowserEngine, BrowserEngineBuilder,
    EngineError, EngineKind, RenderEngine, Step,
};
pub use error::{PipelineError, SectionFailure};
pub use page_map::{validate, PageMap, RawPageMap, RawSection, Section, SectionRange, ValidationError};
pub use pdf::{LopdfDocument, PdfDocument, PdfError};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineReport, PipelineRequest, Stage};
pub use sectioner::{split, SectionConfig, SectionOutput};
