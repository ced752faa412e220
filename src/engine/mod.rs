//! Render engine adapters. Engine selection, the adapter trait, and the two supported engines.

mod error;
mod process;

pub mod batch;
pub mod browser;

pub use batch::{BatchEngine, BatchEngineBuilder};
pub use browser::{BrowserEngine, BrowserEngineBuilder};
pub use error::EngineError;

use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::page_map::RawPageMap;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};

/// Result of a step that may be cancelled. Cancellation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Completed(T),
    Cancelled,
}

impl<T> Step<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Step::Completed(value) => Step::Completed(f(value)),
            Step::Cancelled => Step::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Step::Cancelled)
    }
}

/// Supported engine. Used for dispatch and for the --engine override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// Headless Chromium.
    #[default]
    Browser,
    /// Batch HTML-to-PDF binary (Prince).
    Batch,
}

impl EngineKind {
    pub fn parse(s: &str) -> Result<EngineKind, String> {
        match s.to_lowercase().as_str() {
            "browser" | "chromium" | "chrome" | "pagedjs" => Ok(EngineKind::Browser),
            "batch" | "prince" => Ok(EngineKind::Batch),
            _ => Err(format!(
                "Invalid engine: '{}'. Use 'browser' or 'batch'.",
                s
            )),
        }
    }
}

/// Trait implemented by engine adapters (headless browser, batch binary).
///
/// Both calls take the input HTML path and a cancellation token; an adapter that observes the
/// token returns [Step::Cancelled] after stopping its renderer.
pub trait RenderEngine {
    /// Tool name used in error messages, e.g. the program being run.
    fn name(&self) -> &str;

    /// Render `input` to PDF bytes.
    fn print(
        &mut self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<Step<Vec<u8>>, EngineError>;

    /// Report the page map the renderer accumulated for `input`.
    /// An engine that reports none returns an empty map.
    fn page_map(
        &mut self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<Step<RawPageMap>, EngineError>;

    /// Release renderer resources (scratch files, processes). Called once per run.
    fn close(&mut self) {}
}

/// Dispatch by kind: build the adapter configured by `config`.
pub fn build_engine(kind: EngineKind, config: &Config) -> Box<dyn RenderEngine> {
    match kind {
        EngineKind::Browser => {
            let mut builder = BrowserEngine::builder();
            if let Some(browser) = &config.browser {
                if let Some(program) = &browser.program {
                    builder = builder.program(program.clone());
                }
                if let Some(ms) = browser.virtual_time_budget_ms {
                    builder = builder.virtual_time_budget_ms(ms);
                }
                if let Some(args) = &browser.extra_args {
                    builder = builder.extra_args(args.clone());
                }
            }
            Box::new(builder.build())
        }
        EngineKind::Batch => {
            let mut builder = BatchEngine::builder();
            if let Some(batch) = &config.batch {
                if let Some(program) = &batch.program {
                    builder = builder.program(program.clone());
                }
                if let Some(args) = &batch.args {
                    builder = builder.args(args.clone());
                }
                if let Some(args) = &batch.page_map_args {
                    builder = builder.page_map_args(args.clone());
                }
            }
            Box::new(builder.build())
        }
    }
}

/// Make sure `input` is an existing file and return its absolute path.
pub(crate) fn resolve_input(input: &Path) -> Result<PathBuf, EngineError> {
    let path = input.canonicalize().map_err(|e| EngineError::Input {
        path: input.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !path.is_file() {
        return Err(EngineError::Input {
            path: input.to_path_buf(),
            reason: "not a file".to_string(),
        });
    }
    Ok(path)
}

/// Private scratch directory for one engine's intermediate PDFs.
pub(crate) fn scratch_dir() -> Result<TempDir, EngineError> {
    tempfile::Builder::new()
        .prefix("folio-")
        .tempdir()
        .map_err(|e| EngineError::Io {
            context: "Failed to create scratch directory".to_string(),
            source: e,
        })
}

/// Uniquely named, empty PDF path for one print, in the engine's scratch directory (created on
/// first use). A renderer that exits cleanly without writing leaves it empty.
pub(crate) fn scratch_pdf(
    scratch: &mut Option<TempDir>,
    input: &Path,
) -> Result<TempPath, EngineError> {
    let dir = match scratch.take() {
        Some(dir) => dir,
        None => scratch_dir()?,
    };
    let dir = scratch.insert(dir);
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "print".to_string());
    tempfile::Builder::new()
        .prefix(&format!("{}-", stem))
        .suffix(".pdf")
        .tempfile_in(dir.path())
        .map(tempfile::NamedTempFile::into_temp_path)
        .map_err(|e| EngineError::Io {
            context: format!("Failed to create output file in {}", dir.path().display()),
            source: e,
        })
}

/// Read the PDF an engine wrote, rejecting a missing or empty file.
pub(crate) fn read_pdf(program: &str, path: &Path) -> Result<Vec<u8>, EngineError> {
    let bytes = std::fs::read(path).map_err(|e| EngineError::Io {
        context: format!("Failed to read {} output {}", program, path.display()),
        source: e,
    })?;
    if bytes.is_empty() {
        return Err(EngineError::EmptyOutput {
            program: program.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(bytes)
}
