//! Split a combined PDF into one standalone PDF per page-map section.
//!
//! Every section is extracted from a fresh copy of the combined document: pages after the
//! section are removed highest index first, then pages before it from `start_page - 1` down
//! to 0, so an index is never shifted by an earlier removal. A cover page, when configured,
//! is copied out of the covers document and becomes page 0 of the section.

use crate::error::{PipelineError, OP_LOAD_COVERS, OP_LOAD_MAIN};
use crate::page_map::{validate, RawPageMap, Section};
use crate::pdf::{PdfDocument, PdfError};
use std::path::PathBuf;

/// Where and how section files are produced. Absent config means no sectioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionConfig {
    /// Base filename shared with the combined PDF, e.g. `publication`.
    pub filename: String,
    pub output_dir: PathBuf,
    /// Prepend each section's cover page from the covers document.
    pub cover_page: bool,
}

impl SectionConfig {
    pub fn new(filename: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            output_dir: output_dir.into(),
            cover_page: false,
        }
    }

    pub fn with_cover_page(mut self, cover_page: bool) -> Self {
        self.cover_page = cover_page;
        self
    }

    /// `output_dir/{filename}-{id}.pdf`, with any leading `page-` dropped from the id.
    pub fn section_path(&self, section: &Section) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}.pdf", self.filename, section.file_stem()))
    }
}

/// One extracted section, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionOutput {
    pub section: Section,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Produce one output per validated section of `raw`, in page-map order.
///
/// `combined` is never modified. `covers` is only loaded when cover pages are configured.
/// Without `config` nothing is loaded and the result is empty.
pub fn split<D: PdfDocument>(
    combined: &[u8],
    covers: Option<&[u8]>,
    raw: &RawPageMap,
    config: Option<&SectionConfig>,
) -> Result<Vec<SectionOutput>, PipelineError> {
    let Some(config) = config else {
        log::debug!("Sectioning not configured; skipping split");
        return Ok(Vec::new());
    };

    let main = D::load(combined).map_err(|e| PipelineError::DocumentLoad {
        tool: D::TOOL,
        operation: OP_LOAD_MAIN,
        source: e,
    })?;
    let covers = match covers {
        Some(bytes) if config.cover_page => {
            Some(D::load(bytes).map_err(|e| PipelineError::DocumentLoad {
                tool: D::TOOL,
                operation: OP_LOAD_COVERS,
                source: e,
            })?)
        }
        _ => None,
    };

    let page_map = validate(raw, main.page_count()).map_err(|e| {
        let id = e.section().to_string();
        PipelineError::section(D::TOOL, &id, e)
    })?;

    let mut outputs = Vec::with_capacity(page_map.len());
    for section in page_map.sections() {
        let bytes = extract(&main, covers.as_ref(), section)
            .map_err(|e| PipelineError::section(D::TOOL, &section.id, e))?;
        let path = config.section_path(section);
        log::debug!(
            "Extracted {} (pages {}..={}) -> {}",
            section.id,
            section.range.start_page,
            section.range.end_page,
            path.display()
        );
        outputs.push(SectionOutput {
            section: section.clone(),
            path,
            bytes,
        });
    }
    Ok(outputs)
}

fn extract<D: PdfDocument>(
    main: &D,
    covers: Option<&D>,
    section: &Section,
) -> Result<Vec<u8>, PdfError> {
    let range = &section.range;
    let mut doc = main.copy();
    for index in (range.end_page + 1..doc.page_count()).rev() {
        doc.remove_page(index)?;
    }
    for index in (0..range.start_page).rev() {
        doc.remove_page(index)?;
    }
    if let (Some(covers), Some(cover)) = (covers, range.cover_page) {
        doc.prepend_page_from(covers, cover)?;
    }
    doc.to_bytes()
}
