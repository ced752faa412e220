//! Headless Chromium adapter.
//!
//! Printing uses `--print-to-pdf`. The page map is the rendered document's `pageMap` global;
//! the pagination handler in the publication mirrors it into
//! `<script id="pageMap" type="application/json">` once layout settles, and this adapter
//! reads that element back from `--dump-dom` after the same virtual time budget.

use crate::cancel::CancellationToken;
use crate::engine::{process, read_pdf, resolve_input, scratch_pdf, EngineError, RenderEngine, Step};
use crate::page_map::RawPageMap;
use scraper::{Html, Selector};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const DEFAULT_PROGRAM: &str = "chromium";
/// Time the document's scripts get to paginate before printing or dumping the DOM.
const DEFAULT_VIRTUAL_TIME_BUDGET_MS: u64 = 30_000;
const PAGE_MAP_SELECTOR: &str = "script#pageMap";

/// Chromium run headless as a one-shot child process per call.
#[derive(Debug)]
pub struct BrowserEngine {
    program: String,
    virtual_time_budget_ms: u64,
    extra_args: Vec<String>,
    scratch: Option<TempDir>,
}

impl BrowserEngine {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BrowserEngineBuilder {
        BrowserEngineBuilder::default()
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--run-all-compositor-stages-before-draw")
            .arg(format!(
                "--virtual-time-budget={}",
                self.virtual_time_budget_ms
            ))
            .args(&self.extra_args);
        command
    }
}

impl Default for BrowserEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// `file://` URL for an absolute path.
fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{}", s)
    } else {
        format!("file:///{}", s)
    }
}

/// Pull the mirrored `pageMap` out of a dumped DOM. No element means no page map.
pub(crate) fn extract_page_map(program: &str, html: &str) -> Result<RawPageMap, EngineError> {
    let selector = Selector::parse(PAGE_MAP_SELECTOR).map_err(|e| EngineError::Selector {
        selector: PAGE_MAP_SELECTOR.to_string(),
        reason: e.to_string(),
    })?;
    let document = Html::parse_document(html);
    let Some(element) = document.select(&selector).next() else {
        log::debug!("{}: no {} element in the rendered document", program, PAGE_MAP_SELECTOR);
        return Ok(RawPageMap::new());
    };
    let json: String = element.text().collect();
    RawPageMap::from_json(&json).map_err(|e| EngineError::PageMap {
        program: program.to_string(),
        source: e,
    })
}

impl RenderEngine for BrowserEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn print(
        &mut self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<Step<Vec<u8>>, EngineError> {
        let input = resolve_input(input)?;
        let url = file_url(&input);
        let output = scratch_pdf(&mut self.scratch, &input)?;

        let mut command = self.base_command();
        command
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(&url);
        let Step::Completed(result) = process::run(command, &self.program, cancel)? else {
            return Ok(Step::Cancelled);
        };
        result.check(&self.program)?;
        read_pdf(&self.program, &output).map(Step::Completed)
    }

    fn page_map(
        &mut self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<Step<RawPageMap>, EngineError> {
        let url = file_url(&resolve_input(input)?);
        let mut command = self.base_command();
        command.arg("--dump-dom").arg(&url);
        let Step::Completed(result) = process::run(command, &self.program, cancel)? else {
            return Ok(Step::Cancelled);
        };
        let result = result.check(&self.program)?;
        let html = String::from_utf8_lossy(&result.stdout);
        extract_page_map(&self.program, &html).map(Step::Completed)
    }

    fn close(&mut self) {
        if let Some(dir) = self.scratch.take() {
            if let Err(e) = dir.close() {
                log::warn!("Could not remove scratch directory: {}", e);
            }
        }
    }
}

/// Builder for BrowserEngine with optional program path, time budget, and extra flags.
#[derive(Debug)]
pub struct BrowserEngineBuilder {
    program: String,
    virtual_time_budget_ms: u64,
    extra_args: Vec<String>,
}

impl Default for BrowserEngineBuilder {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            virtual_time_budget_ms: DEFAULT_VIRTUAL_TIME_BUDGET_MS,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserEngineBuilder {
    /// Browser executable. Default `chromium`.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Virtual time the page gets before print/dump. Default 30000 ms.
    pub fn virtual_time_budget_ms(mut self, ms: u64) -> Self {
        self.virtual_time_budget_ms = ms;
        self
    }

    /// Extra command-line flags, e.g. `--no-sandbox` in containers.
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn build(self) -> BrowserEngine {
        BrowserEngine {
            program: self.program,
            virtual_time_budget_ms: self.virtual_time_budget_ms,
            extra_args: self.extra_args,
            scratch: None,
        }
    }
}
