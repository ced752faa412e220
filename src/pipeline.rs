//! Render → page map → (covers) → split → write orchestration.
//!
//! The [Pipeline] drives one [RenderEngine] through a fixed sequence of stages and checks the
//! cancellation token at every stage boundary. Cancellation ends the run with
//! [PipelineOutcome::Cancelled]; it is never reported as an error.

use crate::cancel::CancellationToken;
use crate::engine::{EngineError, RenderEngine, Step};
use crate::error::{
    PipelineError, OP_COVER_PAGE_MAP, OP_PAGE_MAP, OP_PRINT_COVERS, OP_PRINT_MAIN,
};
use crate::page_map::RawPageMap;
use crate::pdf::LopdfDocument;
use crate::sectioner::{split, SectionConfig, SectionOutput};
use std::path::{Path, PathBuf};

/// Where a run is. Observers see every transition, terminal ones included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    RenderingMain,
    ExtractingPageMap,
    RenderingCovers,
    ExtractingCoverPageMap,
    Splitting,
    Writing,
    Done,
    Cancelled,
    Failed,
}

impl Stage {
    /// Short progress message.
    pub fn describe(&self) -> &'static str {
        match self {
            Stage::Idle => "Waiting",
            Stage::RenderingMain => "Rendering PDF",
            Stage::ExtractingPageMap => "Reading page map",
            Stage::RenderingCovers => "Rendering cover pages",
            Stage::ExtractingCoverPageMap => "Reading cover page map",
            Stage::Splitting => "Splitting sections",
            Stage::Writing => "Writing files",
            Stage::Done => "Done",
            Stage::Cancelled => "Cancelled",
            Stage::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Cancelled | Stage::Failed)
    }
}

/// Inputs and outputs of one run.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Built HTML of the whole publication.
    pub input: PathBuf,
    /// HTML whose pages are the section covers. Required when cover pages are enabled.
    pub covers_input: Option<PathBuf>,
    /// Path the combined PDF is written to.
    pub combined_output: PathBuf,
    /// Per-section output; None disables sectioning.
    pub sections: Option<SectionConfig>,
    /// Run everything except writing.
    pub dry_run: bool,
}

impl PipelineRequest {
    fn wants_covers(&self) -> bool {
        self.sections.as_ref().is_some_and(|s| s.cover_page)
    }
}

/// What a finished run produced (or, for a dry run, would have produced).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub combined: PathBuf,
    pub sections: Vec<PathBuf>,
    pub written: bool,
    /// Problems that did not stop the run, also logged as warnings.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Done(PipelineReport),
    Cancelled,
}

/// One render-and-split run against a borrowed engine.
pub struct Pipeline<'a> {
    engine: &'a mut dyn RenderEngine,
    cancel: CancellationToken,
    stage: Stage,
    on_stage: Option<&'a dyn Fn(Stage)>,
}

impl<'a> Pipeline<'a> {
    pub fn new(engine: &'a mut dyn RenderEngine, cancel: CancellationToken) -> Self {
        Self {
            engine,
            cancel,
            stage: Stage::Idle,
            on_stage: None,
        }
    }

    /// Call `observer` on every stage transition.
    pub fn on_stage(mut self, observer: &'a dyn Fn(Stage)) -> Self {
        self.on_stage = Some(observer);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run to completion, cancellation, or the first unrecovered error.
    /// Engine resources are released on every path.
    pub fn run(&mut self, request: &PipelineRequest) -> Result<PipelineOutcome, PipelineError> {
        let result = self.execute(request);
        self.engine.close();
        let terminal = match &result {
            Ok(PipelineOutcome::Done(_)) => Stage::Done,
            Ok(PipelineOutcome::Cancelled) => Stage::Cancelled,
            Err(_) => Stage::Failed,
        };
        self.enter(terminal);
        result
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("Stage {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
        if let Some(observer) = self.on_stage {
            observer(stage);
        }
    }

    /// Move to `next` unless cancellation was requested. Returns false when cancelled.
    fn advance(&mut self, next: Stage) -> bool {
        if self.cancel.is_cancelled() {
            log::info!("Cancelled before {}", next.describe().to_lowercase());
            return false;
        }
        self.enter(next);
        true
    }

    fn engine_call<T>(
        &mut self,
        operation: &'static str,
        call: impl FnOnce(&mut dyn RenderEngine, &CancellationToken) -> Result<Step<T>, EngineError>,
    ) -> Result<Step<T>, PipelineError> {
        let result = call(&mut *self.engine, &self.cancel);
        result.map_err(|e| PipelineError::render(self.engine.name(), operation, e))
    }

    fn execute(&mut self, request: &PipelineRequest) -> Result<PipelineOutcome, PipelineError> {
        let covers_input = match (&request.covers_input, request.wants_covers()) {
            (Some(path), true) => Some(path.as_path()),
            (None, true) => {
                return Err(PipelineError::Config(
                    "cover pages are enabled but no covers input is configured".to_string(),
                ))
            }
            (_, false) => None,
        };

        if !self.advance(Stage::RenderingMain) {
            return Ok(PipelineOutcome::Cancelled);
        }
        log::info!("Rendering {} with {}", request.input.display(), self.engine.name());
        let Step::Completed(combined) =
            self.engine_call(OP_PRINT_MAIN, |engine, cancel| engine.print(&request.input, cancel))?
        else {
            return Ok(PipelineOutcome::Cancelled);
        };

        let mut page_map = RawPageMap::new();
        if request.sections.is_some() {
            if !self.advance(Stage::ExtractingPageMap) {
                return Ok(PipelineOutcome::Cancelled);
            }
            let Step::Completed(map) = self.engine_call(OP_PAGE_MAP, |engine, cancel| {
                engine.page_map(&request.input, cancel)
            })?
            else {
                return Ok(PipelineOutcome::Cancelled);
            };
            log::info!("Page map has {} section(s)", map.len());
            page_map = map;
        }

        let mut covers = None;
        if let Some(covers_input) = covers_input {
            if !self.advance(Stage::RenderingCovers) {
                return Ok(PipelineOutcome::Cancelled);
            }
            log::info!("Rendering cover pages from {}", covers_input.display());
            let Step::Completed(bytes) = self.engine_call(OP_PRINT_COVERS, |engine, cancel| {
                engine.print(covers_input, cancel)
            })?
            else {
                return Ok(PipelineOutcome::Cancelled);
            };
            covers = Some(bytes);

            if !self.advance(Stage::ExtractingCoverPageMap) {
                return Ok(PipelineOutcome::Cancelled);
            }
            let Step::Completed(cover_map) =
                self.engine_call(OP_COVER_PAGE_MAP, |engine, cancel| {
                    engine.page_map(covers_input, cancel)
                })?
            else {
                return Ok(PipelineOutcome::Cancelled);
            };
            let assigned = page_map.apply_cover_pages(&cover_map);
            log::debug!("Assigned {} cover page(s)", assigned);
        }

        if !self.advance(Stage::Splitting) {
            return Ok(PipelineOutcome::Cancelled);
        }
        let outputs = split::<LopdfDocument>(
            &combined,
            covers.as_deref(),
            &page_map,
            request.sections.as_ref(),
        )?;

        let mut warnings = Vec::new();
        if request.sections.is_some() && outputs.is_empty() {
            let warning = format!(
                "{} reported no placed sections for {}; only the combined PDF is produced",
                self.engine.name(),
                request.input.display()
            );
            log::warn!("{}", warning);
            warnings.push(warning);
        }

        let report = PipelineReport {
            combined: request.combined_output.clone(),
            sections: outputs.iter().map(|o| o.path.clone()).collect(),
            written: !request.dry_run,
            warnings,
        };
        if request.dry_run {
            log::info!(
                "Dry run: would write {} and {} section file(s)",
                report.combined.display(),
                report.sections.len()
            );
            return Ok(PipelineOutcome::Done(report));
        }

        if !self.advance(Stage::Writing) {
            return Ok(PipelineOutcome::Cancelled);
        }
        write_outputs(
            Some((request.combined_output.as_path(), combined.as_slice())),
            &outputs,
        )?;
        Ok(PipelineOutcome::Done(report))
    }
}

/// Write one file, creating its parent directories.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let write_error = |e| PipelineError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    std::fs::write(path, bytes).map_err(write_error)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Write the combined PDF (if given) and every section. A failed write does not stop the
/// others; a single failure is returned as is, several as [PipelineError::WriteFailures].
pub fn write_outputs(
    combined: Option<(&Path, &[u8])>,
    sections: &[SectionOutput],
) -> Result<(), PipelineError> {
    let files = combined
        .into_iter()
        .chain(sections.iter().map(|o| (o.path.as_path(), o.bytes.as_slice())));
    let mut failures: Vec<PipelineError> = files
        .filter_map(|(path, bytes)| write_file(path, bytes).err())
        .inspect(|e| log::warn!("{}", e))
        .collect();
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(PipelineError::WriteFailures(failures)),
    }
}
