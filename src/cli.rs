//! CLI parsing and orchestration. Parses args, runs render → split → write or split-only, and
//! maps errors to exit codes.

use crate::cancel::CancellationToken;
use crate::config::{self, Config, DEFAULT_FILENAME};
use crate::engine::{build_engine, EngineKind};
use crate::error::PipelineError;
use crate::page_map::RawPageMap;
use crate::pdf::LopdfDocument;
use crate::pipeline::{write_outputs, Pipeline, PipelineOutcome, PipelineRequest, Stage};
use crate::sectioner::{split, SectionConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::Command as Process;
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Pipeline(e) => match e {
                PipelineError::Config(_) => 1,
                PipelineError::Render { .. } => 2,
                PipelineError::DocumentLoad { .. }
                | PipelineError::SectionExtraction { .. }
                | PipelineError::Write { .. }
                | PipelineError::WriteFailures(_) => 3,
            },
        }
    }
}

/// Causes below `error` for --verbose output. A cause whose text is already part of a line
/// printed above it is skipped.
pub fn distinct_causes(error: &dyn std::error::Error) -> Vec<String> {
    let mut shown = error.to_string();
    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !shown.contains(&text) {
            shown.push('\n');
            shown.push_str(&text);
            causes.push(text);
        }
        source = cause.source();
    }
    causes
}

/// How a successful invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Done,
    Cancelled,
}

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Render a built HTML publication to PDF and split it into per-section PDFs")]
#[command(
    after_help = "Config file keys (engine, filename, output_dir, covers_input, [page_pdf], [browser], [batch]) are read from ./folio.toml or the user config directory. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress progress output (errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log every step and print the full error chain.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render the publication, then write the combined PDF and (if [page_pdf] is configured)
    /// one PDF per section.
    Render(RenderArgs),
    /// Split an existing combined PDF using a page map JSON file.
    Split(SplitArgs),
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// Built HTML of the whole publication, e.g. _site/pdf.html.
    pub input: PathBuf,

    /// HTML rendering one cover page per section (overrides config covers_input).
    #[arg(long)]
    pub covers: Option<PathBuf>,

    /// Render engine: browser or batch (overrides config; default browser).
    #[arg(long, value_parser = EngineKind::parse)]
    pub engine: Option<EngineKind>,

    /// Combined PDF path. Default: {output_dir}/{filename}.pdf.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for the combined and section PDFs (overrides config; default .).
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Base filename (overrides config; default publication).
    #[arg(long)]
    pub filename: Option<String>,

    /// Render and split, print what would be written, write nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Open the combined PDF after writing it.
    #[arg(long)]
    pub open: bool,
}

#[derive(clap::Args, Debug)]
pub struct SplitArgs {
    /// Combined PDF to split.
    pub combined: PathBuf,

    /// Page map JSON as reported by the render engine.
    #[arg(long)]
    pub page_map: PathBuf,

    /// Covers PDF; sections with a coverPage get that page prepended.
    #[arg(long)]
    pub covers_pdf: Option<PathBuf>,

    /// Directory for the section PDFs (overrides config; default .).
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Base filename (overrides config; default publication).
    #[arg(long)]
    pub filename: Option<String>,
}

/// Base filename: flag, then config, then default. Must be a bare name.
fn resolve_filename(flag: Option<&str>, config: &Config) -> Result<String, CliRunError> {
    let name = flag
        .or(config.filename.as_deref())
        .unwrap_or(DEFAULT_FILENAME)
        .trim();
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(CliRunError::InvalidInput(format!(
            "Invalid filename '{}': expected a bare name such as 'publication'.",
            name
        )));
    }
    Ok(name.to_string())
}

fn resolve_output_dir(flag: Option<&Path>, config: &Config) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_engine(flag: Option<EngineKind>, config: &Config) -> Result<EngineKind, CliRunError> {
    match (flag, config.engine.as_deref()) {
        (Some(kind), _) => Ok(kind),
        (None, Some(s)) => EngineKind::parse(s)
            .map_err(|e| CliRunError::InvalidInput(format!("Invalid config engine: {}", e))),
        (None, None) => Ok(EngineKind::default()),
    }
}

/// Input must be an existing file.
fn validate_input(path: &Path, what: &str) -> Result<(), CliRunError> {
    if !path.is_file() {
        return Err(CliRunError::InvalidInput(format!(
            "Cannot read {}: {}: no such file.",
            what,
            path.display()
        )));
    }
    Ok(())
}

fn read_input(path: &Path, what: &str) -> Result<Vec<u8>, CliRunError> {
    std::fs::read(path).map_err(|e| {
        CliRunError::InvalidInput(format!("Cannot read {} {}: {}", what, path.display(), e))
    })
}

/// Open `path` with the platform viewer. Best effort.
fn open_path(path: &Path) {
    let opened = Process::new("open")
        .arg(path)
        .status()
        .is_ok_and(|status| status.success());
    if !opened {
        if let Err(e) = Process::new("xdg-open").arg(path).status() {
            log::warn!("Could not open {}: {}", path.display(), e);
        }
    }
}

fn spinner() -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner} {msg} ({elapsed})")
    {
        bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Entry point for the CLI. Cancellation is a successful [Completion::Cancelled].
pub fn run(args: &Args, cancel: &CancellationToken) -> Result<Completion, CliRunError> {
    let config = config::load_config()
        .map_err(CliRunError::InvalidInput)?
        .unwrap_or_default();
    match &args.command {
        Command::Render(render_args) => run_render(args, render_args, &config, cancel),
        Command::Split(split_args) => run_split(split_args, &config, cancel, args.quiet),
    }
}

fn run_render(
    args: &Args,
    render: &RenderArgs,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Completion, CliRunError> {
    let filename = resolve_filename(render.filename.as_deref(), config)?;
    let output_dir = resolve_output_dir(render.output_dir.as_deref(), config);
    let kind = resolve_engine(render.engine, config)?;
    let covers_input = render
        .covers
        .clone()
        .or_else(|| config.covers_input.clone());

    validate_input(&render.input, "input")?;
    let sections = config.section_config(&filename, &output_dir);
    if sections.as_ref().is_some_and(|s| s.cover_page) {
        if let Some(covers) = &covers_input {
            validate_input(covers, "covers input")?;
        }
    }

    let request = PipelineRequest {
        input: render.input.clone(),
        covers_input,
        combined_output: render
            .output
            .clone()
            .unwrap_or_else(|| output_dir.join(format!("{}.pdf", filename))),
        sections,
        dry_run: render.dry_run,
    };

    let mut engine = build_engine(kind, config);
    let progress = if args.quiet || args.verbose {
        None
    } else {
        Some(spinner())
    };
    let observer = |stage: Stage| {
        if let Some(bar) = &progress {
            if !stage.is_terminal() {
                bar.set_message(stage.describe());
            }
        }
    };
    let mut pipeline = Pipeline::new(&mut *engine, cancel.clone()).on_stage(&observer);
    let outcome = pipeline.run(&request);
    drop(pipeline);
    if let Some(bar) = &progress {
        bar.finish_and_clear();
    }

    match outcome? {
        PipelineOutcome::Cancelled => {
            if !args.quiet {
                eprintln!("Cancelled.");
            }
            Ok(Completion::Cancelled)
        }
        PipelineOutcome::Done(report) => {
            if !args.quiet {
                let verb = if report.written { "Wrote" } else { "Would write" };
                eprintln!("{} {}", verb, report.combined.display());
                for path in &report.sections {
                    eprintln!("{} {}", verb, path.display());
                }
            }
            if render.open && report.written {
                open_path(&report.combined);
            }
            Ok(Completion::Done)
        }
    }
}

fn run_split(
    split_args: &SplitArgs,
    config: &Config,
    cancel: &CancellationToken,
    quiet: bool,
) -> Result<Completion, CliRunError> {
    let filename = resolve_filename(split_args.filename.as_deref(), config)?;
    let output_dir = resolve_output_dir(split_args.output_dir.as_deref(), config);

    let combined = read_input(&split_args.combined, "combined PDF")?;
    let page_map_json = String::from_utf8(read_input(&split_args.page_map, "page map")?)
        .map_err(|e| CliRunError::InvalidInput(format!("Page map is not UTF-8: {}", e)))?;
    let page_map = RawPageMap::from_json(&page_map_json).map_err(|e| {
        CliRunError::InvalidInput(format!(
            "Invalid page map {}: {}",
            split_args.page_map.display(),
            e
        ))
    })?;
    let covers = split_args
        .covers_pdf
        .as_deref()
        .map(|p| read_input(p, "covers PDF"))
        .transpose()?;

    let section_config =
        SectionConfig::new(filename, output_dir).with_cover_page(covers.is_some());
    let outputs = split::<LopdfDocument>(
        &combined,
        covers.as_deref(),
        &page_map,
        Some(&section_config),
    )?;
    if outputs.is_empty() {
        log::warn!(
            "{} has no placed sections; nothing to write",
            split_args.page_map.display()
        );
    }

    if cancel.is_cancelled() {
        if !quiet {
            eprintln!("Cancelled.");
        }
        return Ok(Completion::Cancelled);
    }
    write_outputs(None, &outputs)?;
    if !quiet {
        for output in &outputs {
            eprintln!("Wrote {}", output.path.display());
        }
    }
    Ok(Completion::Done)
}
