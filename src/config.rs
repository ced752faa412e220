//! Optional config file loading. Search order: ./folio.toml, then
//! $XDG_CONFIG_HOME/folio/config.toml (or ~/.config/folio/config.toml).

use crate::sectioner::SectionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILENAME: &str = "publication";

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Render engine: browser (default) or batch.
    pub engine: Option<String>,
    /// Base filename of the combined PDF and prefix of every section PDF.
    pub filename: Option<String>,
    /// Directory the combined and section PDFs are written to. Relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTML rendered to the covers document when cover pages are enabled.
    pub covers_input: Option<PathBuf>,
    /// Present (even empty) enables per-section PDFs.
    pub page_pdf: Option<PagePdfConfig>,
    pub browser: Option<BrowserConfig>,
    pub batch: Option<BatchConfig>,
}

/// `[page_pdf]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PagePdfConfig {
    /// Prepend each section's cover page from the covers document (default false).
    pub cover_page: Option<bool>,
}

/// `[browser]` table: headless Chromium settings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct BrowserConfig {
    /// Executable name or path (default chromium).
    pub program: Option<String>,
    /// Milliseconds of virtual time scripts get before printing (default 30000).
    pub virtual_time_budget_ms: Option<u64>,
    /// Extra flags, e.g. ["--no-sandbox"].
    pub extra_args: Option<Vec<String>>,
}

/// `[batch]` table: Prince-style batch renderer settings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct BatchConfig {
    /// Executable name or path (default prince).
    pub program: Option<String>,
    /// Arguments before the input when printing.
    pub args: Option<Vec<String>>,
    /// Arguments before the input for the run that prints the page map to stdout.
    pub page_map_args: Option<Vec<String>>,
}

impl Config {
    /// Section output settings, or None when `[page_pdf]` is absent.
    pub fn section_config(&self, filename: &str, output_dir: &Path) -> Option<SectionConfig> {
        self.page_pdf.as_ref().map(|p| {
            SectionConfig::new(filename, output_dir).with_cover_page(p.cover_page.unwrap_or(false))
        })
    }
}

/// Search order: (1) ./folio.toml, (2) $XDG_CONFIG_HOME/folio/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("folio.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("folio").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            return load_config_file(path).map(Some);
        }
    }
    Ok(None)
}

/// Read and parse one config file.
pub fn load_config_file(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}
