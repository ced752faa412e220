//! Batch engine adapter (Prince and compatible command-line renderers).
//!
//! The PDF comes from `<program> <args> <input> -o <scratch.pdf>`. The page map comes from a
//! second run of the same binary against the same input with the page-map arguments (by
//! default a script that prints the page map as JSON and skips PDF output); its stdout is
//! parsed as the page map.

use crate::cancel::CancellationToken;
use crate::engine::{process, read_pdf, resolve_input, scratch_pdf, EngineError, RenderEngine, Step};
use crate::page_map::RawPageMap;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const DEFAULT_PROGRAM: &str = "prince";
const DEFAULT_ARGS: [&str; 1] = ["--javascript"];
const DEFAULT_PAGE_MAP_ARGS: [&str; 4] = ["--javascript", "--script", "page-map.js", "--no-pdf"];

/// Batch renderer invoked once per print and once per page map request.
#[derive(Debug)]
pub struct BatchEngine {
    program: String,
    args: Vec<String>,
    page_map_args: Vec<String>,
    scratch: Option<TempDir>,
}

impl BatchEngine {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BatchEngineBuilder {
        BatchEngineBuilder::default()
    }
}

impl Default for BatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the page-map run's stdout. Blank output means the document reported no page map.
pub(crate) fn parse_page_map_output(program: &str, stdout: &[u8]) -> Result<RawPageMap, EngineError> {
    let text = String::from_utf8_lossy(stdout);
    RawPageMap::from_json(&text).map_err(|e| EngineError::PageMap {
        program: program.to_string(),
        source: e,
    })
}

impl RenderEngine for BatchEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn print(
        &mut self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<Step<Vec<u8>>, EngineError> {
        let input = resolve_input(input)?;
        let output = scratch_pdf(&mut self.scratch, &input)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&input)
            .arg("-o")
            .arg(output.as_os_str());
        let Step::Completed(result) = process::run(command, &self.program, cancel)? else {
            return Ok(Step::Cancelled);
        };
        let result = result.check(&self.program)?;
        // Prince reports recoverable problems (missing fonts, bad CSS) on stderr even on success.
        for line in String::from_utf8_lossy(&result.stderr).lines() {
            if !line.trim().is_empty() {
                log::warn!("{}: {}", self.program, line.trim());
            }
        }
        read_pdf(&self.program, &output).map(Step::Completed)
    }

    fn page_map(
        &mut self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<Step<RawPageMap>, EngineError> {
        let input = resolve_input(input)?;
        let mut command = Command::new(&self.program);
        command.args(&self.page_map_args).arg(&input);
        let Step::Completed(result) = process::run(command, &self.program, cancel)? else {
            return Ok(Step::Cancelled);
        };
        let result = result.check(&self.program)?;
        parse_page_map_output(&self.program, &result.stdout).map(Step::Completed)
    }

    fn close(&mut self) {
        if let Some(dir) = self.scratch.take() {
            if let Err(e) = dir.close() {
                log::warn!("Could not remove scratch directory: {}", e);
            }
        }
    }
}

/// Builder for BatchEngine with optional program path and argument lists.
#[derive(Debug)]
pub struct BatchEngineBuilder {
    program: String,
    args: Vec<String>,
    page_map_args: Vec<String>,
}

impl Default for BatchEngineBuilder {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: DEFAULT_ARGS.iter().map(|s| s.to_string()).collect(),
            page_map_args: DEFAULT_PAGE_MAP_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BatchEngineBuilder {
    /// Renderer executable. Default `prince`.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments placed before the input when printing.
    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Arguments placed before the input for the page-map run.
    pub fn page_map_args(mut self, args: Vec<String>) -> Self {
        self.page_map_args = args;
        self
    }

    pub fn build(self) -> BatchEngine {
        BatchEngine {
            program: self.program,
            args: self.args,
            page_map_args: self.page_map_args,
            scratch: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_page_map_output_json() -> Result<(), EngineError> {
        let stdout = br#"{"page-ch1":{"title":"One","startPage":3,"endPage":9,"coverPage":0}}
"#;
        let map = parse_page_map_output("prince", stdout)?;
        assert_eq!(map.get("page-ch1").and_then(|s| s.cover_page), Some(0));
        Ok(())
    }

    #[test]
    fn parse_page_map_output_blank_is_empty() -> Result<(), EngineError> {
        assert!(parse_page_map_output("prince", b"\n")?.is_empty());
        Ok(())
    }

    #[test]
    fn parse_page_map_output_garbage_is_error() {
        let result = parse_page_map_output("prince", b"prince: warning: no fonts");
        match result {
            Err(EngineError::PageMap { program, .. }) => assert_eq!(program, "prince"),
            other => panic!("expected PageMap error, got {:?}", other),
        }
    }

    #[test]
    fn defaults() {
        let engine = BatchEngine::new();
        assert_eq!(engine.name(), "prince");
        assert_eq!(engine.args, vec!["--javascript".to_string()]);
        assert!(engine.page_map_args.contains(&"--no-pdf".to_string()));
    }

    #[cfg(unix)]
    mod with_stub_script {
        use super::*;
        use std::path::PathBuf;

        /// Write a shell script standing in for the renderer; it runs as `sh <script> ...`.
        fn stub(dir: &Path, body: &str) -> std::io::Result<String> {
            let path = dir.join("renderer.sh");
            std::fs::write(&path, body)?;
            Ok(path.to_string_lossy().into_owned())
        }

        fn input(dir: &Path) -> std::io::Result<PathBuf> {
            let input = dir.join("pdf.html");
            std::fs::write(&input, "<html></html>")?;
            Ok(input)
        }

        #[test]
        fn print_reads_pdf_written_after_dash_o() -> Result<(), Box<dyn std::error::Error>> {
            let dir = tempfile::tempdir()?;
            let input = input(dir.path())?;
            let script = stub(
                dir.path(),
                r#"while [ "$#" -gt 0 ]; do
  if [ "$1" = "-o" ]; then printf '%%PDF-stub' > "$2"; exit 0; fi
  shift
done
exit 1
"#,
            )?;
            let mut engine = BatchEngine::builder().program("sh").args(vec![script]).build();
            let step = engine.print(&input, &CancellationToken::new())?;
            assert_eq!(step, Step::Completed(b"%PDF-stub".to_vec()));
            engine.close();
            Ok(())
        }

        #[test]
        fn page_map_parses_stdout() -> Result<(), Box<dyn std::error::Error>> {
            let dir = tempfile::tempdir()?;
            let input = input(dir.path())?;
            let script = stub(
                dir.path(),
                "echo '{\"page-a\":{\"startPage\":0,\"endPage\":1}}'\n",
            )?;
            let mut engine = BatchEngine::builder()
                .program("sh")
                .page_map_args(vec![script])
                .build();
            let Step::Completed(map) = engine.page_map(&input, &CancellationToken::new())? else {
                panic!("not cancelled");
            };
            assert_eq!(map.get("page-a").map(|s| s.end_page), Some(1));
            Ok(())
        }

        #[test]
        fn silent_renderer_never_returns_an_earlier_print() -> Result<(), Box<dyn std::error::Error>> {
            let dir = tempfile::tempdir()?;
            let main = dir.path().join("main/index.html");
            let covers = dir.path().join("covers/index.html");
            for path in [&main, &covers] {
                std::fs::create_dir_all(path.parent().unwrap_or(dir.path()))?;
                std::fs::write(path, "<html></html>")?;
            }
            // Writes a PDF for the main input only; exits 0 either way.
            let script = stub(
                dir.path(),
                r#"case "$1" in */main/*) printf 'MAIN-PDF' > "$3" ;; esac
exit 0
"#,
            )?;
            let mut engine = BatchEngine::builder().program("sh").args(vec![script]).build();
            let token = CancellationToken::new();
            assert_eq!(engine.print(&main, &token)?, Step::Completed(b"MAIN-PDF".to_vec()));
            match engine.print(&covers, &token) {
                Err(EngineError::EmptyOutput { program, .. }) => assert_eq!(program, "sh"),
                other => panic!("expected EmptyOutput, got {:?}", other),
            }
            engine.close();
            Ok(())
        }

        #[test]
        fn failing_renderer_reports_stderr() -> Result<(), Box<dyn std::error::Error>> {
            let dir = tempfile::tempdir()?;
            let input = input(dir.path())?;
            let script = stub(dir.path(), "echo 'error: license invalid' >&2\nexit 2\n")?;
            let mut engine = BatchEngine::builder().program("sh").args(vec![script]).build();
            match engine.print(&input, &CancellationToken::new()) {
                Err(EngineError::Failed { stderr, .. }) => {
                    assert_eq!(stderr, "error: license invalid")
                }
                other => panic!("expected Failed, got {:?}", other),
            }
            Ok(())
        }
    }
}
