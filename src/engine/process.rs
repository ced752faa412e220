//! Run an engine binary as a child process that can be cancelled mid-flight.

use crate::cancel::CancellationToken;
use crate::engine::{EngineError, Step};
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the child is polled for exit and the token for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a finished child process.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Turn a non-zero exit into [EngineError::Failed] carrying the tool's stderr verbatim.
    pub fn check(self, program: &str) -> Result<ProcessOutput, EngineError> {
        if self.status.success() {
            return Ok(self);
        }
        let stderr = String::from_utf8_lossy(&self.stderr).trim().to_string();
        let stderr = if stderr.is_empty() {
            String::from_utf8_lossy(&self.stdout).trim().to_string()
        } else {
            stderr
        };
        Err(EngineError::Failed {
            program: program.to_string(),
            status: self.status,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error just truncates the capture; the exit status still decides success.
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Spawn `command` and wait for it, killing it if `cancel` trips first.
///
/// Stdout and stderr are drained on their own threads so a chatty child cannot block on a
/// full pipe while we poll.
pub(crate) fn run(
    mut command: Command,
    program: &str,
    cancel: &CancellationToken,
) -> Result<Step<ProcessOutput>, EngineError> {
    if cancel.is_cancelled() {
        return Ok(Step::Cancelled);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    log::debug!("Running {:?}", command);
    let mut child = command.spawn().map_err(|e| EngineError::Spawn {
        program: program.to_string(),
        source: e,
    })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if cancel.is_cancelled() {
            log::info!("Stopping {} (cancelled)", program);
            // Grandchildren may keep the pipes open, so the drain threads are not joined.
            let _ = child.kill();
            let _ = child.wait();
            return Ok(Step::Cancelled);
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(EngineError::Io {
                    context: format!("Failed to wait for {}", program),
                    source: e,
                });
            }
        }
    };

    Ok(Step::Completed(ProcessOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn captures_stdout_of_successful_child() -> Result<(), EngineError> {
        let token = CancellationToken::new();
        let Step::Completed(output) = run(sh("printf '{\"a\":1}'"), "sh", &token)? else {
            panic!("not cancelled");
        };
        let output = output.check("sh")?;
        assert_eq!(output.stdout, b"{\"a\":1}");
        Ok(())
    }

    #[test]
    fn non_zero_exit_reports_stderr() -> Result<(), EngineError> {
        let token = CancellationToken::new();
        let Step::Completed(output) = run(sh("echo 'license expired' >&2; exit 3"), "sh", &token)?
        else {
            panic!("not cancelled");
        };
        match output.check("sh") {
            Err(EngineError::Failed { stderr, status, .. }) => {
                assert_eq!(stderr, "license expired");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let token = CancellationToken::new();
        let result = run(
            Command::new("folio-test-no-such-binary"),
            "folio-test-no-such-binary",
            &token,
        );
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }

    #[test]
    fn cancellation_kills_long_running_child() -> Result<(), EngineError> {
        let token = CancellationToken::new();
        let remote = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });
        let started = Instant::now();
        let step = run(sh("sleep 30"), "sh", &token)?;
        assert!(matches!(step, Step::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn already_cancelled_token_never_spawns() -> Result<(), EngineError> {
        let token = CancellationToken::new();
        token.cancel();
        let step = run(Command::new("folio-test-no-such-binary"), "x", &token)?;
        assert!(matches!(step, Step::Cancelled));
        Ok(())
    }
}
