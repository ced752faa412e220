//! Cooperative cancellation: a shared flag the pipeline checks between stages and render
//! engines poll while their child process runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit code used when the run is cancelled (128 + SIGINT).
pub const EXIT_CANCELLED: i32 = 130;

/// Cloneable cancellation flag. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Register a Ctrl-C hook that requests cancellation of `token`.
///
/// The first interrupt only trips the token so the pipeline can close its renderer and return;
/// a second interrupt exits the process immediately.
pub fn install_interrupt_handler(token: CancellationToken) -> Result<(), ctrlc::Error> {
    let mut interrupted = false;
    ctrlc::set_handler(move || {
        if interrupted {
            std::process::exit(EXIT_CANCELLED);
        }
        interrupted = true;
        log::warn!("Interrupt received; cancelling (press Ctrl-C again to exit immediately)");
        token.cancel();
    })
}
