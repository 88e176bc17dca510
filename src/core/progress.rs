//! Progress reporting utilities using indicatif.
//!
//! Candidate batches can take minutes when tests are slow, so every
//! generation gets its own bar. Bars are hidden when stderr is not a TTY.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

/// Style templates for the progress bars used during amplification.
pub mod styles {
    use super::*;

    /// Progress bar style for a batch of sandbox executions.
    pub fn batch_progress() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.green/white}] {pos}/{len} {msg}")
            .expect("valid template")
            .progress_chars("=>-")
    }

    /// Spinner style for indeterminate operations (building, scoring).
    pub fn spinner() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template")
    }
}

/// A thread-safe progress tracker shared by the sandbox workers of one batch.
#[derive(Clone)]
pub struct ProgressTracker {
    bar: ProgressBar,
    counter: Arc<AtomicUsize>,
}

impl ProgressTracker {
    /// Create a visible tracker for a batch of `total` executions.
    pub fn new(total: usize, prefix: &str, message: &str) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(styles::batch_progress());
        bar.set_prefix(prefix.to_string());
        bar.set_message(message.to_string());

        Self {
            bar,
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a hidden progress tracker (for non-TTY output or `--no-progress`).
    pub fn hidden(total: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total as u64);

        Self {
            bar,
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a tracker that is visible only when stderr is a terminal.
    pub fn for_batch(total: usize, prefix: &str, message: &str, enabled: bool) -> Self {
        if enabled && is_tty() {
            Self::new(total, prefix, message)
        } else {
            Self::hidden(total)
        }
    }

    /// Increment the progress counter by one.
    pub fn inc(&self) {
        self.counter.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
    }

    /// Set the current progress message.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.bar.set_message(msg.into());
    }

    /// Finish and clear the progress bar.
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Check if stderr is a TTY (for deciding whether to show progress bars).
pub fn is_tty() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}

/// Create a spinner for indeterminate operations.
pub fn create_spinner(message: &str, enabled: bool) -> ProgressBar {
    if enabled && is_tty() {
        let bar = ProgressBar::new_spinner();
        bar.set_style(styles::spinner());
        bar.set_message(message.to_string());
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    }
}
