//! Progress reporting and cancellation.
//!
//! [`CancellationToken`] is the single cooperative cancellation signal of a
//! job (and, separately, of each worker). [`Progress`] is the snapshot the
//! caller receives through
//! [`ExtractionEvents::on_progress`](crate::ExtractionEvents::on_progress).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

/// A snapshot of extraction progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Frames emitted so far in the current engine run.
    pub frames_done: u64,
    /// Best current estimate of the total, if the adapter knows one.
    pub estimated_total: Option<u64>,
    /// Completion percentage (0.0 - 100.0), if the total is known.
    pub percent: Option<f32>,
    /// Wall-clock time since the engine run started.
    pub elapsed: Duration,
}

/// Cooperative cancellation token.
///
/// Clone it and share it between threads; [`cancel`](CancellationToken::cancel)
/// from any of them is observed by all clones. Blocking code polls
/// [`is_cancelled`](CancellationToken::is_cancelled) at each frame boundary;
/// async code can await [`cancelled`](CancellationToken::cancelled).
///
/// # Example
///
/// ```
/// use framepack::CancellationToken;
///
/// let token = CancellationToken::new();
/// let clone = token.clone();
/// token.cancel();
/// assert!(clone.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            state: Arc::new(sender),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns once the
        // flag flips.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks timing for one engine run and builds [`Progress`] snapshots.
pub(crate) struct ProgressTracker {
    start_time: Instant,
    frames_done: u64,
    estimated_total: Option<u64>,
}

impl ProgressTracker {
    pub(crate) fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames_done: 0,
            estimated_total: None,
        }
    }

    /// Record the adapter's latest counts and build a snapshot.
    ///
    /// The estimate only ever grows: an adapter that reports a smaller total
    /// than frames already produced is corrected upward.
    pub(crate) fn update(&mut self, frames_done: u64, estimated_total: Option<u64>) -> Progress {
        self.frames_done = frames_done;
        if let Some(total) = estimated_total {
            self.estimated_total = Some(total.max(frames_done));
        }

        let percent = self
            .estimated_total
            .filter(|&total| total > 0)
            .map(|total| (self.frames_done as f32 / total as f32 * 100.0).min(100.0));

        Progress {
            frames_done: self.frames_done,
            estimated_total: self.estimated_total,
            percent,
            elapsed: self.start_time.elapsed(),
        }
    }
}
