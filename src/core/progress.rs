// ─── Progress reporting ───
// Callbacks are fire-and-forget; the core never guards against a panicking one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Percentage callback, always called with a value in `0.0..=100.0`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// "Currently working on" callback used by batch library/asset downloads.
pub type ItemFn = Arc<dyn Fn(&str) + Send + Sync>;

pub fn report(progress: Option<&ProgressFn>, value: f64) {
    if let Some(cb) = progress {
        cb(value.clamp(0.0, 100.0));
    }
}

/// Maps a stage's own 0..100 progress into its slice of the overall range.
#[derive(Clone)]
pub struct StageProgress {
    start: f64,
    end: f64,
    sink: Option<ProgressFn>,
}

impl StageProgress {
    pub fn new(start: f64, end: f64, sink: Option<ProgressFn>) -> Self {
        Self { start, end, sink }
    }

    pub fn remap(&self, sub: f64) -> f64 {
        let sub = sub.clamp(0.0, 100.0);
        self.start + (self.end - self.start) * sub / 100.0
    }

    pub fn report(&self, sub: f64) {
        report(self.sink.as_ref(), self.remap(sub));
    }

    pub fn begin(&self) {
        self.report(0.0);
    }

    pub fn finish(&self) {
        self.report(100.0);
    }

    /// A callback that feeds this stage, for handing to the downloader.
    pub fn as_callback(&self) -> Option<ProgressFn> {
        let sink = self.sink.clone()?;
        let (start, end) = (self.start, self.end);
        Some(Arc::new(move |sub: f64| {
            let sub = sub.clamp(0.0, 100.0);
            sink(start + (end - start) * sub / 100.0);
        }))
    }
}

/// Shared completed-count for a batch whose items finish on several workers.
pub struct BatchProgress {
    completed: AtomicUsize,
    total: usize,
    sink: Option<ProgressFn>,
}

impl BatchProgress {
    pub fn new(total: usize, sink: Option<ProgressFn>) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
            sink,
        }
    }

    /// Record one finished item and report the new percentage.
    pub fn complete_one(&self) -> usize {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.total > 0 {
            report(self.sink.as_ref(), done as f64 * 100.0 / self.total as f64);
        }
        done
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}
