//! Progress reporting for reconciliation passes.

use std::sync::Arc;

/// Something that can display the progress of a long-running pass.
///
/// Every method defaults to doing nothing, so sinks only implement what they
/// can show. Sinks are shared with the coordinator thread and must be
/// thread-safe.
pub trait ProgressSink: Send + Sync {
    fn set_indeterminate(&self, _indeterminate: bool) {}

    /// Fraction of the pass that is done, between 0.0 and 1.0.
    fn set_fraction(&self, _fraction: f64) {}

    /// Main status line.
    fn set_text(&self, _text: &str) {}

    /// Secondary status line, usually the item currently being processed.
    fn set_text2(&self, _text: &str) {}

    /// Marks the rest of the pass as impossible to cancel.
    fn start_non_cancelable_section(&self) {}
}

/// A sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl NoProgress {
    pub fn shared() -> Arc<dyn ProgressSink> {
        Arc::new(NoProgress)
    }
}

impl ProgressSink for NoProgress {}

/// A sink that forwards progress to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn set_fraction(&self, fraction: f64) {
        log::debug!("{:.0}% done", fraction * 100.0);
    }

    fn set_text(&self, text: &str) {
        if !text.is_empty() {
            log::info!("{}", text);
        }
    }

    fn set_text2(&self, text: &str) {
        if !text.is_empty() {
            log::trace!("{}", text);
        }
    }

    fn start_non_cancelable_section(&self) {
        log::debug!("Pass can no longer be cancelled");
    }
}

/// Counts processed units against a total fixed up front and pushes the
/// resulting fraction to a sink.
pub struct ProgressReporter {
    total: f64,
    done: usize,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(total: f64, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            total,
            done: 0,
            sink,
        }
    }

    /// Records one finished unit. Nothing is sent to the sink when the total
    /// is zero.
    pub fn report_one(&mut self, label: &str) {
        self.done += 1;

        if self.total > 0.0 {
            let fraction = (self.done as f64 / self.total).min(1.0);
            self.sink.set_fraction(fraction);
            self.sink.set_text2(label);
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}
