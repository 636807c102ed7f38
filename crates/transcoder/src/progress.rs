//! Progress rendering.
//!
//! The supervisor owns the [`ProgressState`](crate::scanner::ProgressState);
//! reporters only draw what they are handed and never see a decreasing
//! elapsed value.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

/// Sink for one job's progress.
pub trait ProgressReporter: Send {
    /// Draws `elapsed` out of `total` seconds. Only called with a known,
    /// positive `total`.
    fn render(&mut self, elapsed_secs: f64, total_secs: f64);

    /// Prints text without tearing the bar, e.g. an overwrite prompt.
    fn print_above(&mut self, text: &str) {
        eprint!("{}", text);
    }

    /// Clears the bar at the end of the job.
    fn finish(&mut self) {}
}

/// Percentage in `0.0..=100.0`.
pub fn percent(elapsed_secs: f64, total_secs: f64) -> f64 {
    if total_secs <= 0.0 {
        return 0.0;
    }
    (elapsed_secs / total_secs * 100.0).clamp(0.0, 100.0)
}

/// indicatif-backed bar on stderr, hidden when stderr is not a terminal.
pub struct IndicatifReporter {
    label: String,
    bar: Option<ProgressBar>,
}

impl IndicatifReporter {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bar: None,
        }
    }

    fn bar_for(&mut self, total_secs: f64) -> &ProgressBar {
        let label = &self.label;
        self.bar.get_or_insert_with(|| {
            let pb = ProgressBar::new((total_secs * 1000.0) as u64);
            let style = ProgressStyle::with_template(
                "{msg} {percent:>3}% [{bar:30}] ({elapsed_precise} / {eta_precise})",
            )
            .map(|s| s.progress_chars("##."))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb.set_message(label.clone());
            if !std::io::stderr().is_terminal() {
                pb.set_draw_target(ProgressDrawTarget::hidden());
            }
            pb
        })
    }
}

impl ProgressReporter for IndicatifReporter {
    fn render(&mut self, elapsed_secs: f64, total_secs: f64) {
        let pb = self.bar_for(total_secs);
        let length = (total_secs * 1000.0) as u64;
        pb.set_position(((elapsed_secs * 1000.0) as u64).min(length));
    }

    fn print_above(&mut self, text: &str) {
        match &self.bar {
            Some(pb) => pb.suspend(|| eprint!("{}", text)),
            None => eprint!("{}", text),
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

/// Reporter that draws nothing.
#[derive(Debug, Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn render(&mut self, _elapsed_secs: f64, _total_secs: f64) {}

    fn print_above(&mut self, _text: &str) {}
}

/// Minimum spacing between renders.
///
/// Only drawing is rate limited; the tracked state still takes every
/// update, and the latest skipped value is flushed when the job ends.
#[derive(Debug, Clone)]
pub struct RenderThrottle {
    interval: Duration,
    last_render: Option<Instant>,
    pending: Option<(f64, f64)>,
}

impl RenderThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_render: None,
            pending: None,
        }
    }

    /// Renders through `reporter` unless the previous render was less than
    /// one interval before `now`. Returns whether it rendered.
    pub fn offer(
        &mut self,
        reporter: &mut dyn ProgressReporter,
        elapsed_secs: f64,
        total_secs: f64,
        now: Instant,
    ) -> bool {
        let due = match self.last_render {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            reporter.render(elapsed_secs, total_secs);
            self.last_render = Some(now);
            self.pending = None;
        } else {
            self.pending = Some((elapsed_secs, total_secs));
        }
        due
    }

    /// Draws the last value that was held back, if any.
    pub fn flush(&mut self, reporter: &mut dyn ProgressReporter) {
        if let Some((elapsed, total)) = self.pending.take() {
            reporter.render(elapsed, total);
        }
    }
}
