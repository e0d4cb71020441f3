//! Counted progress over a known number of steps: files traced, rows
//! persisted. The library reports through [`ProgressReporter`] and stays
//! silent by default; the CLI draws an `indicatif` bar.

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}";

pub trait ProgressReporter: Send + Sync {
    /// Begin a stage of `steps` units, replacing any previous one.
    fn start(&self, stage: &str, steps: u64);

    /// One more unit done.
    fn step(&self);

    fn finish(&self);
}

#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _stage: &str, _steps: u64) {}
    fn step(&self) {}
    fn finish(&self) {}
}

/// Progress drawn on stderr, or tracked without drawing.
#[derive(Debug)]
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn visible() -> Self {
        Self {
            bar: ProgressBar::new(0),
        }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressReporter for BarReporter {
    fn start(&self, stage: &str, steps: u64) {
        if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            self.bar.set_style(style.progress_chars("=> "));
        }
        self.bar.reset();
        self.bar.set_length(steps);
        self.bar.set_message(stage.to_string());
    }

    fn step(&self) {
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restarting_a_stage_resets_the_count() {
        let reporter = BarReporter::hidden();
        reporter.start("Persisting commit metrics", 3);
        reporter.step();
        reporter.step();
        assert_eq!(reporter.bar.position(), 2);
        assert_eq!(reporter.bar.length(), Some(3));

        reporter.start("Tracing changed lines", 1);
        assert_eq!(reporter.bar.position(), 0);
        assert_eq!(reporter.bar.length(), Some(1));
        reporter.finish();
    }
}
