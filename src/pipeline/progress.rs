//! Progress observers notified by the driver after every batch.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

/// Receives the sample count of each processed batch, then one completion call.
pub trait ProgressReporter {
    fn on_batch(&mut self, n_samples: usize);
    fn on_complete(&mut self);
}

/// Which reporter the driver builds once the sample count is known.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Bar,
    Log,
    Silent,
}

impl ProgressMode {
    /// A bar on interactive terminals, log lines otherwise.
    pub fn auto() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Bar
        } else {
            ProgressMode::Log
        }
    }

    pub fn reporter(self, total: usize) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Bar => Box::new(BarReporter::new(total)),
            ProgressMode::Log => Box::new(LogReporter::new(total)),
            ProgressMode::Silent => Box::new(SilentReporter),
        }
    }
}

pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for BarReporter {
    fn on_batch(&mut self, n_samples: usize) {
        self.bar.inc(n_samples as u64);
    }

    fn on_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Logs at every tenth of the expected total.
pub struct LogReporter {
    total: usize,
    seen: usize,
    next_step: usize,
}

impl LogReporter {
    const STEPS: usize = 10;

    pub fn new(total: usize) -> Self {
        Self {
            total,
            seen: 0,
            next_step: 1,
        }
    }

    fn percent(&self) -> usize {
        if self.total == 0 {
            100
        } else {
            self.seen * 100 / self.total
        }
    }
}

impl ProgressReporter for LogReporter {
    fn on_batch(&mut self, n_samples: usize) {
        self.seen += n_samples;
        let mut crossed = false;
        while self.next_step <= Self::STEPS && self.percent() >= self.next_step * 100 / Self::STEPS {
            self.next_step += 1;
            crossed = true;
        }
        if crossed {
            log::info!("{}/{} ({}%)", self.seen, self.total, self.percent());
        }
    }

    fn on_complete(&mut self) {
        log::debug!("processed {} samples", self.seen);
    }
}

pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn on_batch(&mut self, _: usize) {}

    fn on_complete(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_reporter_tracks_steps() {
        let mut r = LogReporter::new(100);
        r.on_batch(5);
        assert_eq!(r.next_step, 1);
        r.on_batch(30);
        assert_eq!(r.percent(), 35);
        assert_eq!(r.next_step, 4);
        r.on_batch(65);
        assert_eq!(r.next_step, LogReporter::STEPS + 1);
        r.on_complete();
    }

    #[test]
    fn reporters_accept_empty_runs() {
        for mode in [ProgressMode::Log, ProgressMode::Silent] {
            let mut r = mode.reporter(0);
            r.on_batch(0);
            r.on_complete();
        }
    }
}
