use std::time::{Duration, Instant};

/// Name and start time of the current run, handed to each driver.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub name: String,
    started: Instant,
}

impl RunContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Counts reported by a driver once every task it launched has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub inserted: usize,
    pub rejected: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl RunSummary {
    pub fn log(&self, ctx: &RunContext) {
        tracing::info!(
            run = %ctx.name,
            attempted = self.attempted,
            inserted = self.inserted,
            rejected = self.rejected,
            failed = self.failed,
            duration_secs = self.duration.as_secs_f64(),
            "Run summary"
        );
    }
}
