//! Stage timing logged through tracing.

use std::time::Instant;

use tracing::info;

/// Measures one pipeline stage and logs its duration when finished.
#[derive(Debug)]
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Log the elapsed time and return it in milliseconds.
    pub fn finish(self) -> u64 {
        let elapsed_ms = self.elapsed_ms();
        info!(stage = self.stage, elapsed_ms = elapsed_ms, "Stage complete");
        elapsed_ms
    }
}
