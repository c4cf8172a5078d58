use rl_core::types::RunTotals;

/// Per-run counters, folded into the execution row when the run ends.
#[derive(Debug, Default)]
pub struct RunMetrics {
    totals: RunTotals,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_call(&mut self) {
        self.totals.api_calls += 1;
    }

    pub fn api_error(&mut self) {
        self.totals.api_errors += 1;
    }

    /// Count one outbound call, tallying an error when `result` is one.
    pub fn track<T, E>(&mut self, result: &Result<T, E>) {
        self.api_call();
        if result.is_err() {
            self.api_error();
        }
    }

    pub fn files_analyzed(&mut self, count: u32) {
        self.totals.files_analyzed = count;
    }

    pub fn finding_posted(&mut self) {
        self.totals.findings_posted += 1;
    }

    pub fn duplicates_skipped(&mut self, count: u32) {
        self.totals.duplicates_skipped += count;
    }

    pub fn resolution_marked(&mut self) {
        self.totals.resolutions_marked += 1;
    }

    pub fn totals(&self) -> &RunTotals {
        &self.totals
    }
}
