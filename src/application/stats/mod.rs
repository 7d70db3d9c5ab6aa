use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{PipelineStage, PipelineState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    Passed,
    Failed,
}

#[derive(Clone, Debug)]
pub struct StageReport {
    pub stage: PipelineStage,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: StageOutcome,
}

#[derive(Debug)]
pub struct RunResult {
    pub stages: Vec<StageReport>,
    pub final_state: PipelineState,
}

impl RunResult {
    pub fn total_elapsed(&self) -> Duration {
        self.stages.iter().map(|s| s.elapsed).sum()
    }

    pub fn report_for(
        &self,
        stage: PipelineStage,
    ) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}
