//! Per-job and per-run outcomes

use super::state::{JobState, StepLogEntry, StepStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl RunStatus {
    /// Success iff every attempted job succeeded (including none attempted),
    /// failed iff none did
    pub fn from_counts(succeeded: usize, attempted: usize) -> Self {
        if succeeded == attempted {
            Self::Success
        } else if succeeded == 0 {
            Self::Failed
        } else {
            Self::PartialSuccess
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        })
    }
}

/// Outcome of one attempted job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub name: String,
    pub target: String,
    pub state: JobState,
    pub rows_extracted: usize,
    pub rows_transformed: usize,
    pub rows_loaded: usize,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }
}

/// Step counts and time span of a run's trail
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepSummary {
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub first_step: Option<DateTime<Utc>>,
    pub last_step: Option<DateTime<Utc>>,
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub pipeline: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Attempted jobs in run order; jobs skipped after a halt are absent
    pub jobs: Vec<JobResult>,
    /// Step trail of every attempted job, in wall-clock order
    pub steps: Vec<StepLogEntry>,
    /// Whether the audit row reached the store
    pub audit_persisted: bool,
}

impl RunResult {
    pub fn job(&self, name: &str) -> Option<&JobResult> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Success flag of every attempted job
    pub fn job_success(&self) -> BTreeMap<&str, bool> {
        self.jobs
            .iter()
            .map(|j| (j.name.as_str(), j.succeeded()))
            .collect()
    }

    pub fn records_processed(&self) -> usize {
        self.jobs.iter().map(|j| j.rows_extracted).sum()
    }

    pub fn records_loaded(&self) -> usize {
        self.jobs.iter().map(|j| j.rows_loaded).sum()
    }

    pub fn summary(&self) -> StepSummary {
        StepSummary {
            total_steps: self.steps.len(),
            successful_steps: self
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Success)
                .count(),
            failed_steps: self
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Error)
                .count(),
            first_step: self.steps.first().map(|s| s.timestamp),
            last_step: self.steps.last().map(|s| s.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Details;

    fn step(step: &str, status: StepStatus) -> StepLogEntry {
        StepLogEntry {
            timestamp: Utc::now(),
            job: "users".into(),
            step: step.into(),
            status,
            details: Details::new(),
        }
    }

    #[test]
    fn test_status_from_counts() {
        assert_eq!(RunStatus::from_counts(0, 0), RunStatus::Success);
        assert_eq!(RunStatus::from_counts(2, 2), RunStatus::Success);
        assert_eq!(RunStatus::from_counts(1, 2), RunStatus::PartialSuccess);
        assert_eq!(RunStatus::from_counts(0, 3), RunStatus::Failed);
        assert_eq!(RunStatus::PartialSuccess.to_string(), "partial_success");
    }

    #[test]
    fn test_summary_counts_steps() {
        let now = Utc::now();
        let result = RunResult {
            pipeline: "demo".into(),
            status: RunStatus::Failed,
            started_at: now,
            finished_at: now,
            duration_secs: 0.0,
            jobs: vec![],
            steps: vec![
                step("extract", StepStatus::Started),
                step("extract", StepStatus::Success),
                step("transform", StepStatus::Error),
            ],
            audit_persisted: false,
        };
        let summary = result.summary();
        assert_eq!(summary.total_steps, 3);
        assert_eq!(summary.successful_steps, 1);
        assert_eq!(summary.failed_steps, 1);
        assert_eq!(summary.first_step, Some(result.steps[0].timestamp));
        assert_eq!(summary.last_step, Some(result.steps[2].timestamp));
    }
}
