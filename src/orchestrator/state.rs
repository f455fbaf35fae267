//! Job state machine and step log
//!
//! A job moves strictly forward through
//! `pending → extracting → transforming → loading → {succeeded, failed}`.
//! Every transition appends exactly one [`StepLogEntry`] to the job's
//! [`JobContext`]; the log is never edited afterwards.

use crate::error::EtlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form step details
pub type Details = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Extracting,
    Transforming,
    Loading,
    Succeeded,
    Failed,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Extracting => 1,
            Self::Transforming => 2,
            Self::Loading => 3,
            Self::Succeeded | Self::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Step name recorded when a job leaves this state
    fn stage(self) -> &'static str {
        match self {
            Self::Pending => "configure",
            Self::Extracting => "extract",
            Self::Transforming => "transform",
            Self::Loading => "load",
            Self::Succeeded | Self::Failed => "finish",
        }
    }

    /// Step and status logged for a legal transition, `None` otherwise.
    ///
    /// Entering extraction logs `extract/started`; leaving a stage forward
    /// logs that stage as `success`; any failure logs the current stage as
    /// `error`. Succeeding is only possible from `loading`.
    fn transition(self, next: JobState) -> Option<(&'static str, StepStatus)> {
        if self.is_terminal() || next.rank() <= self.rank() {
            return None;
        }
        match (self, next) {
            (_, Self::Failed) => Some((self.stage(), StepStatus::Error)),
            (Self::Pending, Self::Extracting) => Some(("extract", StepStatus::Started)),
            (Self::Extracting, Self::Transforming)
            | (Self::Transforming, Self::Loading)
            | (Self::Loading, Self::Succeeded) => Some((self.stage(), StepStatus::Success)),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Transforming => "transforming",
            Self::Loading => "loading",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Success,
    Error,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Started => "started",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// One immutable audit trail record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub timestamp: DateTime<Utc>,
    pub job: String,
    pub step: String,
    pub status: StepStatus,
    #[serde(default)]
    pub details: Details,
}

/// Execution context of a single job: its state and step log
#[derive(Debug, Clone)]
pub struct JobContext {
    job: String,
    state: JobState,
    log: Vec<StepLogEntry>,
}

impl JobContext {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            state: JobState::Pending,
            log: Vec::new(),
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn log(&self) -> &[StepLogEntry] {
        &self.log
    }

    pub fn into_log(self) -> Vec<StepLogEntry> {
        self.log
    }

    /// Move to `next`, appending one log entry.
    ///
    /// `details` should be a JSON object; other values are stored under a
    /// `value` key. Returns `false` and changes nothing when the move would
    /// go backwards or leave a terminal state.
    pub fn advance(&mut self, next: JobState, details: serde_json::Value) -> bool {
        let Some((step, status)) = self.state.transition(next) else {
            log::error!(
                "[{}] illegal state transition {} -> {}",
                self.job,
                self.state,
                next
            );
            return false;
        };
        let details = match details {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            serde_json::Value::Null => Details::new(),
            other => Details::from([("value".to_string(), other)]),
        };
        match status {
            StepStatus::Error => log::error!("[{}] {} {}", self.job, step, status),
            _ => log::info!("[{}] {} {}", self.job, step, status),
        }
        self.log.push(StepLogEntry {
            timestamp: Utc::now(),
            job: self.job.clone(),
            step: step.to_string(),
            status,
            details,
        });
        self.state = next;
        true
    }

    /// Move to `failed`, recording the error kind and message
    pub fn fail(&mut self, error: &EtlError) -> bool {
        self.advance(
            JobState::Failed,
            serde_json::json!({
                "error": error.to_string(),
                "error_kind": error.kind(),
            }),
        )
    }
}
