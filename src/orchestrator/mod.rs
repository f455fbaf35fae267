//! Run orchestration
//!
//! The [`Orchestrator`] runs a list of [`JobSpec`]s in order, one
//! [`Pipeline`] per job, merges every job's step log into a [`RunResult`]
//! and finally writes one audit row describing the run back through its
//! own loader.

mod job;
mod result;
mod state;

pub use job::{JobSpec, validate_jobs};
pub use result::{JobResult, RunResult, RunStatus, StepSummary};
pub use state::{Details, JobContext, JobState, StepLogEntry, StepStatus};

use crate::client::ApiClient;
use crate::error::{EtlError, EtlResult};
use crate::etl::{Pipeline, PipelineCounts};
use crate::extract::SourceExtractor;
use crate::load::{DEFAULT_BATCH_SIZE, LoadStrategy, Store, TableLoader, TableTarget};
use crate::table::{Column, DataType, Table, Value};
use crate::transform::DirectiveTransformer;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;

/// Default audit target
pub const DEFAULT_AUDIT_TABLE: &str = "etl_job_logs";

/// Run-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Pipeline name recorded in the audit row
    pub name: String,
    /// Halt after the first failed job
    pub stop_on_failure: bool,
    /// Batch size for jobs that do not set their own
    pub batch_size: usize,
    /// Audit target; `None` disables the audit row
    pub audit_table: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            name: "etl_pipeline".to_string(),
            stop_on_failure: true,
            batch_size: DEFAULT_BATCH_SIZE,
            audit_table: Some(DEFAULT_AUDIT_TABLE.to_string()),
        }
    }
}

/// Sequences jobs over one loader and an optional API client
pub struct Orchestrator<S: Store> {
    loader: TableLoader<S>,
    client: Option<ApiClient>,
    options: RunOptions,
}

impl<S: Store> Orchestrator<S> {
    pub fn new(loader: TableLoader<S>, client: Option<ApiClient>, options: RunOptions) -> Self {
        Self {
            loader,
            client,
            options,
        }
    }

    pub fn loader(&self) -> &TableLoader<S> {
        &self.loader
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every job in order and report the outcome
    ///
    /// Never fails: job errors, configuration errors and audit failures are
    /// all reflected in the returned [`RunResult`] and the log.
    pub async fn run(&self, jobs: &[JobSpec]) -> RunResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        log::info!(
            "Starting run '{}' with {} job(s)",
            self.options.name,
            jobs.len()
        );

        let mut results = Vec::new();
        let mut steps = Vec::new();

        let mut problems: HashMap<usize, EtlError> =
            validate_jobs(jobs, self.client.is_some()).into_iter().collect();
        // under stop-on-failure an invalid job halts the run before any I/O
        let halted = self.options.stop_on_failure && !problems.is_empty();
        if halted {
            log::error!(
                "Run '{}' rejected: {} invalid job(s)",
                self.options.name,
                problems.len()
            );
        }

        for (index, job) in jobs.iter().enumerate() {
            if let Some(e) = problems.remove(&index) {
                log::error!("Job '{}' is misconfigured: {}", job.name, e);
                let mut ctx = JobContext::new(&job.name);
                ctx.fail(&e);
                results.push(job_result(job, &ctx, PipelineCounts::default(), 0.0, Some(&e)));
                steps.extend(ctx.into_log());
                continue;
            }
            if halted {
                continue;
            }

            let job_clock = Instant::now();
            let mut ctx = JobContext::new(&job.name);
            let outcome = self.run_job(job, &mut ctx).await;
            let elapsed = job_clock.elapsed().as_secs_f64();
            let result = match &outcome {
                Ok(counts) => job_result(job, &ctx, *counts, elapsed, None),
                Err(e) => {
                    log::error!("Job '{}' failed: {}", job.name, e);
                    job_result(job, &ctx, PipelineCounts::default(), elapsed, Some(e))
                }
            };
            steps.extend(ctx.into_log());
            results.push(result);
            if outcome.is_err() && self.options.stop_on_failure {
                log::warn!("Stopping run '{}' after failed job '{}'", self.options.name, job.name);
                break;
            }
        }

        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        let status = RunStatus::from_counts(succeeded, results.len());
        let mut run = RunResult {
            pipeline: self.options.name.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
            duration_secs: clock.elapsed().as_secs_f64(),
            jobs: results,
            steps,
            audit_persisted: false,
        };
        log::info!(
            "Run '{}' finished with status {} in {:.2}s ({}/{} jobs succeeded)",
            run.pipeline,
            run.status,
            run.duration_secs,
            succeeded,
            run.jobs.len()
        );

        if let Some(audit_table) = &self.options.audit_table {
            match self.persist_audit(&run, audit_table) {
                Ok(()) => run.audit_persisted = true,
                Err(e) => log::error!("Failed to write audit row to {}: {}", audit_table, e),
            }
        }
        run
    }

    async fn run_job(&self, job: &JobSpec, ctx: &mut JobContext) -> EtlResult<PipelineCounts> {
        let extractor = match SourceExtractor::from_spec(&job.source, self.client.as_ref()) {
            Ok(extractor) => extractor,
            Err(e) => {
                ctx.fail(&e);
                return Err(e);
            }
        };
        let batch_size = job.load.batch_size.unwrap_or(self.options.batch_size);
        let pipeline = Pipeline::new(
            extractor,
            DirectiveTransformer::new(&job.transforms),
            TableTarget::new(&self.loader, job.target.clone(), job.load.strategy(), batch_size),
        );
        pipeline.run(ctx).await
    }

    fn persist_audit(&self, run: &RunResult, audit_table: &str) -> EtlResult<()> {
        let metadata = json!({
            "jobs": run.jobs,
            "duration_seconds": run.duration_secs,
            "total_steps": run.steps.len(),
        });
        let row = Table::from_columns(vec![
            Column::new("job_name", DataType::Text, vec![Value::from(run.pipeline.as_str())]),
            Column::new("job_type", DataType::Text, vec![Value::from("full_pipeline")]),
            Column::new(
                "start_time",
                DataType::Timestamp,
                vec![Value::Timestamp(run.started_at.naive_utc())],
            ),
            Column::new(
                "end_time",
                DataType::Timestamp,
                vec![Value::Timestamp(run.finished_at.naive_utc())],
            ),
            Column::new("status", DataType::Text, vec![Value::from(run.status.to_string())]),
            Column::new(
                "records_processed",
                DataType::Integer,
                vec![Value::Integer(run.records_processed() as i64)],
            ),
            Column::new(
                "records_loaded",
                DataType::Integer,
                vec![Value::Integer(run.records_loaded() as i64)],
            ),
            Column::new("metadata", DataType::Text, vec![Value::from(metadata.to_string())]),
        ])?;
        self.loader.load(&row, audit_table, &LoadStrategy::Append, 1)?;
        Ok(())
    }
}

fn job_result(
    job: &JobSpec,
    ctx: &JobContext,
    counts: PipelineCounts,
    duration_secs: f64,
    error: Option<&EtlError>,
) -> JobResult {
    JobResult {
        name: job.name.clone(),
        target: job.target.clone(),
        state: ctx.state(),
        rows_extracted: counts.rows_extracted,
        rows_transformed: counts.rows_transformed,
        rows_loaded: counts.rows_loaded,
        duration_secs,
        error: error.map(|e| e.to_string()),
    }
}
