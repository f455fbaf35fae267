//! CLI helper functions

use crate::{
    client::EndpointProfile,
    config::{PipelineConfig, Settings},
    extract::{FileExtractor, FileProfile},
    load::{TableInfo, quote_ident},
    orchestrator::{RunResult, RunStatus, StepLogEntry, StepStatus, validate_jobs},
    storage::{NdjsonReader, NdjsonWriter},
    table::{Table, Value},
};
use eyre::{Context, Result, eyre};
use owo_colors::OwoColorize;
use std::path::Path;

/// Execute every job of a pipeline file
///
/// Writes the step trail as NDJSON when `trail` is given. The returned
/// result carries the run status; this only fails for problems outside the
/// run itself (unreadable pipeline file, unusable settings).
pub async fn run_pipeline(
    pipeline: impl AsRef<Path>,
    database: Option<&Path>,
    continue_on_failure: bool,
    trail: Option<&Path>,
) -> Result<RunResult> {
    let pipeline = pipeline.as_ref();
    let config = PipelineConfig::read(pipeline)?;
    let settings = Settings::from_env()?;
    log::info!(
        "Running pipeline '{}' from {} ({} job(s))",
        config.name,
        pipeline.display(),
        config.jobs.len()
    );

    let orchestrator = settings.orchestrator(&config, database, continue_on_failure)?;
    let run = orchestrator.run(&config.jobs).await;

    if let Some(path) = trail {
        let count = NdjsonWriter::new(path)
            .write(&run.steps)
            .with_context(|| format!("Failed to write step trail: {}", path.display()))?;
        log::info!("Wrote {} step(s) to {}", count, path.display());
    }
    Ok(run)
}

/// Validate a pipeline file without touching sources or the store
pub fn check_pipeline(pipeline: impl AsRef<Path>) -> Result<PipelineConfig> {
    let pipeline = pipeline.as_ref();
    let config = PipelineConfig::read(pipeline)?;
    let settings = Settings::from_env()?;
    let problems = validate_jobs(&config.jobs, settings.api_base_url.is_some());
    if !problems.is_empty() {
        let messages: Vec<String> = problems.iter().map(|(_, e)| e.to_string()).collect();
        return Err(eyre!(
            "Invalid pipeline {}: {}",
            pipeline.display(),
            messages.join("; ")
        ));
    }
    log::info!(
        "✓ Pipeline '{}' is valid ({} job(s))",
        config.name,
        config.jobs.len()
    );
    Ok(config)
}

pub fn inspect_file(path: impl AsRef<Path>, delimiter: char) -> Result<FileProfile> {
    let path = path.as_ref();
    if !delimiter.is_ascii() {
        return Err(eyre!("Delimiter {:?} is not a single-byte character", delimiter));
    }
    FileExtractor::new(vec![path.to_path_buf()])
        .with_delimiter(delimiter as u8)
        .inspect(path)
        .with_context(|| format!("Failed to inspect {}", path.display()))
}

pub async fn probe_endpoint(endpoint: &str) -> Result<EndpointProfile> {
    let settings = Settings::from_env()?;
    let client = settings
        .api_client()?
        .ok_or_else(|| eyre!("API_BASE_URL environment variable not set"))?;
    client
        .probe(endpoint)
        .await
        .with_context(|| format!("Failed to probe {}", endpoint))
}

pub fn table_info(name: &str, database: Option<&Path>) -> Result<TableInfo> {
    let loader = Settings::from_env()?.loader(database)?;
    loader
        .table_info(name)
        .with_context(|| format!("Failed to read table {}", name))
}

pub fn backup_table(name: &str, suffix: Option<&str>, database: Option<&Path>) -> Result<String> {
    let loader = Settings::from_env()?.loader(database)?;
    let backup = loader
        .backup_table(name, suffix)
        .with_context(|| format!("Failed to back up table {}", name))?;
    log::info!("✓ Backed up {} to {}", name, backup);
    Ok(backup)
}

/// Most recent audit rows, newest first
pub fn history(limit: usize, database: Option<&Path>) -> Result<Table> {
    let settings = Settings::from_env()?;
    let loader = settings.loader(database)?;
    let sql = format!(
        "SELECT job_name, start_time, end_time, status, records_processed, records_loaded FROM {} ORDER BY start_time DESC LIMIT ?1",
        quote_ident(&settings.audit_table)
    );
    loader
        .execute_query(&sql, &[Value::Integer(limit as i64)])
        .with_context(|| format!("Failed to read run history from {}", settings.audit_table))
}

/// First `limit` steps of a trail written by `run --trail`
pub fn read_trail(path: impl AsRef<Path>, limit: usize) -> Result<Vec<StepLogEntry>> {
    let path = path.as_ref();
    NdjsonReader::new(path)
        .read_lines(limit)
        .with_context(|| format!("Failed to read step trail: {}", path.display()))
}

pub fn print_trail(steps: &[StepLogEntry]) {
    for entry in steps {
        let status = match entry.status {
            StepStatus::Error => entry.status.red().to_string(),
            StepStatus::Success => entry.status.green().to_string(),
            _ => entry.status.to_string(),
        };
        println!(
            "{} {} {}/{}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").bright_black(),
            entry.job.cyan(),
            entry.step,
            status
        );
        if let Some(error) = entry.details.get("error").and_then(|e| e.as_str()) {
            println!("    {}", error.red());
        }
    }
}

/// Human-readable run report
pub fn print_run_summary(run: &RunResult) {
    let status = match run.status {
        RunStatus::Success => run.status.green().to_string(),
        RunStatus::PartialSuccess => run.status.yellow().to_string(),
        RunStatus::Failed => run.status.red().to_string(),
    };
    println!(
        "Pipeline {} finished: {} in {:.2}s",
        run.pipeline.bold(),
        status,
        run.duration_secs
    );
    for job in &run.jobs {
        let marker = if job.succeeded() {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        };
        println!(
            "  {} {} → {}: {} extracted, {} loaded ({:.2}s)",
            marker,
            job.name.cyan(),
            job.target,
            job.rows_extracted,
            job.rows_loaded,
            job.duration_secs
        );
        if let Some(error) = &job.error {
            println!("      {}", error.bright_black());
        }
    }
    let summary = run.summary();
    println!(
        "  steps: {} total, {} succeeded, {} failed; audit {}",
        summary.total_steps,
        summary.successful_steps,
        summary.failed_steps,
        if run.audit_persisted {
            "written".to_string()
        } else {
            "not written".yellow().to_string()
        }
    );
}

pub fn print_file_profile(profile: &FileProfile) {
    println!(
        "{} ({} bytes, {} rows)",
        profile.path.display().bold(),
        profile.size_bytes,
        profile.row_count
    );
    for column in &profile.columns {
        println!(
            "  {:<24} {:<12} {} missing",
            column.name.cyan(),
            column.dtype,
            column.null_count
        );
    }
}

pub fn print_table_info(info: &TableInfo) {
    println!("{} ({} rows)", info.name.bold(), info.row_count);
    for column in &info.columns {
        println!("  {:<24} {}", column.name.cyan(), column.declared_type);
    }
    if !info.sample.is_empty() {
        println!("{}", info.sample);
    }
}
