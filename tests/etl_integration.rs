//! Integration tests for the file → transform → SQLite path
//!
//! These tests drive real CSV files through the pipeline and the
//! orchestrator into a SQLite database on disk.

use etl_orchestrator::config::PipelineConfig;
use etl_orchestrator::etl::{Pipeline, Transformer};
use etl_orchestrator::extract::{EXTRACTION_TIMESTAMP_COLUMN, FileExtractor, SOURCE_FILE_COLUMN};
use etl_orchestrator::load::{LoadStrategy, SqliteStore, TableLoader, TableTarget};
use etl_orchestrator::orchestrator::{
    JobContext, JobState, Orchestrator, RunOptions, RunStatus, StepLogEntry, StepStatus,
};
use etl_orchestrator::storage::{NdjsonReader, NdjsonWriter};
use etl_orchestrator::table::{DataType, Value};
use etl_orchestrator::transform::{Directive, DirectiveTransformer};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const USERS_CSV: &str = "\
id,name,age,email
1,Ann,30,ann@example.com
2,Bob,25,bob@example.com
2,Bob,25,bob@example.com
3,Cid,,cid@example.com
4,Dee,41,dee@example.com
";

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn directives(yaml: &str) -> Vec<Directive> {
    serde_yaml::from_str(yaml).unwrap()
}

fn open_loader(path: &Path) -> TableLoader<SqliteStore> {
    TableLoader::new(SqliteStore::open(path).unwrap())
}

#[tokio::test]
async fn test_users_clean_dedup_and_drop() {
    let dir = TempDir::new().unwrap();
    let users = write(&dir, "users.csv", USERS_CSV);
    let loader = open_loader(&dir.path().join("etl.db"));

    let steps = directives("- op: clean\n  remove_duplicates: true\n  missing: drop\n");
    let pipeline = Pipeline::new(
        FileExtractor::new(vec![users]),
        DirectiveTransformer::new(&steps),
        TableTarget::new(&loader, "users", LoadStrategy::Replace, 1000),
    );

    let mut ctx = JobContext::new("users");
    let counts = pipeline.run(&mut ctx).await.unwrap();
    assert_eq!(counts.rows_extracted, 5);
    assert_eq!(counts.rows_transformed, 3);
    assert_eq!(counts.rows_loaded, 3);
    assert_eq!(ctx.state(), JobState::Succeeded);

    let stored = loader
        .execute_query("SELECT id, name, source_file FROM users ORDER BY id", &[])
        .unwrap();
    assert_eq!(
        stored.column("id").unwrap().values(),
        &[Value::Integer(1), Value::Integer(2), Value::Integer(4)]
    );
    assert_eq!(
        stored.column(SOURCE_FILE_COLUMN).unwrap().values()[0],
        Value::from("users.csv")
    );

    let info = loader.table_info("users").unwrap();
    let declared: Vec<(&str, &str)> = info
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.declared_type.as_str()))
        .collect();
    assert!(declared.contains(&("age", "INTEGER")));
    assert!(declared.contains(&(EXTRACTION_TIMESTAMP_COLUMN, "TIMESTAMP")));
}

#[tokio::test]
async fn test_multiple_files_skip_missing_locator() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "a.csv", "id,amount\n1,10\n2,20\n");
    let b = write(&dir, "b.csv", "id,amount\n3,30\n");
    let missing = dir.path().join("missing.csv");

    let table = etl_orchestrator::etl::Extractor::extract(&FileExtractor::new(vec![
        a,
        missing,
        b,
    ]))
    .await
    .unwrap();
    assert_eq!(table.row_count(), 3);
    let sources: Vec<String> = table
        .column(SOURCE_FILE_COLUMN)
        .unwrap()
        .values()
        .iter()
        .map(|v| v.to_string())
        .collect();
    assert_eq!(sources, vec!["a.csv", "a.csv", "b.csv"]);
}

#[test]
fn test_filter_then_aggregate() {
    let table = etl_orchestrator::table::Table::from_rows(
        vec!["category".into(), "amount".into()],
        vec![
            vec!["A".into(), Value::Integer(10)],
            vec!["A".into(), Value::Integer(20)],
            vec!["B".into(), Value::Integer(5)],
            vec!["B".into(), Value::Integer(-5)],
        ],
    )
    .unwrap();
    let steps = directives(
        r#"
- op: filter
  conditions:
    amount: { min: 0 }
- op: aggregate
  group_by: [category]
  aggregations:
    amount: [sum]
"#,
    );
    let out = DirectiveTransformer::new(&steps).transform(table).unwrap();
    assert_eq!(out.diagnostics.len(), 2);
    assert_eq!(out.table.column_names(), vec!["category", "amount_sum"]);
    assert_eq!(out.table.column("amount_sum").unwrap().dtype(), DataType::Integer);
    assert_eq!(
        out.table.rows(),
        vec![
            vec![Value::from("A"), Value::Integer(30)],
            vec![Value::from("B"), Value::Integer(5)],
        ]
    );
}

#[tokio::test]
async fn test_orchestrated_run_writes_audit_row_and_trail() {
    let dir = TempDir::new().unwrap();
    write(&dir, "users.csv", USERS_CSV);
    write(&dir, "orders.csv", "order_id,user_id,amount\n10,1,9.5\n11,2,20\n");
    let pipeline_file = write(
        &dir,
        "pipeline.yml",
        &format!(
            r#"
name: nightly
jobs:
  - name: users
    source:
      kind: file
      paths: [{users}]
    target: users
    transforms:
      - op: clean
        missing: fill
      - op: rename
        convention: upper
  - name: orders
    source:
      kind: csv
      paths: [{orders}]
    target: orders
    load:
      mode: upsert
      conflict_columns: [order_id]
"#,
            users = dir.path().join("users.csv").display(),
            orders = dir.path().join("orders.csv").display(),
        ),
    );
    let config = PipelineConfig::read(&pipeline_file).unwrap();
    let orchestrator = Orchestrator::new(
        open_loader(&dir.path().join("etl.db")),
        None,
        RunOptions {
            name: config.name.clone(),
            ..Default::default()
        },
    );

    let run = orchestrator.run(&config.jobs).await;
    assert_eq!(run.status, RunStatus::Success);
    assert!(run.audit_persisted);
    assert_eq!(run.records_processed(), 7);
    assert_eq!(run.job("users").unwrap().rows_loaded, 4);

    // four steps per successful job
    assert_eq!(run.steps.len(), 8);
    assert!(run.steps.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(run.summary().failed_steps, 0);

    let audit = orchestrator
        .loader()
        .execute_query(
            "SELECT job_name, job_type, status, records_loaded FROM etl_job_logs",
            &[],
        )
        .unwrap();
    assert_eq!(
        audit.rows(),
        vec![vec![
            Value::from("nightly"),
            Value::from("full_pipeline"),
            Value::from("success"),
            Value::Integer(6),
        ]]
    );

    let trail = dir.path().join("trail.ndjson");
    NdjsonWriter::new(&trail).write(&run.steps).unwrap();
    let replayed: Vec<StepLogEntry> = NdjsonReader::new(&trail).read().unwrap();
    assert_eq!(replayed, run.steps);
    assert_eq!(replayed[0].status, StepStatus::Started);
}
