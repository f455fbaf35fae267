//! Relational loading
//!
//! [`TableLoader`] owns a [`Store`] and writes tables into named targets
//! with a [`LoadStrategy`]. Every operation appends a [`LedgerEntry`] to an
//! in-memory ledger that is never truncated. [`TableTarget`] binds a loader
//! to one target so it can act as the load stage of a pipeline.

mod schema;
mod store;

pub use schema::{MIN_VARCHAR_LEN, SqlType, infer_schema};
pub use store::{SqliteStore, Store, StoredColumn, quote_ident};

use crate::error::{EtlError, EtlResult};
use crate::etl::Loader;
use crate::table::{Table, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// Default number of rows written per insert transaction
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// How rows reach the target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Drop and recreate the target, then insert
    Replace,
    /// Create the target if missing, then insert
    Append,
    /// Insert; rows whose conflict key exists overwrite the update columns
    Upsert {
        conflict_columns: Vec<String>,
        /// `None` updates every non-conflict column
        update_columns: Option<Vec<String>>,
    },
}

impl LoadStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
            Self::Upsert { .. } => "upsert",
        }
    }

    /// Check the strategy on its own, without a table
    pub fn validate(&self) -> EtlResult<()> {
        if let Self::Upsert {
            conflict_columns,
            update_columns,
        } = self
        {
            if conflict_columns.is_empty() {
                return Err(EtlError::Configuration(
                    "upsert requires at least one conflict column".to_string(),
                ));
            }
            if let Some(update) = update_columns {
                if let Some(shared) = update.iter().find(|c| conflict_columns.contains(c)) {
                    return Err(EtlError::Configuration(format!(
                        "column '{}' cannot be both a conflict and an update column",
                        shared
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    #[default]
    Replace,
    Append,
    Upsert,
}

/// Serialisable load settings of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSpec {
    #[serde(default)]
    pub mode: LoadMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflict_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_columns: Option<Vec<String>>,
    /// Overrides the run-wide batch size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl LoadSpec {
    pub fn strategy(&self) -> LoadStrategy {
        match self.mode {
            LoadMode::Replace => LoadStrategy::Replace,
            LoadMode::Append => LoadStrategy::Append,
            LoadMode::Upsert => LoadStrategy::Upsert {
                conflict_columns: self.conflict_columns.clone(),
                update_columns: self.update_columns.clone(),
            },
        }
    }

    pub fn validate(&self) -> EtlResult<()> {
        if self.batch_size == Some(0) {
            return Err(EtlError::Configuration(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.mode != LoadMode::Upsert && !self.conflict_columns.is_empty() {
            log::warn!(
                "conflict_columns are ignored for {:?} loads",
                self.mode
            );
        }
        self.strategy().validate()
    }
}

/// One immutable record of a loader operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub target: String,
    pub rows: usize,
    pub details: String,
}

/// Aggregate view of the ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadSummary {
    pub total_loads: usize,
    pub total_rows: usize,
    pub tables: BTreeSet<String>,
    pub operations: BTreeMap<String, usize>,
}

/// Shape, size and a sample of a stored table
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<StoredColumn>,
    pub row_count: usize,
    pub sample: Table,
}

/// Loads tables into a [`Store`] and keeps the operation ledger
pub struct TableLoader<S: Store> {
    store: Mutex<S>,
    ledger: Mutex<Vec<LedgerEntry>>,
}

impl<S: Store> TableLoader<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Mutex::new(store),
            ledger: Mutex::new(Vec::new()),
        }
    }

    fn store(&self) -> MutexGuard<'_, S> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, operation: &str, target: &str, rows: usize, details: String) {
        log::info!(
            "Load: {} - Table: {} - Rows: {} {}",
            operation,
            target,
            rows,
            details
        );
        self.ledger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LedgerEntry {
                timestamp: Utc::now(),
                operation: operation.to_string(),
                target: target.to_string(),
                rows,
                details,
            });
    }

    /// Snapshot of every ledger entry, oldest first
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.ledger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn load_summary(&self) -> LoadSummary {
        let ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        let mut summary = LoadSummary {
            total_loads: ledger.len(),
            ..Default::default()
        };
        for entry in ledger.iter() {
            summary.total_rows += entry.rows;
            summary.tables.insert(entry.target.clone());
            *summary.operations.entry(entry.operation.clone()).or_default() += 1;
        }
        summary
    }

    /// Write a table into `target`
    ///
    /// Rows are inserted in batches of `batch_size`, one transaction each.
    /// Under [`LoadStrategy::Replace`] only the first batch recreates the
    /// table; later batches append. Every upsert batch is upserted.
    ///
    /// # Errors
    /// `Configuration` for an invalid strategy or batch size, `Schema` for
    /// a table without columns, `Store` for database failures
    pub fn load(
        &self,
        table: &Table,
        target: &str,
        strategy: &LoadStrategy,
        batch_size: usize,
    ) -> EtlResult<usize> {
        if batch_size == 0 {
            return Err(EtlError::Configuration(
                "batch_size must be positive".to_string(),
            ));
        }
        if table.column_count() == 0 {
            return Err(EtlError::Schema(format!(
                "nothing to load into '{}': table has no columns",
                target
            )));
        }
        strategy.validate()?;

        let mut store = self.store();
        let schema = infer_schema(table);
        let columns = table.column_names();

        let created = match strategy {
            LoadStrategy::Replace => {
                store.drop_table(target)?;
                store.create_table(target, &schema)?;
                true
            }
            LoadStrategy::Append | LoadStrategy::Upsert { .. } => {
                if store.table_exists(target)? {
                    false
                } else {
                    store.create_table(target, &schema)?;
                    true
                }
            }
        };
        if created {
            self.record(
                "create_table",
                target,
                0,
                format!("columns={}", schema.len()),
            );
        }

        let rows = table.rows();
        let batches = rows.len().div_ceil(batch_size);
        let written = match strategy {
            LoadStrategy::Replace | LoadStrategy::Append => {
                let mut written = 0;
                for (i, batch) in rows.chunks(batch_size).enumerate() {
                    log::debug!("Writing batch {}/{} into {}", i + 1, batches, target);
                    written += store.insert_rows(target, &columns, batch)?;
                }
                written
            }
            LoadStrategy::Upsert {
                conflict_columns,
                update_columns,
            } => {
                let plan = UpsertPlan::new(table, target, conflict_columns, update_columns.as_deref())?;
                store.execute(&plan.index_sql(), &[])?;
                let mut written = 0;
                for batch in rows.chunks(batch_size) {
                    written += plan.upsert_batch(&mut *store, &schema, batch)?;
                }
                written
            }
        };

        self.record(
            strategy.name(),
            target,
            written,
            format!("batch_size={}, batches={}", batch_size, batches),
        );
        Ok(written)
    }

    /// Columns, row count and up to five rows of a stored table
    ///
    /// # Errors
    /// `NotFound` if the table does not exist
    pub fn table_info(&self, name: &str) -> EtlResult<TableInfo> {
        let mut store = self.store();
        if !store.table_exists(name)? {
            return Err(EtlError::NotFound(format!("table {}", name)));
        }
        let columns = store.table_columns(name)?;
        let count = store.query(&format!("SELECT count(*) FROM {}", quote_ident(name)), &[])?;
        let row_count = match count.columns().first().and_then(|c| c.get(0)) {
            Some(Value::Integer(n)) => usize::try_from(*n).unwrap_or(0),
            _ => 0,
        };
        let sample = store.query(&format!("SELECT * FROM {} LIMIT 5", quote_ident(name)), &[])?;
        Ok(TableInfo {
            name: name.to_string(),
            columns,
            row_count,
            sample,
        })
    }

    /// Copy a table into `<name>_backup_<suffix>`
    ///
    /// The suffix defaults to the current UTC time as `%Y%m%d_%H%M%S`.
    pub fn backup_table(&self, name: &str, suffix: Option<&str>) -> EtlResult<String> {
        let suffix = match suffix {
            Some(s) => s.to_string(),
            None => Utc::now().format("%Y%m%d_%H%M%S").to_string(),
        };
        let backup = format!("{}_backup_{}", name, suffix);
        let mut store = self.store();
        if !store.table_exists(name)? {
            return Err(EtlError::NotFound(format!("table {}", name)));
        }
        store.execute(
            &format!(
                "CREATE TABLE {} AS SELECT * FROM {}",
                quote_ident(&backup),
                quote_ident(name)
            ),
            &[],
        )?;
        drop(store);
        self.record("backup_table", &backup, 0, format!("original_table={}", name));
        Ok(backup)
    }

    /// Run an ad-hoc query and collect the result
    pub fn execute_query(&self, sql: &str, params: &[Value]) -> EtlResult<Table> {
        let result = self.store().query(sql, params)?;
        self.record(
            "execute_query",
            "custom_query",
            result.row_count(),
            format!("query_length={}", sql.len()),
        );
        Ok(result)
    }
}

/// Resolved column sets and SQL for one upsert load
struct UpsertPlan<'t> {
    target: &'t str,
    columns: Vec<&'t str>,
    conflict: &'t [String],
    update: Vec<String>,
}

impl<'t> UpsertPlan<'t> {
    fn new(
        table: &'t Table,
        target: &'t str,
        conflict: &'t [String],
        update: Option<&[String]>,
    ) -> EtlResult<Self> {
        for column in conflict.iter().chain(update.unwrap_or_default()) {
            if !table.has_column(column) {
                return Err(EtlError::Configuration(format!(
                    "upsert column '{}' is not in the table loaded into '{}'",
                    column, target
                )));
            }
        }
        let columns = table.column_names();
        let update = match update {
            Some(update) => update.to_vec(),
            None => columns
                .iter()
                .filter(|c| !conflict.iter().any(|k| k == *c))
                .map(|c| c.to_string())
                .collect(),
        };
        Ok(Self {
            target,
            columns,
            conflict,
            update,
        })
    }

    fn key_list(&self) -> String {
        self.conflict
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn index_sql(&self) -> String {
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&format!("{}_upsert_key", self.target)),
            quote_ident(self.target),
            self.key_list()
        )
    }

    fn upsert_sql(&self, staging: &str) -> String {
        let column_list = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let action = if self.update.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let assignments: Vec<String> = self
                .update
                .iter()
                .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
                .collect();
            format!("DO UPDATE SET {}", assignments.join(", "))
        };
        format!(
            "INSERT INTO {target} ({cols}) SELECT {cols} FROM {staging} WHERE true ON CONFLICT({keys}) {action}",
            target = quote_ident(self.target),
            cols = column_list,
            staging = quote_ident(staging),
            keys = self.key_list(),
            action = action,
        )
    }

    fn upsert_batch<S: Store>(
        &self,
        store: &mut S,
        schema: &[(String, SqlType)],
        batch: &[Vec<Value>],
    ) -> EtlResult<usize> {
        let name = format!(
            "{}_staging_{}",
            self.target,
            Utc::now().timestamp_millis()
        );
        let mut staging = StagingTable::create(store, name, schema)?;
        staging.insert(&self.columns, batch)?;
        let sql = self.upsert_sql(staging.name());
        staging.execute(&sql)?;
        Ok(batch.len())
    }
}

/// Scratch table dropped when the guard goes out of scope
struct StagingTable<'s, S: Store> {
    store: &'s mut S,
    name: String,
}

impl<'s, S: Store> StagingTable<'s, S> {
    fn create(store: &'s mut S, name: String, schema: &[(String, SqlType)]) -> EtlResult<Self> {
        store.drop_table(&name)?;
        store.create_table(&name, schema)?;
        Ok(Self { store, name })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, sql: &str) -> EtlResult<usize> {
        self.store.execute(sql, &[])
    }

    fn insert(&mut self, columns: &[&str], rows: &[Vec<Value>]) -> EtlResult<usize> {
        self.store.insert_rows(&self.name, columns, rows)
    }
}

impl<S: Store> Drop for StagingTable<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.store.drop_table(&self.name) {
            log::warn!("Failed to drop staging table {}: {}", self.name, e);
        }
    }
}

/// A [`TableLoader`] bound to one target and strategy
pub struct TableTarget<'a, S: Store> {
    loader: &'a TableLoader<S>,
    target: String,
    strategy: LoadStrategy,
    batch_size: usize,
}

impl<'a, S: Store> TableTarget<'a, S> {
    pub fn new(
        loader: &'a TableLoader<S>,
        target: impl Into<String>,
        strategy: LoadStrategy,
        batch_size: usize,
    ) -> Self {
        Self {
            loader,
            target: target.into(),
            strategy,
            batch_size,
        }
    }
}

impl<S: Store> Loader for TableTarget<'_, S> {
    fn target(&self) -> &str {
        &self.target
    }

    async fn load(&self, table: &Table) -> EtlResult<usize> {
        self.loader
            .load(table, &self.target, &self.strategy, self.batch_size)
    }
}
