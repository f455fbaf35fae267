//! Relational store primitives
//!
//! [`Store`] is the narrow interface the loader needs from a database:
//! existence checks, DDL from a column-type map, batched inserts and one
//! parameterised execute/query pair. [`SqliteStore`] implements it over
//! `rusqlite`.

use super::schema::SqlType;
use crate::error::EtlResult;
use crate::table::{Column, TIMESTAMP_FORMAT, Table, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use std::path::Path;

/// Quote an identifier for use in SQL text
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Declared column of a stored table
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredColumn {
    pub name: String,
    pub declared_type: String,
}

pub trait Store: Send {
    fn table_exists(&mut self, name: &str) -> EtlResult<bool>;

    fn create_table(&mut self, name: &str, columns: &[(String, SqlType)]) -> EtlResult<()>;

    /// Drop a table if it exists
    fn drop_table(&mut self, name: &str) -> EtlResult<()>;

    /// Insert rows in one transaction; returns the number inserted
    fn insert_rows(&mut self, name: &str, columns: &[&str], rows: &[Vec<Value>]) -> EtlResult<usize>;

    /// Run a statement; returns the number of changed rows
    fn execute(&mut self, sql: &str, params: &[Value]) -> EtlResult<usize>;

    /// Run a query and collect its result set
    fn query(&mut self, sql: &str, params: &[Value]) -> EtlResult<Table>;

    /// Declared columns of a table, in order
    fn table_columns(&mut self, name: &str) -> EtlResult<Vec<StoredColumn>>;
}

/// SQLite-backed [`Store`]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = path.as_ref();
        log::debug!("Opening SQLite database {}", path.display());
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn in_memory() -> EtlResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteStore({})", self.conn.path().unwrap_or(":memory:"))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Float(f) if f.is_nan() => ToSqlOutput::from(rusqlite::types::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Boolean(b) => ToSqlOutput::from(*b),
            Value::Timestamp(ts) => ToSqlOutput::from(ts.format(TIMESTAMP_FORMAT).to_string()),
        })
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(format!("<{} bytes>", b.len())),
    }
}

impl Store for SqliteStore {
    fn table_exists(&mut self, name: &str) -> EtlResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_table(&mut self, name: &str, columns: &[(String, SqlType)]) -> EtlResult<()> {
        let defs: Vec<String> = columns
            .iter()
            .map(|(column, sql_type)| format!("{} {}", quote_ident(column), sql_type))
            .collect();
        let sql = format!("CREATE TABLE {} ({})", quote_ident(name), defs.join(", "));
        log::trace!("{}", sql);
        self.conn.execute(&sql, [])?;
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> EtlResult<()> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])?;
        Ok(())
    }

    fn insert_rows(&mut self, name: &str, columns: &[&str], rows: &[Vec<Value>]) -> EtlResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(name),
            column_list,
            placeholders
        );
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> EtlResult<usize> {
        log::trace!("{}", sql);
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> EtlResult<Table> {
        log::trace!("{}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let width = names.len();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut buckets: Vec<Vec<Value>> = vec![Vec::new(); width];
        while let Some(row) = rows.next()? {
            for (i, bucket) in buckets.iter_mut().enumerate() {
                bucket.push(from_sql(row.get_ref(i)?));
            }
        }
        Table::from_columns(
            names
                .into_iter()
                .zip(buckets)
                .map(|(name, values)| Column::from_values(name, values))
                .collect(),
        )
    }

    fn table_columns(&mut self, name: &str) -> EtlResult<Vec<StoredColumn>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(StoredColumn {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{DataType, parse_timestamp};

    #[test]
    fn test_create_insert_query_roundtrip() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .create_table(
                "people",
                &[
                    ("id".into(), SqlType::Integer),
                    ("name".into(), SqlType::Varchar(255)),
                    ("joined".into(), SqlType::Timestamp),
                ],
            )
            .unwrap();
        assert!(store.table_exists("people").unwrap());

        let joined = parse_timestamp("2024-05-01 12:00:00").unwrap();
        let inserted = store
            .insert_rows(
                "people",
                &["id", "name", "joined"],
                &[
                    vec![Value::Integer(1), "Ann".into(), Value::Timestamp(joined)],
                    vec![Value::Integer(2), Value::Null, Value::Null],
                ],
            )
            .unwrap();
        assert_eq!(inserted, 2);

        let table = store
            .query(
                "SELECT id, name, joined FROM people WHERE id >= ?1 ORDER BY id",
                &[Value::Integer(1)],
            )
            .unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("id").unwrap().dtype(), DataType::Integer);
        assert_eq!(
            table.column("joined").unwrap().values()[0],
            Value::from("2024-05-01 12:00:00")
        );
        assert_eq!(table.column("name").unwrap().values()[1], Value::Null);
    }

    #[test]
    fn test_table_columns_reports_declared_types() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .create_table("t", &[("flag".into(), SqlType::Boolean)])
            .unwrap();
        let columns = store.table_columns("t").unwrap();
        assert_eq!(
            columns,
            vec![StoredColumn {
                name: "flag".into(),
                declared_type: "BOOLEAN".into()
            }]
        );
    }

    #[test]
    fn test_quoted_identifiers_allow_odd_names() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .create_table("odd \"name\"", &[("user.tier".into(), SqlType::Integer)])
            .unwrap();
        assert!(store.table_exists("odd \"name\"").unwrap());
        store.drop_table("odd \"name\"").unwrap();
        assert!(!store.table_exists("odd \"name\"").unwrap());
    }
}
