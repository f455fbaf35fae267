//! In-memory tables
//!
//! A [`Table`] is an ordered list of named, uniformly typed [`Column`]s.
//! Storage is column-major; row operations work through index selection.

mod value;

pub use value::{DataType, TIMESTAMP_FORMAT, Value, parse_timestamp};

use crate::error::{EtlError, EtlResult};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A named column whose cells share one [`DataType`]
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    dtype: DataType,
    values: Vec<Value>,
}

impl Column {
    /// Create a column with an explicit type. Cells are not checked.
    pub fn new(name: impl Into<String>, dtype: DataType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    /// Create a column, inferring its type from the cells and coercing
    /// mixed cells to the common type
    pub fn from_values(name: impl Into<String>, values: Vec<Value>) -> Self {
        let dtype = infer_type(&values);
        let values = values.into_iter().map(|v| coerce(v, dtype)).collect();
        Self::new(name, dtype, values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Fraction of missing cells; an empty column has none missing
    pub fn missing_ratio(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.null_count() as f64 / self.values.len() as f64
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Longest rendered cell, in characters
    pub fn max_text_len(&self) -> usize {
        self.values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| v.to_string().chars().count())
            .max()
            .unwrap_or(0)
    }

    fn take(&self, indices: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            dtype: self.dtype,
            values: indices.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }
}

/// Common type of a set of cells; all-missing columns default to text
fn infer_type(values: &[Value]) -> DataType {
    values
        .iter()
        .filter_map(Value::data_type)
        .reduce(DataType::unify)
        .unwrap_or(DataType::Text)
}

/// Coerce a cell into a column type reached through [`DataType::unify`]
fn coerce(value: Value, dtype: DataType) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match (dtype, value) {
        (DataType::Float, Value::Integer(i)) => Value::Float(i as f64),
        (DataType::Text | DataType::Categorical, v @ Value::Text(_)) => v,
        (DataType::Text | DataType::Categorical, v) => Value::Text(v.to_string()),
        (_, v) => v,
    }
}

/// Ordered collection of equally long columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from columns, checking lengths and name uniqueness
    pub fn from_columns(columns: Vec<Column>) -> EtlResult<Self> {
        let mut table = Self::new();
        for column in columns {
            table.add_column(column)?;
        }
        Ok(table)
    }

    /// Build a table from row-major data, inferring each column's type
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Value>>) -> EtlResult<Self> {
        let width = names.len();
        let mut buckets: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); width];
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(EtlError::Schema(format!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            for (bucket, cell) in buckets.iter_mut().zip(row) {
                bucket.push(cell);
            }
        }
        let columns = names
            .into_iter()
            .zip(buckets)
            .map(|(name, values)| Column::from_values(name, values))
            .collect();
        Self::from_columns(columns)
    }

    /// Build a table from JSON records.
    ///
    /// Objects become rows with nested objects flattened into dotted column
    /// names; a non-object record becomes a single `value` column cell.
    /// Columns appear in first-seen order and absent keys are missing.
    pub fn from_records(records: &[serde_json::Value]) -> Self {
        let mut names: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut flat_rows = Vec::with_capacity(records.len());

        for record in records {
            let mut flat = Vec::new();
            match record {
                serde_json::Value::Object(map) => flatten_object("", map, &mut flat),
                other => flat.push(("value".to_string(), Value::from_json(other))),
            }
            for (key, _) in &flat {
                if !index.contains_key(key) {
                    index.insert(key.clone(), names.len());
                    names.push(key.clone());
                }
            }
            flat_rows.push(flat);
        }

        let mut buckets: Vec<Vec<Value>> = vec![vec![Value::Null; records.len()]; names.len()];
        for (row, flat) in flat_rows.into_iter().enumerate() {
            for (key, value) in flat {
                buckets[index[&key]][row] = value;
            }
        }

        Self {
            columns: names
                .into_iter()
                .zip(buckets)
                .map(|(name, values)| Column::from_values(name, values))
                .collect(),
        }
    }

    /// Concatenate tables row-wise.
    ///
    /// The column set is the first-seen union; tables lacking a column
    /// contribute missing cells, and differing column types are unified.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for table in &tables {
            for column in &table.columns {
                if seen.insert(column.name.clone()) {
                    names.push(column.name.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let dtype = tables
                    .iter()
                    .filter_map(|t| t.column(&name))
                    .filter(|c| c.null_count() < c.len())
                    .map(Column::dtype)
                    .reduce(DataType::unify)
                    .unwrap_or_else(|| {
                        tables
                            .iter()
                            .find_map(|t| t.column(&name))
                            .map(Column::dtype)
                            .unwrap_or(DataType::Text)
                    });
                let mut values = Vec::new();
                for table in &tables {
                    match table.column(&name) {
                        Some(column) => values
                            .extend(column.values.iter().cloned().map(|v| coerce(v, dtype))),
                        None => values.extend(std::iter::repeat_n(Value::Null, table.row_count())),
                    }
                }
                Column::new(name, dtype, values)
            })
            .collect();

        Table { columns }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Append a column. Its length must match the table's row count unless
    /// the table has no columns yet.
    pub fn add_column(&mut self, column: Column) -> EtlResult<()> {
        if self.has_column(&column.name) {
            return Err(EtlError::Schema(format!(
                "duplicate column '{}'",
                column.name
            )));
        }
        if !self.columns.is_empty() && column.len() != self.row_count() {
            return Err(EtlError::Schema(format!(
                "column '{}' has {} rows, table has {}",
                column.name,
                column.len(),
                self.row_count()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Replace a same-named column in place, or append it
    pub fn set_column(&mut self, column: Column) -> EtlResult<()> {
        match self.column_index(&column.name) {
            Some(i) => {
                if column.len() != self.row_count() {
                    return Err(EtlError::Schema(format!(
                        "column '{}' has {} rows, table has {}",
                        column.name,
                        column.len(),
                        self.row_count()
                    )));
                }
                self.columns[i] = column;
                Ok(())
            }
            None => self.add_column(column),
        }
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        self.column_index(name).map(|i| self.columns.remove(i))
    }

    /// Cells of one row, in column order
    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| c.values[index].clone())
            .collect()
    }

    pub fn rows(&self) -> Vec<Vec<Value>> {
        (0..self.row_count()).map(|i| self.row(i)).collect()
    }

    /// New table holding the given rows, in the given order
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
        }
    }

    /// Rows `start..end`, clamped to the table
    pub fn slice(&self, start: usize, end: usize) -> Table {
        let end = end.min(self.row_count());
        let start = start.min(end);
        let indices: Vec<usize> = (start..end).collect();
        self.take_rows(&indices)
    }

    /// Same columns, no rows
    pub fn empty_like(&self) -> Table {
        self.take_rows(&[])
    }
}

fn flatten_object(
    prefix: &str,
    map: &serde_json::Map<String, serde_json::Value>,
    out: &mut Vec<(String, Value)>,
) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            serde_json::Value::Object(inner) if !inner.is_empty() => {
                flatten_object(&name, inner, out)
            }
            other => out.push((name, Value::from_json(other))),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.column_names().join(" | ");
        writeln!(f, "{}", header)?;
        writeln!(f, "{}", "-".repeat(header.chars().count()))?;
        for row in self.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|v| match v {
                    Value::Null => "NULL".to_string(),
                    other => other.to_string(),
                })
                .collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}
