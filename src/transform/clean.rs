//! Duplicate removal and missing-value handling

use super::Diagnostic;
use crate::error::{EtlError, EtlResult};
use crate::table::{Column, DataType, Table, Value};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.5
}

/// What to do with missing cells
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Drop sparse columns, then rows with any missing cell
    #[default]
    Drop,
    /// Fill with the column median (numeric, timestamp) or mode
    Fill,
    /// Leave missing cells alone
    #[serde(alias = "none")]
    Keep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanSpec {
    #[serde(default = "default_true")]
    pub remove_duplicates: bool,
    #[serde(default, alias = "handle_missing")]
    pub missing: MissingPolicy,
    /// Columns whose missing fraction exceeds this are dropped
    #[serde(default = "default_threshold", alias = "missing_threshold")]
    pub threshold: f64,
}

impl Default for CleanSpec {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            missing: MissingPolicy::Drop,
            threshold: default_threshold(),
        }
    }
}

impl CleanSpec {
    pub(super) fn validate(&self) -> EtlResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(EtlError::Configuration(format!(
                "clean threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

pub(super) fn apply(input: &Table, spec: &CleanSpec, diag: &mut Diagnostic) -> EtlResult<Table> {
    let mut table = if spec.remove_duplicates {
        dedup(input, diag)
    } else {
        input.clone()
    };

    let changed = match spec.missing {
        MissingPolicy::Drop => drop_missing(&mut table, spec.threshold, diag),
        MissingPolicy::Fill => fill_missing(&mut table, diag)?,
        MissingPolicy::Keep => false,
    };

    // Filling or dropping can make rows identical
    if spec.remove_duplicates && changed {
        table = dedup(&table, diag);
    }
    Ok(table)
}

/// Keep the first occurrence of every distinct row
fn dedup(table: &Table, diag: &mut Diagnostic) -> Table {
    let mut seen = HashSet::with_capacity(table.row_count());
    let keep: Vec<usize> = (0..table.row_count())
        .filter(|&i| seen.insert(table.row(i)))
        .collect();
    let removed = table.row_count() - keep.len();
    if removed == 0 {
        return table.clone();
    }
    log::debug!("Removed {} duplicate row(s)", removed);
    let total = diag
        .details
        .get("duplicates_removed")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    diag.detail("duplicates_removed", total + removed as u64);
    table.take_rows(&keep)
}

fn drop_missing(table: &mut Table, threshold: f64, diag: &mut Diagnostic) -> bool {
    let sparse: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| c.missing_ratio() > threshold)
        .map(|c| c.name().to_string())
        .collect();
    for name in &sparse {
        table.remove_column(name);
    }
    if !sparse.is_empty() {
        log::debug!("Dropped sparse columns: {}", sparse.join(", "));
        diag.detail("dropped_columns", sparse.clone());
    }

    let keep: Vec<usize> = (0..table.row_count())
        .filter(|&i| {
            table
                .columns()
                .iter()
                .all(|c| c.get(i).is_some_and(|v| !v.is_null()))
        })
        .collect();
    let dropped_rows = table.row_count() - keep.len();
    if dropped_rows > 0 {
        *table = table.take_rows(&keep);
        diag.detail("rows_with_missing_dropped", dropped_rows);
    }
    !sparse.is_empty() || dropped_rows > 0
}

fn fill_missing(table: &mut Table, diag: &mut Diagnostic) -> EtlResult<bool> {
    let mut changed = false;
    let mut unfillable = Vec::new();

    let pending: Vec<Column> = table
        .columns()
        .iter()
        .filter(|c| c.null_count() > 0)
        .cloned()
        .collect();

    for column in pending {
        if column.null_count() == column.len() {
            unfillable.push(column.name().to_string());
            continue;
        }
        let filled = fill_column(column);
        table.set_column(filled)?;
        changed = true;
    }

    if !unfillable.is_empty() {
        diag.warn(format!(
            "cannot fill entirely missing column(s): {}",
            unfillable.join(", ")
        ));
        diag.detail("unfillable_columns", unfillable);
    }
    Ok(changed)
}

fn fill_column(column: Column) -> Column {
    let name = column.name().to_string();
    let dtype = column.dtype();
    match dtype {
        DataType::Integer | DataType::Float => {
            let mut numbers: Vec<f64> = column.values().iter().filter_map(Value::as_f64).collect();
            let m = median(&mut numbers);
            if dtype == DataType::Integer && m.fract() == 0.0 {
                replace_nulls(column, Value::Integer(m as i64))
            } else {
                let values = column
                    .into_values()
                    .into_iter()
                    .map(|v| match v.as_f64() {
                        Some(f) => Value::Float(f),
                        None => Value::Float(m),
                    })
                    .collect();
                Column::new(name, DataType::Float, values)
            }
        }
        DataType::Timestamp => {
            let mut instants: Vec<NaiveDateTime> = column
                .values()
                .iter()
                .filter_map(Value::as_timestamp)
                .collect();
            instants.sort();
            let mid = instants.len() / 2;
            let fill = if instants.len() % 2 == 0 {
                let (a, b) = (instants[mid - 1], instants[mid]);
                a + (b - a) / 2
            } else {
                instants[mid]
            };
            replace_nulls(column, Value::Timestamp(fill))
        }
        DataType::Text | DataType::Categorical | DataType::Boolean => {
            let fill = mode(column.values());
            replace_nulls(column, fill)
        }
    }
}

fn replace_nulls(column: Column, fill: Value) -> Column {
    let name = column.name().to_string();
    let dtype = column.dtype();
    let values = column
        .into_values()
        .into_iter()
        .map(|v| if v.is_null() { fill.clone() } else { v })
        .collect();
    Column::new(name, dtype, values)
}

/// Median of a non-empty sample
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Most frequent non-missing value; ties go to the smallest
fn mode(values: &[Value]) -> Value {
    let mut counts: HashMap<&Value, usize> = HashMap::new();
    for v in values.iter().filter(|v| !v.is_null()) {
        *counts.entry(v).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.total_cmp(a)))
        .map(|(v, _)| v.clone())
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Directive, apply as apply_directive};

    fn users() -> Table {
        Table::from_rows(
            vec!["id".into(), "name".into(), "age".into()],
            vec![
                vec![Value::Integer(1), "Alice".into(), Value::Integer(30)],
                vec![Value::Integer(2), "Bob".into(), Value::Integer(25)],
                vec![Value::Integer(2), "Bob".into(), Value::Integer(25)],
                vec![Value::Integer(3), "Carol".into(), Value::Null],
                vec![Value::Integer(4), "Dan".into(), Value::Integer(41)],
            ],
        )
        .unwrap()
    }

    fn run(table: &Table, spec: CleanSpec) -> (Table, Diagnostic) {
        apply_directive(table, &Directive::Clean(spec)).unwrap()
    }

    #[test]
    fn test_dedup_then_drop_rows_with_missing() {
        let (out, diag) = run(&users(), CleanSpec::default());
        assert_eq!(out.row_count(), 3);
        assert_eq!(diag.rows_before, 5);
        assert_eq!(diag.rows_after, 3);
        let ids: Vec<Value> = out.column("id").unwrap().values().to_vec();
        assert_eq!(
            ids,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(4)]
        );
    }

    #[test]
    fn test_sparse_columns_are_dropped_before_rows() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Integer(1), Value::Null],
                vec![Value::Integer(2), Value::Null],
                vec![Value::Integer(3), Value::Integer(9)],
            ],
        )
        .unwrap();
        let (out, diag) = run(&table, CleanSpec::default());
        assert_eq!(out.column_names(), vec!["a"]);
        assert_eq!(out.row_count(), 3);
        assert_eq!(diag.details["dropped_columns"], serde_json::json!(["b"]));
    }

    #[test]
    fn test_fill_uses_median_and_mode() {
        let table = Table::from_rows(
            vec!["age".into(), "city".into(), "empty".into()],
            vec![
                vec![Value::Integer(20), "Oslo".into(), Value::Null],
                vec![Value::Integer(40), "Oslo".into(), Value::Null],
                vec![Value::Integer(30), Value::Null, Value::Null],
                vec![Value::Null, "Rome".into(), Value::Null],
            ],
        )
        .unwrap();
        let spec = CleanSpec {
            remove_duplicates: false,
            missing: MissingPolicy::Fill,
            ..Default::default()
        };
        let (out, diag) = run(&table, spec);
        assert_eq!(out.column("age").unwrap().values()[3], Value::Integer(30));
        assert_eq!(out.column("city").unwrap().values()[2], Value::from("Oslo"));
        assert_eq!(out.column("empty").unwrap().null_count(), 4);
        assert_eq!(diag.warnings.len(), 1);
    }

    #[test]
    fn test_fractional_median_promotes_integer_column() {
        let table = Table::from_rows(
            vec!["n".into()],
            vec![
                vec![Value::Integer(1)],
                vec![Value::Integer(2)],
                vec![Value::Null],
            ],
        )
        .unwrap();
        let spec = CleanSpec {
            missing: MissingPolicy::Fill,
            ..Default::default()
        };
        let (out, _) = run(&table, spec);
        let column = out.column("n").unwrap();
        assert_eq!(column.dtype(), DataType::Float);
        assert_eq!(column.values()[2], Value::Float(1.5));
    }

    #[test]
    fn test_mode_ties_resolve_to_smallest() {
        let values = vec![Value::from("b"), Value::from("a"), Value::Null];
        assert_eq!(mode(&values), Value::from("a"));
    }

    #[test]
    fn test_clean_is_idempotent() {
        for missing in [MissingPolicy::Drop, MissingPolicy::Fill, MissingPolicy::Keep] {
            let spec = CleanSpec {
                missing,
                ..Default::default()
            };
            let (once, _) = run(&users(), spec.clone());
            let (twice, _) = run(&once, spec);
            assert_eq!(once, twice, "policy {:?}", missing);
        }
    }

    #[test]
    fn test_fill_can_create_duplicates_that_are_removed() {
        let table = Table::from_rows(
            vec!["k".into(), "v".into()],
            vec![
                vec!["x".into(), Value::Integer(5)],
                vec!["x".into(), Value::Null],
            ],
        )
        .unwrap();
        let spec = CleanSpec {
            missing: MissingPolicy::Fill,
            ..Default::default()
        };
        let (out, _) = run(&table, spec);
        assert_eq!(out.row_count(), 1);
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        let spec = CleanSpec {
            threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(spec.validate(), Err(EtlError::Configuration(_))));
    }
}
