//! Column type conversion

use super::Diagnostic;
use crate::error::EtlResult;
use crate::table::{Column, DataType, Table, Value, parse_timestamp};
use chrono::DateTime;
use indexmap::IndexMap;

pub(super) fn apply(
    input: &Table,
    columns: &IndexMap<String, DataType>,
    diag: &mut Diagnostic,
) -> EtlResult<Table> {
    let mut output = input.clone();
    for (name, &target) in columns.iter() {
        let Some(column) = input.column(name) else {
            log::debug!("retype: column '{}' not present, skipping", name);
            continue;
        };
        match convert_column(column, target) {
            Ok(converted) => output.set_column(converted)?,
            Err(reason) => diag.warn(format!(
                "failed to convert '{}' to {}: {}",
                name, target, reason
            )),
        }
    }
    Ok(output)
}

fn convert_column(column: &Column, target: DataType) -> Result<Column, String> {
    if column.dtype() == target {
        return Ok(column.clone());
    }
    let values = column
        .values()
        .iter()
        .enumerate()
        .map(|(row, v)| convert_value(v, target).map_err(|e| format!("row {}: {}", row, e)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Column::new(column.name(), target, values))
}

/// Convert one cell; missing stays missing
pub(crate) fn convert_value(value: &Value, target: DataType) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let unsupported = || format!("cannot convert {:?} to {}", value, target);
    match target {
        DataType::Integer => match value {
            Value::Integer(i) => Ok(Value::Integer(*i)),
            Value::Float(f) if f.is_finite() => Ok(Value::Integer(f.trunc() as i64)),
            Value::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("'{}' is not an integer", s)),
            _ => Err(unsupported()),
        },
        DataType::Float => match value {
            Value::Integer(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Boolean(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("'{}' is not a number", s)),
            _ => Err(unsupported()),
        },
        DataType::Text | DataType::Categorical => Ok(match value {
            Value::Text(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }),
        DataType::Boolean => match value {
            Value::Boolean(b) => Ok(Value::Boolean(*b)),
            Value::Integer(i) => Ok(Value::Boolean(*i != 0)),
            Value::Float(f) => Ok(Value::Boolean(*f != 0.0)),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "t" | "1" => Ok(Value::Boolean(true)),
                "false" | "no" | "n" | "f" | "0" => Ok(Value::Boolean(false)),
                _ => Err(format!("'{}' is not a boolean", s)),
            },
            _ => Err(unsupported()),
        },
        DataType::Timestamp => match value {
            Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
            Value::Text(s) => parse_timestamp(s)
                .map(Value::Timestamp)
                .ok_or_else(|| format!("'{}' is not a timestamp", s)),
            Value::Integer(secs) => DateTime::from_timestamp(*secs, 0)
                .map(|dt| Value::Timestamp(dt.naive_utc()))
                .ok_or_else(|| format!("{} is out of range for a timestamp", secs)),
            _ => Err(unsupported()),
        },
    }
}
