//! Row filtering by per-column conditions

use crate::error::{EtlError, EtlResult};
use crate::table::{Column, Table, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Conditions on one column; every present field must hold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<serde_json::Value>,
    /// Allow-list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
    /// Deny-list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_values: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<serde_json::Value>,
}

impl Condition {
    pub(super) fn validate(&self, column: &str) -> EtlResult<()> {
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            let (min, max) = (Value::from_json(min), Value::from_json(max));
            if min.compare_loose(&max) == Some(Ordering::Greater) {
                return Err(EtlError::Configuration(format!(
                    "filter on '{}' has min {} greater than max {}",
                    column, min, max
                )));
            }
        }
        Ok(())
    }

    fn compile(&self) -> Compiled {
        let list = |l: &Option<Vec<serde_json::Value>>| {
            l.as_ref()
                .map(|vs| vs.iter().map(Value::from_json).collect::<Vec<_>>())
        };
        Compiled {
            min: self.min.as_ref().map(Value::from_json),
            max: self.max.as_ref().map(Value::from_json),
            values: list(&self.values),
            not_values: list(&self.not_values),
            equals: self.equals.as_ref().map(Value::from_json),
        }
    }
}

struct Compiled {
    min: Option<Value>,
    max: Option<Value>,
    values: Option<Vec<Value>>,
    not_values: Option<Vec<Value>>,
    equals: Option<Value>,
}

impl Compiled {
    fn accepts(&self, cell: &Value) -> bool {
        if let Some(deny) = &self.not_values {
            if !cell.is_null() && deny.iter().any(|d| cell.loosely_equals(d)) {
                return false;
            }
        }
        let bounded = self.min.is_some() || self.max.is_some();
        let listed = self.values.is_some() || self.equals.is_some();
        if cell.is_null() {
            return !bounded && !listed;
        }
        if let Some(min) = &self.min {
            if !matches!(
                cell.compare_loose(min),
                Some(Ordering::Greater | Ordering::Equal)
            ) {
                return false;
            }
        }
        if let Some(max) = &self.max {
            if !matches!(
                cell.compare_loose(max),
                Some(Ordering::Less | Ordering::Equal)
            ) {
                return false;
            }
        }
        if let Some(allow) = &self.values {
            if !allow.iter().any(|a| cell.loosely_equals(a)) {
                return false;
            }
        }
        if let Some(expected) = &self.equals {
            if !cell.loosely_equals(expected) {
                return false;
            }
        }
        true
    }
}

pub(super) fn apply(input: &Table, conditions: &IndexMap<String, Condition>) -> Table {
    let active: Vec<(&Column, Compiled)> = conditions
        .iter()
        .filter_map(|(name, condition)| match input.column(name) {
            Some(column) => Some((column, condition.compile())),
            None => {
                log::debug!("filter: column '{}' not present, ignoring", name);
                None
            }
        })
        .collect();

    let keep: Vec<usize> = (0..input.row_count())
        .filter(|&row| {
            active
                .iter()
                .all(|(column, check)| column.get(row).is_some_and(|v| check.accepts(v)))
        })
        .collect();
    input.take_rows(&keep)
}
