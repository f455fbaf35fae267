//! Group-by aggregation

use crate::error::{EtlError, EtlResult};
use crate::table::{Column, DataType, Table, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Sum,
    #[serde(alias = "avg", alias = "average")]
    Mean,
    Count,
    Min,
    Max,
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
        };
        f.write_str(name)
    }
}

pub(super) fn apply(
    input: &Table,
    group_by: &[String],
    aggregations: &IndexMap<String, Vec<Reduction>>,
) -> EtlResult<Table> {
    let keys: Vec<&Column> = group_by
        .iter()
        .map(|name| lookup(input, name, "group_by"))
        .collect::<EtlResult<_>>()?;

    let mut groups: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
    for row in 0..input.row_count() {
        let key: Vec<Value> = keys.iter().map(|c| c.values()[row].clone()).collect();
        if key.iter().any(Value::is_null) {
            continue;
        }
        groups.entry(key).or_default().push(row);
    }
    let mut groups: Vec<(Vec<Value>, Vec<usize>)> = groups.into_iter().collect();
    groups.sort_by(|(a, _), (b, _)| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut output = Table::new();
    for (i, key_column) in keys.iter().enumerate() {
        let values = groups.iter().map(|(key, _)| key[i].clone()).collect();
        output.add_column(Column::new(key_column.name(), key_column.dtype(), values))?;
    }

    for (name, reductions) in aggregations.iter() {
        let source = lookup(input, name, "aggregation")?;
        for &reduction in reductions {
            let cells = groups
                .iter()
                .map(|(_, rows)| {
                    let values: Vec<&Value> = rows
                        .iter()
                        .map(|&r| &source.values()[r])
                        .filter(|v| !v.is_null())
                        .collect();
                    reduce(reduction, source.dtype(), &values)
                })
                .collect::<EtlResult<Vec<_>>>()?;
            let dtype = match reduction {
                Reduction::Count => DataType::Integer,
                Reduction::Mean => DataType::Float,
                Reduction::Sum if source.dtype() == DataType::Float => DataType::Float,
                Reduction::Sum => DataType::Integer,
                Reduction::Min | Reduction::Max => source.dtype(),
            };
            output.add_column(Column::new(
                format!("{}_{}", name, reduction),
                dtype,
                cells,
            ))?;
        }
    }
    Ok(output)
}

fn lookup<'a>(table: &'a Table, name: &str, role: &str) -> EtlResult<&'a Column> {
    table
        .column(name)
        .ok_or_else(|| EtlError::Transform(format!("{} column '{}' not found", role, name)))
}

fn reduce(reduction: Reduction, dtype: DataType, values: &[&Value]) -> EtlResult<Value> {
    let numeric = |what: &str| -> EtlResult<Vec<f64>> {
        values
            .iter()
            .map(|v| match v {
                Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
                other => other.as_f64().ok_or_else(|| {
                    EtlError::Transform(format!("cannot {} {} values", what, dtype))
                }),
            })
            .collect()
    };
    Ok(match reduction {
        Reduction::Count => Value::Integer(values.len() as i64),
        Reduction::Sum if dtype == DataType::Float => Value::Float(numeric("sum")?.iter().sum()),
        Reduction::Sum => {
            let mut total: i64 = 0;
            for v in values {
                let n = match v {
                    Value::Integer(i) => *i,
                    Value::Boolean(b) => i64::from(*b),
                    _ => {
                        return Err(EtlError::Transform(format!(
                            "cannot sum {} values",
                            dtype
                        )));
                    }
                };
                total = total
                    .checked_add(n)
                    .ok_or_else(|| EtlError::Transform("integer overflow in sum".to_string()))?;
            }
            Value::Integer(total)
        }
        Reduction::Mean => {
            let numbers = numeric("average")?;
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Reduction::Min => values
            .iter()
            .min_by(|a, b| a.total_cmp(b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
        Reduction::Max => values
            .iter()
            .max_by(|a, b| a.total_cmp(b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Table {
        Table::from_rows(
            vec!["category".into(), "amount".into(), "price".into()],
            vec![
                vec!["B".into(), Value::Integer(5), Value::Float(1.0)],
                vec!["A".into(), Value::Integer(10), Value::Float(2.0)],
                vec!["A".into(), Value::Integer(20), Value::Null],
                vec![Value::Null, Value::Integer(99), Value::Float(9.0)],
            ],
        )
        .unwrap()
    }

    fn aggs(entries: Vec<(&str, Vec<Reduction>)>) -> IndexMap<String, Vec<Reduction>> {
        entries
            .into_iter()
            .map(|(name, reductions)| (name.to_string(), reductions))
            .collect()
    }

    #[test]
    fn test_sum_by_category() {
        let out = apply(
            &sales(),
            &["category".to_string()],
            &aggs(vec![("amount", vec![Reduction::Sum])]),
        )
        .unwrap();
        assert_eq!(out.column_names(), vec!["category", "amount_sum"]);
        assert_eq!(
            out.rows(),
            vec![
                vec![Value::from("A"), Value::Integer(30)],
                vec![Value::from("B"), Value::Integer(5)],
            ]
        );
        assert_eq!(out.column("amount_sum").unwrap().dtype(), DataType::Integer);
    }

    #[test]
    fn test_mean_count_min_max_skip_missing() {
        let out = apply(
            &sales(),
            &["category".to_string()],
            &aggs(vec![(
                "price",
                vec![
                    Reduction::Mean,
                    Reduction::Count,
                    Reduction::Min,
                    Reduction::Max,
                ],
            )]),
        )
        .unwrap();
        assert_eq!(
            out.row(0),
            vec![
                Value::from("A"),
                Value::Float(2.0),
                Value::Integer(1),
                Value::Float(2.0),
                Value::Float(2.0),
            ]
        );
        assert_eq!(out.column("price_mean").unwrap().dtype(), DataType::Float);
    }

    #[test]
    fn test_unknown_columns_fail() {
        let missing_group = apply(
            &sales(),
            &["region".to_string()],
            &aggs(vec![("amount", vec![Reduction::Sum])]),
        );
        assert!(matches!(missing_group, Err(EtlError::Transform(_))));

        let missing_agg = apply(
            &sales(),
            &["category".to_string()],
            &aggs(vec![("ghost", vec![Reduction::Sum])]),
        );
        assert!(matches!(missing_agg, Err(EtlError::Transform(_))));
    }

    #[test]
    fn test_sum_of_text_fails() {
        let result = apply(
            &sales(),
            &["amount".to_string()],
            &aggs(vec![("category", vec![Reduction::Sum])]),
        );
        assert!(result.is_err());
    }
}
