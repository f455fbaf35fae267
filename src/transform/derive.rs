//! Derived feature columns

use super::Diagnostic;
use super::expr::Expr;
use crate::error::{EtlError, EtlResult};
use crate::table::{Column, DataType, Table, Value, parse_timestamp};
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A feature to add, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feature {
    /// New column computed from an expression over existing columns
    #[serde(alias = "derived")]
    Expression { name: String, expression: String },
    /// `<name>_year`, `<name>_month`, `<name>_day`, `<name>_weekday`
    #[serde(alias = "date_features")]
    DateParts { name: String, column: String },
    /// One boolean indicator column per distinct value
    #[serde(alias = "categorical_encoding")]
    OneHot { name: String, column: String },
}

impl Feature {
    pub fn name(&self) -> &str {
        match self {
            Self::Expression { name, .. } | Self::DateParts { name, .. } | Self::OneHot { name, .. } => {
                name
            }
        }
    }

    pub(super) fn validate(&self) -> EtlResult<()> {
        if self.name().trim().is_empty() {
            return Err(EtlError::Configuration(
                "derived feature names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub(super) fn apply(input: &Table, features: &[Feature], diag: &mut Diagnostic) -> EtlResult<Table> {
    let mut output = input.clone();
    for feature in features {
        let produced = match feature {
            Feature::Expression { name, expression } => Expr::parse(expression)
                .and_then(|expr| expr.evaluate(&output, name))
                .map(|column| vec![column])
                .map_err(|e| e.to_string()),
            Feature::DateParts { name, column } => date_parts(&output, name, column),
            Feature::OneHot { name, column } => one_hot(&output, name, column),
        };
        match produced {
            Ok(columns) => {
                for column in columns {
                    output.set_column(column)?;
                }
            }
            Err(reason) => {
                diag.warn(format!("failed to create feature '{}': {}", feature.name(), reason))
            }
        }
    }
    Ok(output)
}

fn date_parts(table: &Table, name: &str, source: &str) -> Result<Vec<Column>, String> {
    let column = table
        .column(source)
        .ok_or_else(|| format!("unknown column '{}'", source))?;
    let instants: Vec<Option<NaiveDateTime>> = match column.dtype() {
        DataType::Timestamp => column.values().iter().map(Value::as_timestamp).collect(),
        dtype if dtype.is_textual() => column
            .values()
            .iter()
            .map(|v| match v {
                Value::Text(s) => parse_timestamp(s)
                    .map(Some)
                    .ok_or_else(|| format!("'{}' is not a timestamp", s)),
                _ => Ok(None),
            })
            .collect::<Result<_, _>>()?,
        dtype => return Err(format!("column '{}' is {}, not a timestamp", source, dtype)),
    };

    let part = |suffix: &str, f: fn(&NaiveDateTime) -> i64| {
        Column::new(
            format!("{}_{}", name, suffix),
            DataType::Integer,
            instants
                .iter()
                .map(|ts| ts.as_ref().map(f).into())
                .collect(),
        )
    };
    Ok(vec![
        part("year", |ts| i64::from(ts.year())),
        part("month", |ts| i64::from(ts.month())),
        part("day", |ts| i64::from(ts.day())),
        part("weekday", |ts| i64::from(ts.weekday().num_days_from_monday())),
    ])
}

fn one_hot(table: &Table, name: &str, source: &str) -> Result<Vec<Column>, String> {
    let column = table
        .column(source)
        .ok_or_else(|| format!("unknown column '{}'", source))?;
    let mut distinct: Vec<&Value> = column.values().iter().filter(|v| !v.is_null()).collect();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();
    Ok(distinct
        .into_iter()
        .map(|category| {
            Column::new(
                format!("{}_{}", name, category),
                DataType::Boolean,
                column
                    .values()
                    .iter()
                    .map(|v| Value::Boolean(v == category))
                    .collect(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> Table {
        Table::from_rows(
            vec!["tier".into(), "signup".into(), "spend".into()],
            vec![
                vec!["gold".into(), "2024-01-15".into(), Value::Integer(100)],
                vec!["basic".into(), "2024-03-02".into(), Value::Integer(20)],
                vec!["gold".into(), Value::Null, Value::Integer(60)],
            ],
        )
        .unwrap()
    }

    fn run(features: Vec<Feature>) -> (Table, Diagnostic) {
        let input = customers();
        let mut diag = Diagnostic::start("derive", &input);
        let out = apply(&input, &features, &mut diag).unwrap();
        (out, diag)
    }

    #[test]
    fn test_date_parts_from_text_column() {
        let (out, diag) = run(vec![Feature::DateParts {
            name: "signup".into(),
            column: "signup".into(),
        }]);
        assert!(diag.warnings.is_empty());
        assert_eq!(out.column("signup_year").unwrap().values()[0], Value::Integer(2024));
        assert_eq!(out.column("signup_month").unwrap().values()[1], Value::Integer(3));
        assert_eq!(out.column("signup_day").unwrap().values()[0], Value::Integer(15));
        // 2024-01-15 was a Monday
        assert_eq!(out.column("signup_weekday").unwrap().values()[0], Value::Integer(0));
        assert_eq!(out.column("signup_year").unwrap().values()[2], Value::Null);
    }

    #[test]
    fn test_one_hot_sorted_indicator_columns() {
        let (out, _) = run(vec![Feature::OneHot {
            name: "tier".into(),
            column: "tier".into(),
        }]);
        let names = out.column_names();
        assert_eq!(&names[3..], &["tier_basic", "tier_gold"]);
        assert_eq!(
            out.column("tier_gold").unwrap().values(),
            &[Value::Boolean(true), Value::Boolean(false), Value::Boolean(true)]
        );
    }

    #[test]
    fn test_expression_feature_and_failure_is_omitted() {
        let (out, diag) = run(vec![
            Feature::Expression {
                name: "big".into(),
                expression: "spend > 50".into(),
            },
            Feature::Expression {
                name: "broken".into(),
                expression: "spend * missing_col".into(),
            },
        ]);
        assert!(out.has_column("big"));
        assert!(!out.has_column("broken"));
        assert_eq!(diag.warnings.len(), 1);
    }

    #[test]
    fn test_later_features_see_earlier_ones() {
        let (out, _) = run(vec![
            Feature::Expression {
                name: "double".into(),
                expression: "spend * 2".into(),
            },
            Feature::Expression {
                name: "quad".into(),
                expression: "double * 2".into(),
            },
        ]);
        assert_eq!(out.column("quad").unwrap().values()[0], Value::Integer(400));
    }

    #[test]
    fn test_date_parts_on_numeric_column_warns() {
        let (out, diag) = run(vec![Feature::DateParts {
            name: "s".into(),
            column: "spend".into(),
        }]);
        assert!(!out.has_column("s_year"));
        assert_eq!(diag.warnings.len(), 1);
    }
}
