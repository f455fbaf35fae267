//! Relational schema inference from table column types

use crate::table::{Column, DataType, Table};
use std::fmt;

/// Lower bound for inferred text column widths
pub const MIN_VARCHAR_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Varchar(usize),
}

impl SqlType {
    /// Store type for a column: text-like columns are sized to their
    /// longest value, never below [`MIN_VARCHAR_LEN`]
    pub fn for_column(column: &Column) -> Self {
        match column.dtype() {
            DataType::Integer => Self::Integer,
            DataType::Float => Self::Float,
            DataType::Boolean => Self::Boolean,
            DataType::Timestamp => Self::Timestamp,
            DataType::Text | DataType::Categorical => {
                Self::Varchar(column.max_text_len().max(MIN_VARCHAR_LEN))
            }
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("INTEGER"),
            Self::Float => f.write_str("FLOAT"),
            Self::Boolean => f.write_str("BOOLEAN"),
            Self::Timestamp => f.write_str("TIMESTAMP"),
            Self::Varchar(n) => write!(f, "VARCHAR({})", n),
        }
    }
}

/// Column name and store type for every column, in table order
pub fn infer_schema(table: &Table) -> Vec<(String, SqlType)> {
    table
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), SqlType::for_column(c)))
        .collect()
}
