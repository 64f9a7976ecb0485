//! Table schemas.

use std::fmt;

use crate::value::Value;

/// Declared type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Blob,
}

impl ColumnType {
    fn admits(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::Integer, Value::Integer(_))
                | (Self::Float, Value::Float(_))
                | (Self::Text, Value::Text(_))
                | (Self::Blob, Value::Blob(_))
        )
    }
}

/// One named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A table's column layout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Validate a row against this schema: column count and per-column type
    /// (NULL is admitted everywhere).
    pub fn check(&self, values: &[Value]) -> Result<(), SchemaMismatch> {
        if values.len() != self.columns.len() {
            return Err(SchemaMismatch::ColumnCount {
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        for (position, (column, value)) in self.columns.iter().zip(values).enumerate() {
            if !column.ty.admits(value) {
                return Err(SchemaMismatch::ColumnType {
                    column: column.name.clone(),
                    position,
                });
            }
        }
        Ok(())
    }
}

/// Row/schema disagreement found by [`Schema::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaMismatch {
    ColumnCount { expected: usize, actual: usize },
    ColumnType { column: String, position: usize },
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnCount { expected, actual } => {
                write!(f, "expected {expected} columns, got {actual}")
            }
            Self::ColumnType { column, position } => {
                write!(f, "value {position} does not fit column '{column}'")
            }
        }
    }
}

impl std::error::Error for SchemaMismatch {}
