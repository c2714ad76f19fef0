//! Frame schema: ordered `(column, logical type)` pairs.

use std::fmt;

use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use serde::{Deserialize, Serialize};

/// Column type as understood by the graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalType {
    Int,
    Float,
    Boolean,
    Text,
}

impl LogicalType {
    /// The fixed total mapping from Arrow types.
    ///
    /// Integer family → INT, floating family → FLOAT, boolean → BOOLEAN,
    /// everything else (strings, temporals, decimals, nested) → TEXT.
    pub fn from_arrow(dt: &DataType) -> Self {
        if dt.is_integer() {
            LogicalType::Int
        } else if dt.is_floating() {
            LogicalType::Float
        } else if matches!(dt, DataType::Boolean) {
            LogicalType::Boolean
        } else {
            LogicalType::Text
        }
    }

    /// Arrow type used when materializing a column of this type client-side.
    pub fn to_arrow(self) -> DataType {
        match self {
            LogicalType::Int => DataType::Int64,
            LogicalType::Float => DataType::Float64,
            LogicalType::Boolean => DataType::Boolean,
            LogicalType::Text => DataType::Utf8,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Text => write!(f, "TEXT"),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: LogicalType,
}

/// Ordered column list. Order and names are preserved end to end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: impl IntoIterator<Item = (impl Into<String>, LogicalType)>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, ty)| Column { name: name.into(), ty })
                .collect(),
        }
    }

    pub fn from_arrow(schema: &ArrowSchema) -> Self {
        Self::new(
            schema
                .fields()
                .iter()
                .map(|f| (f.name().clone(), LogicalType::from_arrow(f.data_type()))),
        )
    }

    /// Arrow schema with every column nullable.
    pub fn to_arrow(&self) -> ArrowSchema {
        ArrowSchema::new(
            self.columns
                .iter()
                .map(|c| Field::new(&c.name, c.ty.to_arrow(), true))
                .collect::<Vec<_>>(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn type_of(&self, name: &str) -> Option<LogicalType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.ty)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{}: {}", c.name, c.ty)?;
        }
        write!(f, "]")
    }
}
