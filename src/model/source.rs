//! Data sources a frame can be loaded from.
//!
//! A source is classified once, at the boundary, into one of three
//! variants. Schema resolution and loading both match on the variant
//! exhaustively.

use std::path::PathBuf;

use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;

use super::{Row, Value};

/// Tabular input to `vertex()` / `edge()`.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// In-memory Arrow table.
    Table(RecordBatch),
    /// Row-oriented dataframe with native dtypes.
    DataFrame(DataFrame),
    /// Path to a Parquet file, absolute or relative to the working directory.
    File(PathBuf),
}

impl DataSource {
    pub fn variant_name(&self) -> &'static str {
        match self {
            DataSource::Table(_) => "table",
            DataSource::DataFrame(_) => "dataframe",
            DataSource::File(_) => "file",
        }
    }
}

impl From<RecordBatch> for DataSource {
    fn from(b: RecordBatch) -> Self { DataSource::Table(b) }
}

impl From<DataFrame> for DataSource {
    fn from(df: DataFrame) -> Self { DataSource::DataFrame(df) }
}

impl From<PathBuf> for DataSource {
    fn from(p: PathBuf) -> Self { DataSource::File(p) }
}

impl From<&std::path::Path> for DataSource {
    fn from(p: &std::path::Path) -> Self { DataSource::File(p.to_path_buf()) }
}

impl From<&str> for DataSource {
    fn from(p: &str) -> Self { DataSource::File(PathBuf::from(p)) }
}

// ============================================================================
// DataFrame
// ============================================================================

/// Native column dtype of a [`DataFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    /// Arbitrary values, stored as text.
    Object,
    DateTime,
    Category,
}

impl DType {
    /// Arrow equivalent of this dtype.
    pub fn to_arrow(self) -> DataType {
        match self {
            DType::Int8 => DataType::Int8,
            DType::Int16 => DataType::Int16,
            DType::Int32 => DataType::Int32,
            DType::Int64 => DataType::Int64,
            DType::UInt8 => DataType::UInt8,
            DType::UInt16 => DataType::UInt16,
            DType::UInt32 => DataType::UInt32,
            DType::UInt64 => DataType::UInt64,
            DType::Float32 => DataType::Float32,
            DType::Float64 => DataType::Float64,
            DType::Bool => DataType::Boolean,
            DType::String | DType::Object => DataType::Utf8,
            DType::DateTime => DataType::Timestamp(TimeUnit::Nanosecond, None),
            DType::Category => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
            }
        }
    }
}

/// A small row-oriented dataframe.
///
/// Columns carry a name and native dtype; rows hold values in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    columns: Vec<(String, DType)>,
    rows: Vec<Row>,
}

impl DataFrame {
    pub fn new(columns: impl IntoIterator<Item = (impl Into<String>, DType)>) -> Self {
        Self {
            columns: columns.into_iter().map(|(n, t)| (n.into(), t)).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Panics in debug builds if the width is wrong.
    pub fn push_row(&mut self, row: impl IntoIterator<Item = impl Into<Value>>) -> &mut Self {
        let row: Row = row.into_iter().map(Into::into).collect();
        debug_assert_eq!(row.len(), self.columns.len(), "row width must match column count");
        self.rows.push(row);
        self
    }

    pub fn with_row(mut self, row: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.push_row(row);
        self
    }

    pub fn columns(&self) -> &[(String, DType)] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}
