//! Row-shaped tables and conversions to/from Arrow record batches.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray,
};
use arrow::compute::{CastOptions, cast_with_options};
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::{FormatOptions, array_value_to_string};
use serde::{Deserialize, Serialize};

use super::{LogicalType, Schema, Value};
use crate::{Error, Result};

/// One frame row, values in schema order.
pub type Row = Vec<Value>;

/// A schema plus rows: the raw shape of a fetched result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub schema: Schema,
    pub rows: Vec<Row>,
}

impl TableData {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Value at `row` in the column named `column`.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Materialize as an Arrow record batch.
    pub fn to_batch(&self) -> Result<RecordBatch> {
        rows_to_batch(&self.schema, &self.rows)
    }
}

// ============================================================================
// Arrow → rows
// ============================================================================

/// Convert a record batch into rows, mapping each column through
/// [`LogicalType::from_arrow`].
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    let columns = batch
        .columns()
        .iter()
        .map(column_values)
        .collect::<Result<Vec<_>>>()?;

    let mut rows: Vec<Row> = (0..batch.num_rows())
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();
    for column in columns {
        for (row, value) in rows.iter_mut().zip(column) {
            row.push(value);
        }
    }
    Ok(rows)
}

/// Values that do not fit the target type are an error, never a silent NULL.
const STRICT_CAST: CastOptions<'static> = CastOptions {
    safe: false,
    format_options: FormatOptions::new(),
};

fn column_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let len = array.len();
    let values = match LogicalType::from_arrow(array.data_type()) {
        LogicalType::Int => {
            let ints = cast_with_options(array, &DataType::Int64, &STRICT_CAST)?;
            let ints = ints.as_primitive::<Int64Type>();
            (0..len)
                .map(|i| if ints.is_null(i) { Value::Null } else { Value::Int(ints.value(i)) })
                .collect()
        }
        LogicalType::Float => {
            let floats = cast_with_options(array, &DataType::Float64, &STRICT_CAST)?;
            let floats = floats.as_primitive::<Float64Type>();
            (0..len)
                .map(|i| if floats.is_null(i) { Value::Null } else { Value::Float(floats.value(i)) })
                .collect()
        }
        LogicalType::Boolean => {
            let bools = array.as_boolean();
            (0..len)
                .map(|i| if bools.is_null(i) { Value::Null } else { Value::Bool(bools.value(i)) })
                .collect()
        }
        LogicalType::Text => match array.data_type() {
            DataType::Utf8 => {
                let strings = array.as_string::<i32>();
                (0..len)
                    .map(|i| {
                        if strings.is_null(i) {
                            Value::Null
                        } else {
                            Value::String(strings.value(i).to_owned())
                        }
                    })
                    .collect()
            }
            _ => (0..len)
                .map(|i| {
                    if array.is_null(i) {
                        Ok(Value::Null)
                    } else {
                        array_value_to_string(array, i).map(Value::String)
                    }
                })
                .collect::<std::result::Result<Vec<_>, _>>()?,
        },
    };
    Ok(values)
}

// ============================================================================
// rows → Arrow
// ============================================================================

/// Shape native rows to `schema`: non-string values bound for TEXT columns
/// are rendered as text. Everything else passes through for the store to check.
pub fn conform_rows(schema: &Schema, rows: &[Row]) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(idx, value)| match (schema.columns().get(idx).map(|c| c.ty), value) {
                    (Some(LogicalType::Text), Value::Bool(b)) => Value::String(b.to_string()),
                    (Some(LogicalType::Text), Value::Int(i)) => Value::String(i.to_string()),
                    (Some(LogicalType::Text), Value::Float(f)) => Value::String(f.to_string()),
                    _ => value.clone(),
                })
                .collect()
        })
        .collect()
}

/// Build a record batch from rows laid out per `schema`.
pub fn rows_to_batch(schema: &Schema, rows: &[Row]) -> Result<RecordBatch> {
    let arrow_schema = Arc::new(schema.to_arrow());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.len());

    for (idx, column) in schema.columns().iter().enumerate() {
        let cells = rows.iter().map(|r| r.get(idx).unwrap_or(&Value::Null));
        let array: ArrayRef = match column.ty {
            LogicalType::Int => Arc::new(
                cells
                    .map(|v| typed(v, column.ty, Value::as_int))
                    .collect::<Result<Int64Array>>()?,
            ),
            LogicalType::Float => Arc::new(
                cells
                    .map(|v| typed(v, column.ty, Value::as_float))
                    .collect::<Result<Float64Array>>()?,
            ),
            LogicalType::Boolean => Arc::new(
                cells
                    .map(|v| typed(v, column.ty, Value::as_bool))
                    .collect::<Result<BooleanArray>>()?,
            ),
            LogicalType::Text => Arc::new(
                cells
                    .map(|v| typed(v, column.ty, |v| v.as_str().map(str::to_owned)))
                    .collect::<Result<StringArray>>()?,
            ),
        };
        arrays.push(array);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(arrow_schema, arrays, &options)?)
}

fn typed<T>(value: &Value, ty: LogicalType, extract: impl Fn(&Value) -> Option<T>) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    match extract(value) {
        Some(v) if value.fits(ty) => Ok(Some(v)),
        _ => Err(Error::TypeError {
            expected: ty.to_string(),
            got: value.type_name().into(),
        }),
    }
}
