//! Schema resolution for data sources.
//!
//! In-memory sources report their own column order and native types;
//! files are resolved to an absolute path and their schema is read from
//! Parquet footer metadata only, never from the row groups.

use std::fs::File;
use std::path::{Path, PathBuf};

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::model::{DataFrame, DataSource, LogicalType, Schema};
use crate::{Error, Result};

/// Resolve the ordered schema of `source`.
pub fn resolve(source: &DataSource) -> Result<Schema> {
    let schema = match source {
        DataSource::Table(batch) => Schema::from_arrow(&batch.schema()),
        DataSource::DataFrame(df) => dataframe_schema(df),
        DataSource::File(path) => file_schema(path)?,
    };
    tracing::debug!(source = source.variant_name(), %schema, "resolved schema");
    Ok(schema)
}

/// Map each dataframe dtype through its Arrow equivalent.
pub fn dataframe_schema(df: &DataFrame) -> Schema {
    Schema::new(
        df.columns()
            .iter()
            .map(|(name, dtype)| (name.clone(), LogicalType::from_arrow(&dtype.to_arrow()))),
    )
}

/// Absolute form of `path`, relative paths taken against the working directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Schema of a Parquet file, from its footer.
pub fn file_schema(path: &Path) -> Result<Schema> {
    let path = absolute(path)?;
    if !path.is_file() {
        return Err(Error::SchemaResolution(format!(
            "{} is neither an in-memory table nor an existing file",
            path.display()
        )));
    }
    let file = File::open(&path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
        Error::SchemaResolution(format!("cannot read Parquet metadata of {}: {e}", path.display()))
    })?;
    Ok(Schema::from_arrow(builder.schema()))
}
