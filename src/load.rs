//! Load dispatch: moving rows from a data source into a frame.
//!
//! ```text
//! Table      → rows → insert
//! DataFrame  → rows → insert
//! File       → server-side load ──(refused / failed)──→ read on client → insert
//! ```
//!
//! The server-side attempt only happens when the store advertised an io
//! directory. A refused submission or a job that failed without touching the
//! frame sends the rows down the client path instead. A job that is still
//! running when polling gives up is an error: falling back then would load
//! the rows twice.

use std::fs::File;
use std::path::Path;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::config::ClientTransfer;
use crate::job::{self, PollPolicy};
use crate::model::*;
use crate::store::{server_uri, GraphStore};
use crate::{resolver, Error, Result};

/// Which path ended up moving the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    ServerSide,
    ClientSide,
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub path: LoadPath,
    pub rows: u64,
}

/// Read a whole Parquet file into one record batch.
pub fn read_parquet(path: &Path) -> Result<RecordBatch> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

enum ClientData<'a> {
    Batch(&'a RecordBatch),
    Rows(&'a [Row]),
}

/// Moves data into frames of one namespace.
pub struct LoadDispatcher<'s, S: GraphStore + ?Sized> {
    store: &'s S,
    namespace: &'s str,
    io_directory: Option<&'s Path>,
    transfer: ClientTransfer,
    poll: PollPolicy,
}

impl<'s, S: GraphStore + ?Sized> LoadDispatcher<'s, S> {
    pub fn new(
        store: &'s S,
        namespace: &'s str,
        io_directory: Option<&'s Path>,
        transfer: ClientTransfer,
        poll: PollPolicy,
    ) -> Self {
        Self { store, namespace, io_directory, transfer, poll }
    }

    /// Load `source` into `frame`. First matching variant wins.
    pub async fn load(&self, source: &DataSource, frame: &Frame) -> Result<LoadReport> {
        match source {
            DataSource::Table(batch) => self.client_load(frame, ClientData::Batch(batch)).await,
            DataSource::DataFrame(df) => {
                let rows = conform_rows(frame.schema(), df.rows());
                self.client_load(frame, ClientData::Rows(&rows)).await
            }
            DataSource::File(path) => {
                let path = resolver::absolute(path)?;
                if let Some(rows) = self.try_server_load(&path, frame).await? {
                    return Ok(LoadReport { path: LoadPath::ServerSide, rows });
                }
                let batch = read_parquet(&path)?;
                self.client_load(frame, ClientData::Batch(&batch)).await
            }
        }
    }

    /// `Some(rows)` if the server ingested the file itself, `None` if the
    /// client should load it.
    async fn try_server_load(&self, path: &Path, frame: &Frame) -> Result<Option<u64>> {
        let Some(io_directory) = self.io_directory else {
            tracing::debug!(frame = frame.name(), "store has no io directory; loading client-side");
            return Ok(None);
        };
        let name = frame.name();
        let submit = async {
            let before = self.store.num_rows(name).await?;
            let job = self.store.load(name, &server_uri(path)).await?;
            Ok::<_, Error>((before, job))
        };
        let (before, job) = match submit.await {
            Ok(submitted) => submitted,
            Err(error) => {
                tracing::debug!(
                    frame = name,
                    io_directory = %io_directory.display(),
                    %error,
                    "server-side load refused; falling back to client transfer"
                );
                return Ok(None);
            }
        };

        match job::wait_for_job(self.store, job, self.poll).await {
            Ok(_) => {
                let rows = self.store.num_rows(name).await?.saturating_sub(before);
                tracing::info!(frame = name, rows, path = %path.display(), "server-side load");
                Ok(Some(rows))
            }
            Err(Error::JobFailed { id, reason }) => {
                let after = self.store.num_rows(name).await?;
                if after != before {
                    return Err(Error::Load(format!(
                        "server-side load job {id} of {} failed after writing {} rows: {reason}",
                        path.display(),
                        after.saturating_sub(before)
                    )));
                }
                tracing::debug!(
                    frame = name,
                    job = %id,
                    %reason,
                    "server-side load failed; falling back to client transfer"
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn client_load(&self, frame: &Frame, data: ClientData<'_>) -> Result<LoadReport> {
        let name = frame.name();
        let rows = match (self.transfer, data) {
            (ClientTransfer::Insert, ClientData::Batch(batch)) => {
                self.store.insert(name, batch_to_rows(batch)?).await?
            }
            (ClientTransfer::Insert, ClientData::Rows(rows)) => {
                self.store.insert(name, rows.to_vec()).await?
            }
            (ClientTransfer::BulkWriter, ClientData::Batch(batch)) => {
                self.write_batch(frame, batch).await?
            }
            (ClientTransfer::BulkWriter, ClientData::Rows(rows)) => {
                let batch = rows_to_batch(frame.schema(), rows)?;
                self.write_batch(frame, &batch).await?
            }
        };
        tracing::info!(frame = name, rows, transfer = %self.transfer, "client-side load");
        Ok(LoadReport { path: LoadPath::ClientSide, rows })
    }

    async fn write_batch(&self, frame: &Frame, batch: &RecordBatch) -> Result<u64> {
        let mut writer = self.store.open_writer(self.namespace, frame.name(), frame.schema()).await?;
        writer.write(batch).await?;
        writer.close().await
    }
}
