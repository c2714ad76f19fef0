//! # Graph Store Trait
//!
//! This is THE contract between the session layer and a remote graph store.
//! It is deliberately narrow: namespaces, frames, row movement and jobs.
//! The store's storage engine, planner and scheduler stay on the other side.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryServer` / `MemoryStore` | `memory` | In-process reference store for testing/embedding |

pub mod memory;

use std::collections::HashMap;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::job::{Job, JobId};
use crate::model::*;
use crate::Result;

pub use memory::{JobHandler, MemoryServer, MemoryStore, ServerStats};

/// Remote configuration key naming the server-local writable directory.
pub const IO_DIRECTORY_KEY: &str = "system.io_directory";

/// URI scheme for files the server reads itself.
pub const SERVER_URI_SCHEME: &str = "server://";

/// Server-resolvable reference to a local file.
pub fn server_uri(path: &Path) -> String {
    format!("{SERVER_URI_SCHEME}{}", path.display())
}

// ============================================================================
// Endpoint
// ============================================================================

/// Network location of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Establishes authenticated connections to a store.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type this connector produces.
    type Store: GraphStore;

    /// Whether the store at `endpoint` is ready to accept connections.
    async fn ping(&self, endpoint: &Endpoint) -> Result<bool>;

    /// Connect and authenticate as `userid`.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        userid: &str,
        credentials: Option<&str>,
    ) -> Result<Self::Store>;
}

// ============================================================================
// FrameWriter
// ============================================================================

/// Bulk-transfer writer bound to `(namespace, frame, schema)`.
///
/// Batches are buffered or streamed by the implementation; nothing is
/// guaranteed visible in the frame until `close()` returns.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one chunk. Its columns must match the bound schema by name and order.
    async fn write(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Finish the transfer, returning the number of rows written.
    async fn close(&mut self) -> Result<u64>;
}

// ============================================================================
// GraphStore Trait
// ============================================================================

/// One authenticated connection to a graph store.
///
/// Frame names are resolved against the connection's default namespace.
/// Lookups signal a missing name with `Error::NotFound`; any other error
/// means the lookup itself failed.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    // ========================================================================
    // Namespaces
    // ========================================================================

    /// Drop a namespace. With `force`, every frame in it is dropped too.
    /// Returns true if it existed.
    async fn drop_namespace(&self, namespace: &str, force: bool) -> Result<bool>;

    /// Drop `namespace` with everything in it, but only while this
    /// connection is the last one that made it its default namespace.
    /// Returns true if it was dropped.
    async fn release_namespace(&self, namespace: &str) -> Result<bool>;

    /// Whether a namespace currently exists.
    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    /// Make `namespace` the default for unqualified names, creating it if needed.
    async fn set_default_namespace(&self, namespace: &str) -> Result<()>;

    /// Read remote configuration. Keys the server does not know are absent.
    async fn get_config(&self, keys: &[&str]) -> Result<HashMap<String, String>>;

    // ========================================================================
    // Frames
    // ========================================================================

    /// Create a vertex frame. Fails if the name is taken.
    async fn create_vertex_frame(&self, name: &str, schema: &Schema, key: &str) -> Result<VertexFrame>;

    /// Create an edge frame between two existing vertex frames. Fails if the name is taken.
    async fn create_edge_frame(
        &self,
        name: &str,
        schema: &Schema,
        source: &str,
        source_key: &str,
        target: &str,
        target_key: &str,
    ) -> Result<EdgeFrame>;

    /// Drop a frame if present. Dropping a vertex frame also drops the edge
    /// frames that reference it. Returns the names actually dropped.
    async fn drop_frame(&self, name: &str) -> Result<Vec<String>>;

    async fn get_vertex_frame(&self, name: &str) -> Result<VertexFrame>;

    async fn get_edge_frame(&self, name: &str) -> Result<EdgeFrame>;

    async fn get_table_frame(&self, name: &str) -> Result<TableFrame>;

    /// Every vertex and edge frame in `namespace`, ordered by name.
    async fn list_frames(&self, namespace: &str) -> Result<Vec<Frame>>;

    /// Current row count of any frame.
    async fn num_rows(&self, name: &str) -> Result<u64>;

    // ========================================================================
    // Data movement
    // ========================================================================

    /// Append rows (in schema order) to a frame. Returns rows inserted.
    async fn insert(&self, frame: &str, rows: Vec<Row>) -> Result<u64>;

    /// Ask the server to ingest a file it can resolve itself.
    /// The returned job completes when the rows are in the frame.
    async fn load(&self, frame: &str, uri: &str) -> Result<JobId>;

    /// Open a bulk-transfer writer.
    async fn open_writer(
        &self,
        namespace: &str,
        frame: &str,
        schema: &Schema,
    ) -> Result<Box<dyn FrameWriter>>;

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Run a query and return once the job is terminal.
    async fn run_job(&self, query: &str, params: &PropertyMap) -> Result<Job>;

    /// Submit a query and return immediately.
    async fn schedule_job(&self, query: &str, params: &PropertyMap) -> Result<Job>;

    /// Current state of a job.
    async fn job(&self, id: JobId) -> Result<Job>;

    /// Full contents of a frame.
    async fn fetch(&self, name: &str) -> Result<TableData>;
}
