//! # graph-session: Namespaced Sessions over a Remote Graph Store
//!
//! Moves tabular data into a remote graph store as vertex and edge frames,
//! runs queries against them and pulls result tables back, all inside a
//! per-user namespace that is purged when the session ends.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphStore` is the contract between the session and the store
//! 2. **Clean DTOs**: `Schema`, `Frame`, `Value` cross all boundaries
//! 3. **Schema comes from the data**: column order and types are resolved, never declared
//! 4. **One wait primitive**: every wait is a bounded `poll_until`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graph_session::{MemoryServer, PropertyMap, Session, SessionConfig, Value};
//! use graph_session::model::{DType, DataFrame};
//!
//! # async fn example() -> graph_session::Result<()> {
//! let server = MemoryServer::new();
//! let config = SessionConfig::default().with_userid("ada.lovelace");
//! let mut session = Session::open(&server, config).await?;
//!
//! let people = DataFrame::new([("id", DType::Int64), ("name", DType::String)])
//!     .with_row([Value::Int(1), Value::from("Ada")])
//!     .with_row([Value::Int(2), Value::from("Grace")]);
//! session.vertex("person", people, "id").await?;
//!
//! session.query("MATCH (p:person) RETURN p.name", &PropertyMap::new(), true).await?;
//! let answer = session.fetch(None).await?;
//! println!("{} rows", answer.num_rows());
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Stores
//!
//! | Store | Description |
//! |-------|-------------|
//! | `MemoryServer` | In-process store for testing/embedding |
//! | your `Connector` | Anything that implements `Connector` + `GraphStore` |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod job;
pub mod store;
pub mod config;
pub mod resolver;
pub mod registry;
pub mod load;
pub mod query;
pub mod session;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    DataSource, EdgeFrame, Frame, FrameKind, LogicalType, PropertyMap, Schema,
    TableData, Value, VertexFrame, params,
};

// ============================================================================
// Re-exports: Store
// ============================================================================

pub use store::{Connector, Endpoint, FrameWriter, GraphStore, MemoryServer, MemoryStore};

// ============================================================================
// Re-exports: Jobs
// ============================================================================

pub use job::{Job, JobId, JobStatus, PollPolicy};

// ============================================================================
// Re-exports: Session
// ============================================================================

pub use config::{ClientTransfer, ConfigProvider, EnvProvider, JsonFileProvider, SessionConfig};
pub use load::{LoadPath, LoadReport};
pub use session::{Session, SessionState, normalize_identity};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema resolution error: {0}")]
    SchemaResolution(String),

    #[error("Unknown column '{column}' in schema {schema}")]
    UnknownColumn { column: String, schema: String },

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(
        "Edge frame '{edge}' key '{key}' is {key_type} but vertex frame '{vertex}' is keyed by {vertex_key_type}"
    )]
    EndpointKeyMismatch {
        edge: String,
        key: String,
        key_type: LogicalType,
        vertex: String,
        vertex_key_type: String,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Job {id} failed: {reason}")]
    JobFailed { id: JobId, reason: String },

    #[error("Timed out waiting for {what} after {polls} polls")]
    Timeout { what: String, polls: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
