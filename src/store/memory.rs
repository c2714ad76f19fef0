//! In-memory graph store.
//!
//! This is the reference implementation of `Connector` + `GraphStore`.
//! `MemoryServer` holds the shared state (namespaces, frames, jobs) behind
//! `RwLock`s; every `connect()` hands out a `MemoryStore` connection with
//! its own default namespace, so independent sessions see independent
//! namespaces on one server.
//!
//! ## Behavior worth knowing
//!
//! - **Jobs are staged**: a scheduled job is `Queued`, becomes `Running` on
//!   the first status poll and terminal on the second. `run_job()` drives a
//!   job to completion before returning.
//! - **Query execution is pluggable**: the job handler turns query text into
//!   a result table, which is materialized at the query's `INTO` frame. The
//!   default handler echoes the query text into one TEXT column `query`.
//! - **Server-side loads** only see files beneath the configured io
//!   directory; everything else fails like a real sandboxed server would.
//!
//! Use this store for:
//! - Testing the session layer end to end
//! - Embedding where no remote store is available

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::job::{Job, JobId, JobStatus};
use crate::model::*;
use crate::{Error, Result};
use super::{Connector, Endpoint, FrameWriter, GraphStore, IO_DIRECTORY_KEY, SERVER_URI_SCHEME};

/// Turns query text and parameters into a result table.
pub type JobHandler = Arc<dyn Fn(&str, &PropertyMap) -> Result<TableData> + Send + Sync>;

// ============================================================================
// MemoryServer
// ============================================================================

/// Shared in-process server state.
#[derive(Clone)]
pub struct MemoryServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    namespaces: RwLock<HashMap<String, Namespace>>,
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    io_directory: RwLock<Option<PathBuf>>,
    credentials: RwLock<Option<String>>,
    handler: RwLock<JobHandler>,
    ready: AtomicBool,
    next_job_id: AtomicU64,
    next_connection_id: AtomicU64,
    server_loads: AtomicU64,
    inserts: AtomicU64,
    writer_transfers: AtomicU64,
    jobs_run: AtomicU64,
}

/// Counters for observing which paths were taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Completed server-side file loads.
    pub server_loads: u64,
    /// Row insert calls.
    pub inserts: u64,
    /// Closed bulk-transfer writers.
    pub writer_transfers: u64,
    /// Query jobs that reached a terminal state.
    pub jobs_run: u64,
}

#[derive(Default)]
struct Namespace {
    frames: HashMap<String, StoredFrame>,
    /// Connection that most recently made this its default namespace.
    owner: Option<u64>,
}

struct StoredFrame {
    shape: Shape,
    schema: Schema,
    rows: Vec<Row>,
}

enum Shape {
    Vertex { key: String },
    Edge { source: String, source_key: String, target: String, target_key: String },
    Table,
}

struct JobRecord {
    job: Job,
    namespace: String,
    work: Work,
}

enum Work {
    Query { params: PropertyMap },
    Load { frame: String, rows: Vec<Row> },
    Done,
}

impl StoredFrame {
    fn kind(&self) -> FrameKind {
        match self.shape {
            Shape::Vertex { .. } => FrameKind::Vertex,
            Shape::Edge { .. } => FrameKind::Edge,
            Shape::Table => FrameKind::Table,
        }
    }

    fn vertex(&self, name: &str) -> Option<VertexFrame> {
        match &self.shape {
            Shape::Vertex { key } => Some(VertexFrame {
                name: name.to_string(),
                schema: self.schema.clone(),
                key: key.clone(),
                num_rows: self.rows.len() as u64,
            }),
            _ => None,
        }
    }

    fn edge(&self, name: &str) -> Option<EdgeFrame> {
        match &self.shape {
            Shape::Edge { source, source_key, target, target_key } => Some(EdgeFrame {
                name: name.to_string(),
                schema: self.schema.clone(),
                source: source.clone(),
                source_key: source_key.clone(),
                target: target.clone(),
                target_key: target_key.clone(),
                num_rows: self.rows.len() as u64,
            }),
            _ => None,
        }
    }

    fn references(&self, vertex: &str) -> bool {
        matches!(&self.shape, Shape::Edge { source, target, .. } if source == vertex || target == vertex)
    }

    fn append(&mut self, name: &str, rows: Vec<Row>) -> Result<u64> {
        check_rows(name, &self.schema, &rows)?;
        let n = rows.len() as u64;
        self.rows.extend(rows);
        Ok(n)
    }
}

fn check_rows(frame: &str, schema: &Schema, rows: &[Row]) -> Result<()> {
    for (i, row) in rows.iter().enumerate() {
        if row.len() != schema.len() {
            return Err(Error::Store(format!(
                "row {i} has {} values, frame '{frame}' has {} columns",
                row.len(),
                schema.len()
            )));
        }
        for (value, column) in row.iter().zip(schema.columns()) {
            if !value.fits(column.ty) {
                return Err(Error::TypeError {
                    expected: format!("{} for column '{}'", column.ty, column.name),
                    got: value.type_name().into(),
                });
            }
        }
    }
    Ok(())
}

fn echo_handler() -> JobHandler {
    Arc::new(|query: &str, _params: &PropertyMap| {
        Ok(TableData::new(
            Schema::new([("query", LogicalType::Text)]),
            vec![vec![Value::from(query)]],
        ))
    })
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ServerInner {
                namespaces: RwLock::new(HashMap::new()),
                jobs: RwLock::new(HashMap::new()),
                io_directory: RwLock::new(None),
                credentials: RwLock::new(None),
                handler: RwLock::new(echo_handler()),
                ready: AtomicBool::new(true),
                next_job_id: AtomicU64::new(1),
                next_connection_id: AtomicU64::new(1),
                server_loads: AtomicU64::new(0),
                inserts: AtomicU64::new(0),
                writer_transfers: AtomicU64::new(0),
                jobs_run: AtomicU64::new(0),
            }),
        }
    }

    /// Advertise `dir` as the server-local io directory and allow
    /// server-side loads of files beneath it.
    pub fn with_io_directory(self, dir: impl Into<PathBuf>) -> Self {
        *self.inner.io_directory.write() = Some(dir.into());
        self
    }

    /// Require `secret` as the credentials of every connection.
    pub fn with_credentials(self, secret: impl Into<String>) -> Self {
        *self.inner.credentials.write() = Some(secret.into());
        self
    }

    /// Replace the query job handler.
    pub fn with_job_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&str, &PropertyMap) -> Result<TableData> + Send + Sync + 'static,
    {
        *self.inner.handler.write() = Arc::new(handler);
        self
    }

    /// Toggle whether `ping()` reports the server as ready.
    pub fn set_ready(&self, ready: bool) {
        self.inner.ready.store(ready, Ordering::SeqCst);
    }

    pub fn stats(&self) -> ServerStats {
        let i = &self.inner;
        ServerStats {
            server_loads: i.server_loads.load(Ordering::Relaxed),
            inserts: i.inserts.load(Ordering::Relaxed),
            writer_transfers: i.writer_transfers.load(Ordering::Relaxed),
            jobs_run: i.jobs_run.load(Ordering::Relaxed),
        }
    }

    /// Names of all existing namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of every frame (any kind) in `namespace`, sorted.
    pub fn frame_names(&self, namespace: &str) -> Vec<String> {
        let namespaces = self.inner.namespaces.read();
        let mut names: Vec<String> = namespaces
            .get(namespace)
            .map(|ns| ns.frames.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Rows currently stored in `namespace.name`.
    pub fn frame_rows(&self, namespace: &str, name: &str) -> Option<Vec<Row>> {
        let namespaces = self.inner.namespaces.read();
        namespaces.get(namespace)?.frames.get(name).map(|f| f.rows.clone())
    }
}

impl ServerInner {
    fn with_frame<T>(
        &self,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut StoredFrame) -> Result<T>,
    ) -> Result<T> {
        let mut namespaces = self.namespaces.write();
        let frame = namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.frames.get_mut(name))
            .ok_or_else(|| Error::NotFound(format!("frame '{name}' in namespace '{namespace}'")))?;
        f(frame)
    }

    fn read_server_file(&self, uri: &str) -> Result<Vec<Row>> {
        let path = uri
            .strip_prefix(SERVER_URI_SCHEME)
            .map(Path::new)
            .ok_or_else(|| Error::Load(format!("unsupported uri '{uri}'")))?;
        let io_directory = self
            .io_directory
            .read()
            .clone()
            .ok_or_else(|| Error::Load("server has no io directory".into()))?;
        if !path.starts_with(&io_directory) {
            return Err(Error::Load(format!("{} is not visible to the server", path.display())));
        }
        let batch = crate::load::read_parquet(path)?;
        batch_to_rows(&batch)
    }

    fn new_job(&self, namespace: &str, query: &str, work: Work) -> Job {
        let id = JobId(self.next_job_id.fetch_add(1, Ordering::Relaxed));
        let job = Job {
            id,
            status: JobStatus::Queued,
            query: query.to_string(),
            submitted_at: Utc::now(),
        };
        self.jobs.write().insert(id, JobRecord {
            job: job.clone(),
            namespace: namespace.to_string(),
            work,
        });
        job
    }

    /// Move a job one stage forward: Queued → Running → terminal.
    fn advance(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.jobs.write();
        let record = jobs.get_mut(&id).ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        match record.job.status {
            JobStatus::Queued => record.job.status = JobStatus::Running,
            JobStatus::Running => {
                let work = std::mem::replace(&mut record.work, Work::Done);
                record.job.status = match self.execute(&record.namespace, &record.job.query, work) {
                    Ok(()) => JobStatus::Completed,
                    Err(e) => JobStatus::Failed(e.to_string()),
                };
            }
            _ => {}
        }
        Ok(record.job.clone())
    }

    fn execute(&self, namespace: &str, query: &str, work: Work) -> Result<()> {
        match work {
            Work::Query { params } => {
                self.jobs_run.fetch_add(1, Ordering::Relaxed);
                let handler = self.handler.read().clone();
                let result = handler(query, &params)?;
                let destination = crate::query::destination(query)
                    .ok_or_else(|| Error::Store("query has no INTO clause".into()))?;
                let mut namespaces = self.namespaces.write();
                let ns = namespaces
                    .get_mut(namespace)
                    .ok_or_else(|| Error::NotFound(format!("namespace '{namespace}'")))?;
                if ns.frames.contains_key(destination) {
                    return Err(Error::Store(format!(
                        "result frame '{destination}' already exists with a possibly different schema"
                    )));
                }
                check_rows(destination, &result.schema, &result.rows)?;
                ns.frames.insert(destination.to_string(), StoredFrame {
                    shape: Shape::Table,
                    schema: result.schema,
                    rows: result.rows,
                });
                Ok(())
            }
            Work::Load { frame, rows } => {
                self.with_frame(namespace, &frame, |f| f.append(&frame, rows))?;
                self.server_loads.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Work::Done => Ok(()),
        }
    }
}

#[async_trait]
impl Connector for MemoryServer {
    type Store = MemoryStore;

    async fn ping(&self, _endpoint: &Endpoint) -> Result<bool> {
        Ok(self.inner.ready.load(Ordering::SeqCst))
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
        userid: &str,
        credentials: Option<&str>,
    ) -> Result<MemoryStore> {
        if !self.inner.ready.load(Ordering::SeqCst) {
            return Err(Error::Connection(format!("{endpoint} is not accepting connections")));
        }
        if let Some(secret) = self.inner.credentials.read().as_deref() {
            if credentials != Some(secret) {
                return Err(Error::Connection(format!("authentication failed for user '{userid}'")));
            }
        }
        Ok(MemoryStore {
            server: self.inner.clone(),
            connection: self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed),
            userid: userid.to_string(),
            default_namespace: RwLock::new(None),
        })
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// One connection to a `MemoryServer`.
pub struct MemoryStore {
    server: Arc<ServerInner>,
    connection: u64,
    userid: String,
    default_namespace: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn userid(&self) -> &str {
        &self.userid
    }

    fn namespace(&self) -> Result<String> {
        self.default_namespace
            .read()
            .clone()
            .ok_or_else(|| Error::Store("no default namespace set".into()))
    }

    fn create_frame(&self, name: &str, schema: &Schema, shape: Shape) -> Result<()> {
        let namespace = self.namespace()?;
        let mut namespaces = self.server.namespaces.write();
        let ns = namespaces
            .get_mut(&namespace)
            .ok_or_else(|| Error::NotFound(format!("namespace '{namespace}'")))?;

        if ns.frames.contains_key(name) {
            return Err(Error::Store(format!("frame '{name}' already exists in '{namespace}'")));
        }
        if let Shape::Edge { source, source_key, target, target_key } = &shape {
            for (vertex, key) in [(source, source_key), (target, target_key)] {
                let vertex_key = match ns.frames.get(vertex).map(|f| &f.shape) {
                    Some(Shape::Vertex { key }) => key.clone(),
                    _ => return Err(Error::NotFound(format!("vertex frame '{vertex}'"))),
                };
                let vertex_type = ns.frames[vertex].schema.type_of(&vertex_key);
                if schema.type_of(key) != vertex_type {
                    return Err(Error::Store(format!(
                        "edge key '{key}' does not match the key type of vertex frame '{vertex}'"
                    )));
                }
            }
        }
        ns.frames.insert(name.to_string(), StoredFrame {
            shape,
            schema: schema.clone(),
            rows: Vec::new(),
        });
        Ok(())
    }

    fn lookup<T>(
        &self,
        name: &str,
        wanted: FrameKind,
        pick: impl FnOnce(&StoredFrame) -> Option<T>,
    ) -> Result<T> {
        let namespace = self.namespace()?;
        let namespaces = self.server.namespaces.read();
        let frame = namespaces
            .get(&namespace)
            .and_then(|ns| ns.frames.get(name))
            .ok_or_else(|| Error::NotFound(format!("frame '{name}'")))?;
        let kind = frame.kind();
        pick(frame).ok_or_else(|| {
            Error::Store(format!("frame '{name}' is a {kind:?} frame, not a {wanted:?} frame"))
        })
    }
}

fn require_column(schema: &Schema, column: &str) -> Result<()> {
    match schema.index_of(column) {
        Some(_) => Ok(()),
        None => Err(Error::UnknownColumn { column: column.to_string(), schema: schema.to_string() }),
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn drop_namespace(&self, namespace: &str, force: bool) -> Result<bool> {
        let mut namespaces = self.server.namespaces.write();
        if let Some(ns) = namespaces.get(namespace) {
            if !force && !ns.frames.is_empty() {
                return Err(Error::Store(format!("namespace '{namespace}' is not empty")));
            }
        }
        let existed = namespaces.remove(namespace).is_some();
        drop(namespaces);

        let mut default = self.default_namespace.write();
        if default.as_deref() == Some(namespace) {
            *default = None;
        }
        Ok(existed)
    }

    async fn release_namespace(&self, namespace: &str) -> Result<bool> {
        let mut namespaces = self.server.namespaces.write();
        let owned = namespaces
            .get(namespace)
            .is_some_and(|ns| ns.owner == Some(self.connection));
        if owned {
            namespaces.remove(namespace);
        }
        Ok(owned)
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.server.namespaces.read().contains_key(namespace))
    }

    async fn set_default_namespace(&self, namespace: &str) -> Result<()> {
        self.server
            .namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .owner = Some(self.connection);
        *self.default_namespace.write() = Some(namespace.to_string());
        Ok(())
    }

    async fn get_config(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let mut config = HashMap::new();
        if keys.contains(&IO_DIRECTORY_KEY) {
            if let Some(dir) = self.server.io_directory.read().as_ref() {
                config.insert(IO_DIRECTORY_KEY.to_string(), dir.display().to_string());
            }
        }
        Ok(config)
    }

    async fn create_vertex_frame(&self, name: &str, schema: &Schema, key: &str) -> Result<VertexFrame> {
        require_column(schema, key)?;
        self.create_frame(name, schema, Shape::Vertex { key: key.to_string() })?;
        Ok(VertexFrame::new(name, schema.clone(), key))
    }

    async fn create_edge_frame(
        &self,
        name: &str,
        schema: &Schema,
        source: &str,
        source_key: &str,
        target: &str,
        target_key: &str,
    ) -> Result<EdgeFrame> {
        require_column(schema, source_key)?;
        require_column(schema, target_key)?;
        self.create_frame(name, schema, Shape::Edge {
            source: source.to_string(),
            source_key: source_key.to_string(),
            target: target.to_string(),
            target_key: target_key.to_string(),
        })?;
        Ok(EdgeFrame {
            name: name.to_string(),
            schema: schema.clone(),
            source: source.to_string(),
            source_key: source_key.to_string(),
            target: target.to_string(),
            target_key: target_key.to_string(),
            num_rows: 0,
        })
    }

    async fn drop_frame(&self, name: &str) -> Result<Vec<String>> {
        let namespace = self.namespace()?;
        let mut namespaces = self.server.namespaces.write();
        let Some(ns) = namespaces.get_mut(&namespace) else {
            return Ok(Vec::new());
        };
        let Some(frame) = ns.frames.remove(name) else {
            return Ok(Vec::new());
        };

        let mut dropped = vec![name.to_string()];
        if frame.kind() == FrameKind::Vertex {
            let mut dependents: Vec<String> = ns
                .frames
                .iter()
                .filter(|(_, f)| f.references(name))
                .map(|(n, _)| n.clone())
                .collect();
            dependents.sort();
            for dependent in &dependents {
                ns.frames.remove(dependent);
            }
            dropped.extend(dependents);
        }
        Ok(dropped)
    }

    async fn get_vertex_frame(&self, name: &str) -> Result<VertexFrame> {
        self.lookup(name, FrameKind::Vertex, |f| f.vertex(name))
    }

    async fn get_edge_frame(&self, name: &str) -> Result<EdgeFrame> {
        self.lookup(name, FrameKind::Edge, |f| f.edge(name))
    }

    async fn get_table_frame(&self, name: &str) -> Result<TableFrame> {
        self.lookup(name, FrameKind::Table, |f| match f.shape {
            Shape::Table => Some(TableFrame {
                name: name.to_string(),
                schema: f.schema.clone(),
                num_rows: f.rows.len() as u64,
            }),
            _ => None,
        })
    }

    async fn list_frames(&self, namespace: &str) -> Result<Vec<Frame>> {
        let namespaces = self.server.namespaces.read();
        let ns = namespaces
            .get(namespace)
            .ok_or_else(|| Error::NotFound(format!("namespace '{namespace}'")))?;
        let mut frames: Vec<Frame> = ns
            .frames
            .iter()
            .filter_map(|(name, f)| {
                f.vertex(name)
                    .map(Frame::Vertex)
                    .or_else(|| f.edge(name).map(Frame::Edge))
            })
            .collect();
        frames.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(frames)
    }

    async fn num_rows(&self, name: &str) -> Result<u64> {
        let namespace = self.namespace()?;
        self.server.with_frame(&namespace, name, |f| Ok(f.rows.len() as u64))
    }

    async fn insert(&self, frame: &str, rows: Vec<Row>) -> Result<u64> {
        let namespace = self.namespace()?;
        let n = self.server.with_frame(&namespace, frame, |f| f.append(frame, rows))?;
        self.server.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(n)
    }

    async fn load(&self, frame: &str, uri: &str) -> Result<JobId> {
        let namespace = self.namespace()?;
        self.server.with_frame(&namespace, frame, |_| Ok(()))?;
        let rows = self.server.read_server_file(uri)?;
        let job = self.server.new_job(
            &namespace,
            &format!("LOAD {uri} INTO {frame}"),
            Work::Load { frame: frame.to_string(), rows },
        );
        Ok(job.id)
    }

    async fn open_writer(
        &self,
        namespace: &str,
        frame: &str,
        schema: &Schema,
    ) -> Result<Box<dyn FrameWriter>> {
        let frame_schema = self.server.with_frame(namespace, frame, |f| Ok(f.schema.clone()))?;
        if !frame_schema.names().eq(schema.names()) {
            return Err(Error::Load(format!(
                "writer schema {schema} does not match frame '{frame}' schema {frame_schema}"
            )));
        }
        Ok(Box::new(MemoryWriter {
            server: self.server.clone(),
            namespace: namespace.to_string(),
            frame: frame.to_string(),
            schema: frame_schema,
            rows: Vec::new(),
            closed: false,
        }))
    }

    async fn run_job(&self, query: &str, params: &PropertyMap) -> Result<Job> {
        let namespace = self.namespace()?;
        let mut job = self.server.new_job(&namespace, query, Work::Query { params: params.clone() });
        while !job.status.is_terminal() {
            job = self.server.advance(job.id)?;
        }
        Ok(job)
    }

    async fn schedule_job(&self, query: &str, params: &PropertyMap) -> Result<Job> {
        let namespace = self.namespace()?;
        Ok(self.server.new_job(&namespace, query, Work::Query { params: params.clone() }))
    }

    async fn job(&self, id: JobId) -> Result<Job> {
        self.server.advance(id)
    }

    async fn fetch(&self, name: &str) -> Result<TableData> {
        let namespace = self.namespace()?;
        self.server.with_frame(&namespace, name, |f| {
            Ok(TableData::new(f.schema.clone(), f.rows.clone()))
        })
    }
}

// ============================================================================
// MemoryWriter
// ============================================================================

struct MemoryWriter {
    server: Arc<ServerInner>,
    namespace: String,
    frame: String,
    schema: Schema,
    rows: Vec<Row>,
    closed: bool,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        if self.closed {
            return Err(Error::Load(format!("writer for '{}' is closed", self.frame)));
        }
        let batch_schema = batch.schema();
        let names = batch_schema.fields().iter().map(|f| f.name().as_str());
        if !names.eq(self.schema.names()) {
            return Err(Error::Load(format!(
                "batch columns do not match frame '{}' schema {}",
                self.frame, self.schema
            )));
        }
        self.rows.extend(batch_to_rows(batch)?);
        Ok(())
    }

    async fn close(&mut self) -> Result<u64> {
        if self.closed {
            return Err(Error::Load(format!("writer for '{}' is closed", self.frame)));
        }
        self.closed = true;
        let rows = std::mem::take(&mut self.rows);
        let frame = self.frame.clone();
        let n = self.server.with_frame(&self.namespace, &frame, |f| f.append(&frame, rows))?;
        self.server.writer_transfers.fetch_add(1, Ordering::Relaxed);
        Ok(n)
    }
}

// ============================================================================
// Tests
// ============================================================================
