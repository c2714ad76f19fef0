//! # Session
//!
//! A session owns one authenticated store connection and one private
//! namespace named after the normalized identity. Everything it creates
//! lives in that namespace and is purged when the session closes.
//!
//! ```text
//! Disconnected ──open()──→ Active ──close()──→ Disconnected
//! ```
//!
//! Frame creation is drop-then-recreate: creating `person` twice never
//! accumulates rows. Edge endpoints that do not exist yet are created as
//! implicit single-key vertex frames (see [`crate::registry`]).
//!
//! ```ignore
//! let server = MemoryServer::new();
//! let config = SessionConfig::default().with_userid("ada.lovelace");
//! let mut session = Session::open(&server, config).await?;
//! session.vertex("person", people_batch, "id").await?;
//! session.edge("knows", knows_batch, ("person", "person"), "src", "dst").await?;
//! session.query("MATCH (a)-[:knows]->(b) RETURN a.id, b.id", &PropertyMap::new(), true).await?;
//! let answer = session.fetch(None).await?;
//! session.close().await?;
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;

use crate::config::{ConfigProvider, SessionConfig};
use crate::job::{self, Job, JobId};
use crate::load::{LoadDispatcher, LoadReport};
use crate::model::*;
use crate::query::{QueryRunner, DEFAULT_ANSWER_TABLE};
use crate::registry::FrameRegistry;
use crate::resolver;
use crate::store::{Connector, FrameWriter, GraphStore, IO_DIRECTORY_KEY};
use crate::{Error, Result};

/// Connection state. There are no others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Active,
}

/// Body of [`Session::scoped`].
pub type ScopedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a>>;

/// A namespaced working session against one graph store.
pub struct Session<S: GraphStore> {
    /// `Some` exactly while the session is Active.
    store: Option<Arc<S>>,
    namespace: String,
    answer_table: String,
    io_directory: Option<PathBuf>,
    registry: FrameRegistry,
    config: SessionConfig,
}

impl<S: GraphStore> Session<S> {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect, authenticate and claim the identity's namespace.
    ///
    /// Unless `config.restore` is set, whatever the namespace held before is
    /// purged first, and `open()` does not return until the purge is visible.
    pub async fn open<C>(connector: &C, config: SessionConfig) -> Result<Self>
    where
        C: Connector<Store = S>,
    {
        config.validate()?;
        let identity = config.identity()?;
        let namespace = normalize_identity(&identity)?;
        let endpoint = config.endpoint();
        let poll = config.poll_policy();

        let endpoint_ref = &endpoint;
        job::poll_until(poll, "store readiness", move || async move {
            Ok(connector.ping(endpoint_ref).await?.then_some(()))
        })
        .await
        .map_err(|e| match e {
            Error::Timeout { polls, .. } => {
                Error::Connection(format!("{endpoint} not ready after {polls} polls"))
            }
            other => other,
        })?;

        let store = Arc::new(
            connector
                .connect(&endpoint, &identity, config.credentials.as_deref())
                .await?,
        );

        if !config.restore {
            store.drop_namespace(&namespace, true).await?;
            await_namespace_gone(&*store, &namespace, config.poll_policy()).await?;
        }
        store.set_default_namespace(&namespace).await?;

        let io_directory = store
            .get_config(&[IO_DIRECTORY_KEY])
            .await?
            .remove(IO_DIRECTORY_KEY)
            .map(PathBuf::from);

        let mut registry = FrameRegistry::new();
        if config.restore {
            for frame in store.list_frames(&namespace).await? {
                registry.register(frame);
            }
        }

        tracing::info!(
            %endpoint,
            namespace = %namespace,
            restore = config.restore,
            restored_frames = registry.len(),
            io_directory = ?io_directory,
            "session open"
        );

        Ok(Self {
            store: Some(store),
            namespace,
            answer_table: DEFAULT_ANSWER_TABLE.to_string(),
            io_directory,
            registry,
            config,
        })
    }

    /// [`open`](Self::open) with configuration from a provider.
    pub async fn open_with<C, P>(connector: &C, provider: &P) -> Result<Self>
    where
        C: Connector<Store = S>,
        P: ConfigProvider + ?Sized,
    {
        Self::open(connector, provider.resolve()?).await
    }

    /// Drop the namespace and everything in it, then disconnect.
    ///
    /// The session is Disconnected afterwards even if the purge failed.
    /// Closing a Disconnected session is `Error::NotConnected`.
    pub async fn close(&mut self) -> Result<()> {
        let store = self.store.take().ok_or(Error::NotConnected)?;
        self.registry.clear();
        store.drop_namespace(&self.namespace, true).await?;
        await_namespace_gone(&*store, &self.namespace, self.config.poll_policy()).await?;
        tracing::info!(namespace = %self.namespace, "session closed");
        Ok(())
    }

    /// Open a session, run `body`, and close the session whatever `body` returned.
    ///
    /// An error from `body` wins over an error from closing.
    pub async fn scoped<C, T, F>(connector: &C, config: SessionConfig, body: F) -> Result<T>
    where
        C: Connector<Store = S>,
        F: for<'a> FnOnce(&'a mut Session<S>) -> ScopedFuture<'a, T>,
    {
        let mut session = Self::open(connector, config).await?;
        let outcome = body(&mut session).await;
        let closed = session.close().await;
        match (outcome, closed) {
            (Err(e), Err(close_error)) => {
                tracing::warn!(error = %close_error, "close failed after session body error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.store.is_some() { SessionState::Active } else { SessionState::Disconnected }
    }

    pub fn is_active(&self) -> bool {
        self.store.is_some()
    }

    /// The namespace all frames of this session live in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Server-local writable directory, if the store advertised one.
    pub fn io_directory(&self) -> Option<&Path> {
        self.io_directory.as_deref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn active(&self) -> Result<Arc<S>> {
        self.store.clone().ok_or(Error::NotConnected)
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Locally registered frame by name.
    pub fn frame(&self, name: &str) -> Option<&Frame> {
        self.registry.get(name)
    }

    /// Every locally registered frame, ordered by name.
    pub fn frames(&self) -> Vec<&Frame> {
        self.registry.frames()
    }

    /// Vertex frames created implicitly for edge endpoints.
    pub fn implicit_frames(&self) -> &[String] {
        self.registry.implicit_frames()
    }

    /// Create (or replace) vertex frame `name` keyed by `key` and load `data` into it.
    pub async fn vertex(
        &mut self,
        name: &str,
        data: impl Into<DataSource>,
        key: &str,
    ) -> Result<VertexFrame> {
        let store = self.active()?;
        let source = data.into();
        let schema = resolver::resolve(&source)?;
        let mut vertex = self.registry.create_vertex(&*store, name, schema, key).await?;
        vertex.num_rows = self.load_into(&store, &source, &Frame::Vertex(vertex.clone())).await?;
        Ok(vertex)
    }

    /// Create (or replace) edge frame `name` from `source` to `target` and
    /// load `data` into it. Missing endpoints are created implicitly when
    /// `auto_create_endpoints` is on.
    pub async fn edge(
        &mut self,
        name: &str,
        data: impl Into<DataSource>,
        (source, target): (&str, &str),
        source_key: &str,
        target_key: &str,
    ) -> Result<EdgeFrame> {
        let store = self.active()?;
        let data = data.into();
        let schema = resolver::resolve(&data)?;
        let mut edge = self
            .registry
            .create_edge(
                &*store,
                name,
                schema,
                (source, target),
                source_key,
                target_key,
                self.config.auto_create_endpoints,
            )
            .await?;
        edge.num_rows = self.load_into(&store, &data, &Frame::Edge(edge.clone())).await?;
        Ok(edge)
    }

    /// Append `data` to an existing frame of this session.
    pub async fn load(&mut self, name: &str, data: impl Into<DataSource>) -> Result<LoadReport> {
        let store = self.active()?;
        let frame = match self.registry.get(name) {
            Some(frame) => frame.clone(),
            None => return Err(Error::NotFound(format!("frame '{name}' in session '{}'", self.namespace))),
        };
        let source = data.into();
        let report = self.dispatcher(&*store).load(&source, &frame).await?;
        self.refresh_rows(&*store, name).await?;
        Ok(report)
    }

    /// Drop a frame of this session, along with edge frames that depend on it.
    pub async fn drop_frame(&mut self, name: &str) -> Result<Vec<String>> {
        let store = self.active()?;
        self.registry.drop_frame(&*store, name).await
    }

    /// Create (or replace) an empty vertex frame and open a bulk writer on it.
    pub async fn vertex_writer(
        &mut self,
        name: &str,
        schema: Schema,
        key: &str,
    ) -> Result<Box<dyn FrameWriter>> {
        let store = self.active()?;
        let vertex = self.registry.create_vertex(&*store, name, schema, key).await?;
        store.open_writer(&self.namespace, name, &vertex.schema).await
    }

    /// Create (or replace) an empty edge frame and open a bulk writer on it.
    pub async fn edge_writer(
        &mut self,
        name: &str,
        schema: Schema,
        (source, target): (&str, &str),
        source_key: &str,
        target_key: &str,
    ) -> Result<Box<dyn FrameWriter>> {
        let store = self.active()?;
        let edge = self
            .registry
            .create_edge(
                &*store,
                name,
                schema,
                (source, target),
                source_key,
                target_key,
                self.config.auto_create_endpoints,
            )
            .await?;
        store.open_writer(&self.namespace, name, &edge.schema).await
    }

    /// Re-read the row count of a registered frame from the store.
    pub async fn refresh(&mut self, name: &str) -> Result<u64> {
        let store = self.active()?;
        self.refresh_rows(&*store, name).await
    }

    fn dispatcher<'s>(&'s self, store: &'s S) -> LoadDispatcher<'s, S> {
        LoadDispatcher::new(
            store,
            &self.namespace,
            self.io_directory.as_deref(),
            self.config.client_transfer,
            self.config.poll_policy(),
        )
    }

    async fn load_into(&mut self, store: &Arc<S>, source: &DataSource, frame: &Frame) -> Result<u64> {
        self.dispatcher(store).load(source, frame).await?;
        self.refresh_rows(&**store, frame.name()).await
    }

    async fn refresh_rows(&mut self, store: &S, name: &str) -> Result<u64> {
        let rows = store.num_rows(name).await?;
        self.registry.set_num_rows(name, rows);
        Ok(rows)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Submit a query. Its destination (the `INTO` frame, or the answer
    /// table) is dropped first. With `wait`, returns once the job is terminal.
    pub async fn query(&mut self, text: &str, params: &PropertyMap, wait: bool) -> Result<JobId> {
        let store = self.active()?;
        let submission = QueryRunner::new(&*store, &self.answer_table, self.config.poll_policy())
            .submit(text, params, wait)
            .await?;
        self.registry.forget(&submission.dropped);
        Ok(submission.job)
    }

    /// Block until an asynchronously submitted job is terminal.
    pub async fn wait(&self, id: JobId) -> Result<Job> {
        let store = self.active()?;
        QueryRunner::new(&*store, &self.answer_table, self.config.poll_policy()).wait(id).await
    }

    /// Rows of a result table, defaulting to the answer table.
    pub async fn fetch(&self, table: Option<&str>) -> Result<TableData> {
        let store = self.active()?;
        QueryRunner::new(&*store, &self.answer_table, self.config.poll_policy()).fetch(table).await
    }

    /// Result table as an Arrow record batch.
    pub async fn fetch_table(&self, table: Option<&str>) -> Result<RecordBatch> {
        let store = self.active()?;
        QueryRunner::new(&*store, &self.answer_table, self.config.poll_policy())
            .fetch_table(table)
            .await
    }

    // ========================================================================
    // Summary
    // ========================================================================

    /// Human-readable listing of the namespace's frames and their sizes.
    pub async fn describe(&self) -> Result<String> {
        let store = self.active()?;
        let frames = store.list_frames(&self.namespace).await?;
        let mut out = format!("Session namespace '{}'\n", self.namespace);
        if frames.is_empty() {
            out.push_str("  (no frames)\n");
        }
        for frame in frames {
            let rows = thousands(frame.num_rows());
            match frame.kind() {
                FrameKind::Vertex => {
                    out.push_str(&format!("  Vertex frame {} contains {rows} vertices.\n", frame.name()))
                }
                FrameKind::Edge => {
                    out.push_str(&format!("  Edge frame {} contains {rows} edges.\n", frame.name()))
                }
                FrameKind::Table => {}
            }
        }
        Ok(out)
    }
}

impl<S: GraphStore> Drop for Session<S> {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        let namespace = std::mem::take(&mut self.namespace);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(namespace = %namespace, "session dropped while active, purging namespace");
                handle.spawn(async move {
                    match store.release_namespace(&namespace).await {
                        Ok(true) => {}
                        Ok(false) => tracing::debug!(
                            namespace = %namespace,
                            "namespace already purged or claimed by a newer session"
                        ),
                        Err(error) => {
                            tracing::warn!(namespace = %namespace, %error, "background namespace purge failed")
                        }
                    }
                });
            }
            Err(_) => {
                tracing::warn!(namespace = %namespace, "session dropped outside a runtime, namespace left behind");
            }
        }
    }
}

async fn await_namespace_gone<S>(store: &S, namespace: &str, poll: job::PollPolicy) -> Result<()>
where
    S: GraphStore + ?Sized,
{
    job::poll_until(poll, "namespace teardown", move || async move {
        Ok((!store.namespace_exists(namespace).await?).then_some(()))
    })
    .await
}

// ============================================================================
// Identity
// ============================================================================

/// Turn an identity into a valid namespace name.
///
/// `.` and spaces become `_`, `-` is removed, and anything else outside
/// `[A-Za-z0-9_]` becomes `_`. Surrounding whitespace is ignored.
pub fn normalize_identity(raw: &str) -> Result<String> {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        return Err(Error::Config(format!("identity '{raw}' normalizes to an empty namespace name")));
    }
    Ok(name)
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
