//! Frame registry: the session's local cache of frames it created or
//! resolved, plus drop-then-recreate frame creation.
//!
//! ## Edge endpoint resolution
//!
//! Each endpoint of a new edge frame is resolved independently:
//!
//! 1. registered locally → reuse
//! 2. otherwise ask the store by name
//! 3. store says "not found" → create an implicit vertex frame with a
//!    single key column `id`, typed like the edge's key column
//!
//! Any lookup failure other than "not found" propagates unchanged. Nothing
//! is created until both endpoints have passed the key-type check.

use std::collections::HashMap;

use crate::model::*;
use crate::store::GraphStore;
use crate::{Error, Result};

/// Key column of every implicit vertex frame.
pub const IMPLICIT_KEY: &str = "id";

#[derive(Debug, Default)]
pub struct FrameRegistry {
    frames: HashMap<String, Frame>,
    implicit: Vec<String>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Frame> {
        self.frames.get(name)
    }

    pub fn vertex(&self, name: &str) -> Option<&VertexFrame> {
        match self.frames.get(name) {
            Some(Frame::Vertex(v)) => Some(v),
            _ => None,
        }
    }

    pub fn edge(&self, name: &str) -> Option<&EdgeFrame> {
        match self.frames.get(name) {
            Some(Frame::Edge(e)) => Some(e),
            _ => None,
        }
    }

    /// Registered frames, ordered by name.
    pub fn frames(&self) -> Vec<&Frame> {
        let mut frames: Vec<&Frame> = self.frames.values().collect();
        frames.sort_by(|a, b| a.name().cmp(b.name()));
        frames
    }

    /// Names of vertex frames created implicitly for edge endpoints, in creation order.
    pub fn implicit_frames(&self) -> &[String] {
        &self.implicit
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn register(&mut self, frame: Frame) {
        self.frames.insert(frame.name().to_string(), frame);
    }

    pub(crate) fn forget(&mut self, names: &[String]) {
        for name in names {
            self.frames.remove(name);
            self.implicit.retain(|n| n != name);
        }
    }

    pub(crate) fn set_num_rows(&mut self, name: &str, rows: u64) {
        if let Some(frame) = self.frames.get_mut(name) {
            frame.set_num_rows(rows);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
        self.implicit.clear();
    }

    /// Drop `name` locally and remotely, along with anything the store cascaded.
    pub async fn drop_frame<S>(&mut self, store: &S, name: &str) -> Result<Vec<String>>
    where
        S: GraphStore + ?Sized,
    {
        let mut dropped = store.drop_frame(name).await?;
        if !dropped.iter().any(|n| n == name) && self.frames.contains_key(name) {
            dropped.push(name.to_string());
        }
        if !dropped.is_empty() {
            tracing::debug!(frame = name, ?dropped, "dropped frames");
        }
        self.forget(&dropped);
        Ok(dropped)
    }

    /// Create (or replace) a vertex frame.
    pub async fn create_vertex<S>(
        &mut self,
        store: &S,
        name: &str,
        schema: Schema,
        key: &str,
    ) -> Result<VertexFrame>
    where
        S: GraphStore + ?Sized,
    {
        require_column(&schema, key)?;
        self.drop_frame(store, name).await?;
        let vertex = store.create_vertex_frame(name, &schema, key).await?;
        tracing::info!(frame = name, key, %schema, "created vertex frame");
        self.register(Frame::Vertex(vertex.clone()));
        Ok(vertex)
    }

    /// Create (or replace) an edge frame, resolving both endpoints first.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_edge<S>(
        &mut self,
        store: &S,
        name: &str,
        schema: Schema,
        (source, target): (&str, &str),
        source_key: &str,
        target_key: &str,
        auto_create: bool,
    ) -> Result<EdgeFrame>
    where
        S: GraphStore + ?Sized,
    {
        let source_type = require_column(&schema, source_key)?;
        let target_type = require_column(&schema, target_key)?;

        // Both endpoints are resolved and checked before anything is created.
        let source_plan = self.plan_endpoint(store, source, source_type, auto_create).await?;
        let target_plan = if target == source {
            source_plan.shared()
        } else {
            self.plan_endpoint(store, target, target_type, auto_create).await?
        };
        check_endpoint_key(name, source_plan.frame(), source_key, source_type)?;
        check_endpoint_key(name, target_plan.frame(), target_key, target_type)?;
        self.realize(store, source_plan).await?;
        self.realize(store, target_plan).await?;

        self.drop_frame(store, name).await?;
        let edge = store
            .create_edge_frame(name, &schema, source, source_key, target, target_key)
            .await?;
        tracing::info!(frame = name, source, target, %schema, "created edge frame");
        self.register(Frame::Edge(edge.clone()));
        Ok(edge)
    }

    async fn plan_endpoint<S>(
        &mut self,
        store: &S,
        name: &str,
        key_type: LogicalType,
        auto_create: bool,
    ) -> Result<EndpointPlan>
    where
        S: GraphStore + ?Sized,
    {
        if let Some(vertex) = self.vertex(name) {
            return Ok(EndpointPlan::Existing(vertex.clone()));
        }
        match store.get_vertex_frame(name).await {
            Ok(vertex) => {
                self.register(Frame::Vertex(vertex.clone()));
                Ok(EndpointPlan::Existing(vertex))
            }
            Err(Error::NotFound(_)) if auto_create => {
                let schema = Schema::new([(IMPLICIT_KEY, key_type)]);
                Ok(EndpointPlan::Implicit(VertexFrame::new(name, schema, IMPLICIT_KEY)))
            }
            Err(e) => Err(e),
        }
    }

    async fn realize<S>(&mut self, store: &S, plan: EndpointPlan) -> Result<()>
    where
        S: GraphStore + ?Sized,
    {
        let EndpointPlan::Implicit(planned) = plan else {
            return Ok(());
        };
        tracing::warn!(
            frame = %planned.name,
            key = IMPLICIT_KEY,
            key_type = ?planned.key_type(),
            "creating implicit vertex frame for edge endpoint"
        );
        let vertex = store
            .create_vertex_frame(&planned.name, &planned.schema, IMPLICIT_KEY)
            .await?;
        self.implicit.push(vertex.name.clone());
        self.register(Frame::Vertex(vertex));
        Ok(())
    }
}

/// How one edge endpoint will be satisfied.
enum EndpointPlan {
    Existing(VertexFrame),
    /// Not in the store yet; created once every check has passed.
    Implicit(VertexFrame),
}

impl EndpointPlan {
    fn frame(&self) -> &VertexFrame {
        match self {
            EndpointPlan::Existing(v) | EndpointPlan::Implicit(v) => v,
        }
    }

    /// The same vertex seen from the other end of a self-loop; creating it
    /// once is enough.
    fn shared(&self) -> EndpointPlan {
        EndpointPlan::Existing(self.frame().clone())
    }
}

fn require_column(schema: &Schema, column: &str) -> Result<LogicalType> {
    schema.type_of(column).ok_or_else(|| Error::UnknownColumn {
        column: column.to_string(),
        schema: schema.to_string(),
    })
}

fn check_endpoint_key(edge: &str, vertex: &VertexFrame, key: &str, key_type: LogicalType) -> Result<()> {
    let vertex_type = vertex.key_type();
    if vertex_type == Some(key_type) {
        return Ok(());
    }
    Err(Error::EndpointKeyMismatch {
        edge: edge.to_string(),
        key: key.to_string(),
        key_type,
        vertex: vertex.name.clone(),
        vertex_key_type: vertex_type.map_or_else(|| "unknown".to_string(), |t| t.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Connector, Endpoint, MemoryServer, MemoryStore};
    use pretty_assertions::assert_eq;

    async fn store(server: &MemoryServer) -> MemoryStore {
        let store = server.connect(&Endpoint::new("localhost", 4367), "t", None).await.unwrap();
        store.set_default_namespace("t").await.unwrap();
        store
    }

    fn edge_schema(ty: LogicalType) -> Schema {
        Schema::new([("src", ty), ("dst", ty), ("weight", LogicalType::Float)])
    }

    #[tokio::test]
    async fn test_vertex_key_must_be_a_column() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        let mut registry = FrameRegistry::new();
        let err = registry
            .create_vertex(&store, "person", Schema::new([("id", LogicalType::Int)]), "name")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_missing_endpoints_become_implicit_frames() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        let mut registry = FrameRegistry::new();

        let edge = registry
            .create_edge(&store, "flows", edge_schema(LogicalType::Text), ("host", "port"), "src", "dst", true)
            .await
            .unwrap();

        assert_eq!(edge.source, "host");
        assert_eq!(registry.implicit_frames(), &["host".to_string(), "port".to_string()]);
        let host = store.get_vertex_frame("host").await.unwrap();
        assert_eq!(host.schema, Schema::new([("id", LogicalType::Text)]));
        assert_eq!(host.key, "id");
    }

    #[tokio::test]
    async fn test_self_loop_creates_one_implicit_frame() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        let mut registry = FrameRegistry::new();

        registry
            .create_edge(&store, "knows", edge_schema(LogicalType::Int), ("person", "person"), "src", "dst", true)
            .await
            .unwrap();
        assert_eq!(registry.implicit_frames(), &["person".to_string()]);
        assert_eq!(server.frame_names("t"), vec!["knows", "person"]);
    }

    #[tokio::test]
    async fn test_self_loop_with_mismatched_keys_creates_nothing() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        let mut registry = FrameRegistry::new();
        let schema = Schema::new([("src", LogicalType::Int), ("dst", LogicalType::Text)]);

        let err = registry
            .create_edge(&store, "e", schema, ("node", "node"), "src", "dst", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EndpointKeyMismatch { .. }));
        assert!(server.frame_names("t").is_empty());
        assert!(registry.is_empty());
        assert!(registry.implicit_frames().is_empty());
    }

    #[tokio::test]
    async fn test_mismatch_on_target_leaves_missing_source_uncreated() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        store
            .create_vertex_frame("port", &Schema::new([("id", LogicalType::Int)]), "id")
            .await
            .unwrap();
        let mut registry = FrameRegistry::new();

        let err = registry
            .create_edge(&store, "flows", edge_schema(LogicalType::Text), ("host", "port"), "src", "dst", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EndpointKeyMismatch { .. }));
        assert_eq!(server.frame_names("t"), vec!["port"]);
        assert!(registry.implicit_frames().is_empty());
    }

    #[tokio::test]
    async fn test_remote_endpoint_is_reused_and_cached() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        store
            .create_vertex_frame("person", &Schema::new([("pid", LogicalType::Int)]), "pid")
            .await
            .unwrap();

        let mut registry = FrameRegistry::new();
        registry
            .create_edge(&store, "knows", edge_schema(LogicalType::Int), ("person", "person"), "src", "dst", true)
            .await
            .unwrap();
        assert!(registry.implicit_frames().is_empty());
        assert_eq!(registry.vertex("person").map(|v| v.key.as_str()), Some("pid"));
    }

    #[tokio::test]
    async fn test_missing_endpoint_without_auto_create_is_not_found() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        let mut registry = FrameRegistry::new();
        let err = registry
            .create_edge(&store, "knows", edge_schema(LogicalType::Int), ("a", "b"), "src", "dst", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(server.frame_names("t").is_empty());
    }

    #[tokio::test]
    async fn test_other_lookup_failures_propagate() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        let mut registry = FrameRegistry::new();
        registry
            .create_edge(&store, "knows", edge_schema(LogicalType::Int), ("a", "a"), "src", "dst", true)
            .await
            .unwrap();

        // "knows" exists remotely but is an edge frame: not a "not found" signal.
        let mut fresh = FrameRegistry::new();
        let err = fresh
            .create_edge(&store, "meta", edge_schema(LogicalType::Int), ("knows", "a"), "src", "dst", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert!(fresh.implicit_frames().is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_implicit_key_types_are_flagged() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        let mut registry = FrameRegistry::new();
        registry
            .create_edge(&store, "e1", edge_schema(LogicalType::Int), ("shared", "shared"), "src", "dst", true)
            .await
            .unwrap();

        let err = registry
            .create_edge(&store, "e2", edge_schema(LogicalType::Text), ("shared", "shared"), "src", "dst", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EndpointKeyMismatch { .. }));
        assert!(store.get_edge_frame("e2").await.is_err());
    }

    #[tokio::test]
    async fn test_replacing_a_vertex_forgets_cascaded_edges() {
        let server = MemoryServer::new();
        let store = store(&server).await;
        let mut registry = FrameRegistry::new();
        let schema = Schema::new([("id", LogicalType::Int)]);
        registry.create_vertex(&store, "person", schema.clone(), "id").await.unwrap();
        registry
            .create_edge(&store, "knows", edge_schema(LogicalType::Int), ("person", "person"), "src", "dst", true)
            .await
            .unwrap();

        registry.create_vertex(&store, "person", schema, "id").await.unwrap();
        assert!(registry.edge("knows").is_none());
        assert_eq!(server.frame_names("t"), vec!["person"]);
    }
}
