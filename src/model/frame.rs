//! Vertex and edge frame descriptors.

use serde::{Deserialize, Serialize};

use super::Schema;

/// What kind of frame a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    Vertex,
    Edge,
    Table,
}

/// A vertex frame: schema plus one key column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexFrame {
    pub name: String,
    pub schema: Schema,
    pub key: String,
    pub num_rows: u64,
}

impl VertexFrame {
    pub fn new(name: impl Into<String>, schema: Schema, key: impl Into<String>) -> Self {
        Self { name: name.into(), schema, key: key.into(), num_rows: 0 }
    }

    /// Logical type of the key column, if the key names a schema column.
    pub fn key_type(&self) -> Option<super::LogicalType> {
        self.schema.type_of(&self.key)
    }
}

/// An edge frame: schema plus source/target vertex frames and key columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFrame {
    pub name: String,
    pub schema: Schema,
    pub source: String,
    pub source_key: String,
    pub target: String,
    pub target_key: String,
    pub num_rows: u64,
}

/// A table frame: the shape query results are materialized into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFrame {
    pub name: String,
    pub schema: Schema,
    pub num_rows: u64,
}

/// Any frame tracked by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Vertex(VertexFrame),
    Edge(EdgeFrame),
}

impl Frame {
    pub fn name(&self) -> &str {
        match self {
            Frame::Vertex(v) => &v.name,
            Frame::Edge(e) => &e.name,
        }
    }

    pub fn schema(&self) -> &Schema {
        match self {
            Frame::Vertex(v) => &v.schema,
            Frame::Edge(e) => &e.schema,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Vertex(_) => FrameKind::Vertex,
            Frame::Edge(_) => FrameKind::Edge,
        }
    }

    pub fn num_rows(&self) -> u64 {
        match self {
            Frame::Vertex(v) => v.num_rows,
            Frame::Edge(e) => e.num_rows,
        }
    }

    pub(crate) fn set_num_rows(&mut self, n: u64) {
        match self {
            Frame::Vertex(v) => v.num_rows = n,
            Frame::Edge(e) => e.num_rows = n,
        }
    }
}

impl From<VertexFrame> for Frame {
    fn from(v: VertexFrame) -> Self { Frame::Vertex(v) }
}

impl From<EdgeFrame> for Frame {
    fn from(e: EdgeFrame) -> Self { Frame::Edge(e) }
}
