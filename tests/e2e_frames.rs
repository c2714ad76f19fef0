//! End-to-end tests for vertex/edge frame creation: schema resolution,
//! replacement semantics and implicit endpoint vertex frames.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{ArrayRef, BooleanArray, Float32Array, Int32Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use graph_session::model::{DType, DataFrame};
use graph_session::{
    Error, LogicalType, MemoryServer, MemoryStore, Schema, Session, SessionConfig, Value,
};
use parquet::arrow::ArrowWriter;
use pretty_assertions::assert_eq;

fn config() -> SessionConfig {
    SessionConfig::default()
        .with_userid("ada")
        .with_poll(Duration::from_millis(1), 50)
}

async fn open(server: &MemoryServer) -> Session<MemoryStore> {
    Session::open(server, config()).await.unwrap()
}

fn people() -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("id", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
        ("name", Arc::new(StringArray::from(vec!["Ada", "Grace", "Edsger"])) as ArrayRef),
    ])
    .unwrap()
}

fn knows() -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("src", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
        ("dst", Arc::new(Int64Array::from(vec![2, 3])) as ArrayRef),
        ("since", Arc::new(Int64Array::from(vec![1843, 1952])) as ArrayRef),
    ])
    .unwrap()
}

fn write_parquet(path: &Path, batch: &RecordBatch) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}

// ============================================================================
// 1. person / knows
// ============================================================================

#[tokio::test]
async fn test_person_knows_graph() {
    let server = MemoryServer::new();
    let mut session = open(&server).await;

    let person = session.vertex("person", people(), "id").await.unwrap();
    assert_eq!(person.key, "id");
    assert_eq!(person.num_rows, 3);
    assert_eq!(
        person.schema,
        Schema::new([("id", LogicalType::Int), ("name", LogicalType::Text)])
    );

    let edge = session.edge("knows", knows(), ("person", "person"), "src", "dst").await.unwrap();
    assert_eq!(edge.source, "person");
    assert_eq!(edge.target, "person");
    assert_eq!(edge.num_rows, 2);

    assert!(session.implicit_frames().is_empty());
    assert_eq!(server.frame_names("ada"), vec!["knows", "person"]);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_recreating_a_frame_replaces_its_rows() {
    let server = MemoryServer::new();
    let mut session = open(&server).await;

    session.vertex("person", people(), "id").await.unwrap();
    let again = session.vertex("person", people(), "id").await.unwrap();

    assert_eq!(again.num_rows, 3);
    assert_eq!(server.frame_rows("ada", "person").unwrap().len(), 3);
    assert_eq!(session.frame("person").unwrap().num_rows(), 3);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_recreating_a_vertex_drops_dependent_edges() {
    let server = MemoryServer::new();
    let mut session = open(&server).await;
    session.vertex("person", people(), "id").await.unwrap();
    session.edge("knows", knows(), ("person", "person"), "src", "dst").await.unwrap();

    session.vertex("person", people(), "id").await.unwrap();
    assert!(session.frame("knows").is_none());
    assert_eq!(server.frame_names("ada"), vec!["person"]);
    session.close().await.unwrap();
}

// ============================================================================
// 2. implicit endpoints
// ============================================================================

#[tokio::test]
async fn test_missing_endpoints_are_created_from_edge_key_types() {
    let server = MemoryServer::new();
    let mut session = open(&server).await;

    let flows = RecordBatch::try_from_iter(vec![
        ("from_host", Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef),
        ("to_port", Arc::new(Int64Array::from(vec![80, 443])) as ArrayRef),
    ])
    .unwrap();
    session.edge("flows", flows, ("host", "port"), "from_host", "to_port").await.unwrap();

    assert_eq!(session.implicit_frames(), &["host".to_string(), "port".to_string()]);

    let host = session.frame("host").unwrap();
    assert_eq!(host.schema(), &Schema::new([("id", LogicalType::Text)]));
    let port = session.frame("port").unwrap();
    assert_eq!(port.schema(), &Schema::new([("id", LogicalType::Int)]));
    assert_eq!(host.num_rows(), 0);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_existing_endpoint_is_never_recreated() {
    let server = MemoryServer::new();
    let mut session = open(&server).await;
    session.vertex("person", people(), "id").await.unwrap();
    session.edge("knows", knows(), ("person", "person"), "src", "dst").await.unwrap();
    session.edge("likes", knows(), ("person", "person"), "src", "dst").await.unwrap();

    assert!(session.implicit_frames().is_empty());
    assert_eq!(server.frame_rows("ada", "person").unwrap().len(), 3);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_endpoint_without_auto_create() {
    let server = MemoryServer::new();
    let mut session = Session::open(&server, config().with_auto_create_endpoints(false))
        .await
        .unwrap();

    let err = session
        .edge("knows", knows(), ("person", "person"), "src", "dst")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(server.frame_names("ada").is_empty());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_endpoint_key_type_mismatch() {
    let server = MemoryServer::new();
    let mut session = open(&server).await;
    session.vertex("person", people(), "id").await.unwrap();

    let by_name = RecordBatch::try_from_iter(vec![
        ("src", Arc::new(StringArray::from(vec!["Ada"])) as ArrayRef),
        ("dst", Arc::new(StringArray::from(vec!["Grace"])) as ArrayRef),
    ])
    .unwrap();
    let err = session
        .edge("knows", by_name, ("person", "person"), "src", "dst")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EndpointKeyMismatch { .. }));
    assert!(session.frame("knows").is_none());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_key_column() {
    let server = MemoryServer::new();
    let mut session = open(&server).await;
    let err = session
        .edge("knows", knows(), ("person", "person"), "source", "dst")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { ref column, .. } if column == "source"));
    assert!(session.implicit_frames().is_empty());
    session.close().await.unwrap();
}

// ============================================================================
// 3. schema resolution across source variants
// ============================================================================

#[tokio::test]
async fn test_schema_order_is_identical_for_every_source() {
    let batch = RecordBatch::try_from_iter(vec![
        ("b", Arc::new(StringArray::from(vec!["x"])) as ArrayRef),
        ("a", Arc::new(Int32Array::from(vec![1])) as ArrayRef),
        ("c", Arc::new(Float32Array::from(vec![0.5])) as ArrayRef),
        ("d", Arc::new(BooleanArray::from(vec![true])) as ArrayRef),
    ])
    .unwrap();
    let df = DataFrame::new([
        ("b", DType::String),
        ("a", DType::Int32),
        ("c", DType::Float32),
        ("d", DType::Bool),
    ])
    .with_row([Value::from("x"), Value::Int(1), Value::Float(0.5), Value::Bool(true)]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.parquet");
    write_parquet(&path, &batch);

    let expected = Schema::new([
        ("b", LogicalType::Text),
        ("a", LogicalType::Int),
        ("c", LogicalType::Float),
        ("d", LogicalType::Boolean),
    ]);

    let server = MemoryServer::new();
    let mut session = open(&server).await;
    let from_table = session.vertex("t", batch, "a").await.unwrap();
    let from_df = session.vertex("f", df, "a").await.unwrap();
    let from_file = session.vertex("p", path.as_path(), "a").await.unwrap();

    assert_eq!(from_table.schema, expected);
    assert_eq!(from_df.schema, expected);
    assert_eq!(from_file.schema, expected);
    assert_eq!(
        server.frame_rows("ada", "t").unwrap(),
        server.frame_rows("ada", "p").unwrap()
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_unresolvable_source_creates_nothing() {
    let server = MemoryServer::new();
    let mut session = open(&server).await;
    let err = session.vertex("person", "no/such/file.parquet", "id").await.unwrap_err();
    assert!(matches!(err, Error::SchemaResolution(_)));
    assert!(server.frame_names("ada").is_empty());
    session.close().await.unwrap();
}

// ============================================================================
// 4. bulk writers
// ============================================================================

#[tokio::test]
async fn test_vertex_and_edge_writers() {
    let server = MemoryServer::new();
    let mut session = open(&server).await;

    let schema = Schema::from_arrow(&people().schema());
    let mut writer = session.vertex_writer("person", schema, "id").await.unwrap();
    writer.write(&people()).await.unwrap();
    assert_eq!(writer.close().await.unwrap(), 3);
    assert_eq!(session.refresh("person").await.unwrap(), 3);

    let schema = Schema::from_arrow(&knows().schema());
    let mut writer = session
        .edge_writer("knows", schema, ("person", "person"), "src", "dst")
        .await
        .unwrap();
    writer.write(&knows()).await.unwrap();
    writer.write(&knows()).await.unwrap();
    assert_eq!(writer.close().await.unwrap(), 4);
    assert_eq!(session.refresh("knows").await.unwrap(), 4);
    assert_eq!(server.stats().writer_transfers, 2);
    session.close().await.unwrap();
}
