//! End-to-end tests for load dispatch: server-side file loads, the
//! client-side fallback and both client transfer modes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use graph_session::model::{DType, DataFrame};
use graph_session::{
    ClientTransfer, Error, JobId, LoadPath, MemoryServer, MemoryStore, Session, SessionConfig,
    Value,
};
use parquet::arrow::ArrowWriter;
use pretty_assertions::assert_eq;

fn config() -> SessionConfig {
    SessionConfig::default()
        .with_userid("ada")
        .with_poll(Duration::from_millis(1), 50)
}

async fn open(server: &MemoryServer, config: SessionConfig) -> Session<MemoryStore> {
    Session::open(server, config).await.unwrap()
}

fn readings() -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("sensor", Arc::new(Int64Array::from(vec![10, 11, 12])) as ArrayRef),
        ("site", Arc::new(StringArray::from(vec!["north", "south", "east"])) as ArrayRef),
        ("value", Arc::new(Float64Array::from(vec![0.25, 1.5, 3.0])) as ArrayRef),
    ])
    .unwrap()
}

fn write_parquet(dir: &Path, batch: &RecordBatch) -> PathBuf {
    let path = dir.join("readings.parquet");
    let file = std::fs::File::create(&path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
    path
}

// ============================================================================
// 1. server-side path and fallback
// ============================================================================

#[tokio::test]
async fn test_file_inside_io_directory_loads_server_side() {
    let io_dir = tempfile::tempdir().unwrap();
    let path = write_parquet(io_dir.path(), &readings());
    let server = MemoryServer::new().with_io_directory(io_dir.path());
    let mut session = open(&server, config()).await;
    assert_eq!(session.io_directory(), Some(io_dir.path()));

    let sensor = session.vertex("sensor", path.as_path(), "sensor").await.unwrap();
    assert_eq!(sensor.num_rows, 3);
    assert_eq!(server.stats().server_loads, 1);
    assert_eq!(server.stats().inserts, 0);

    let report = session.load("sensor", path.as_path()).await.unwrap();
    assert_eq!(report.path, LoadPath::ServerSide);
    assert_eq!(report.rows, 3);
    assert_eq!(session.frame("sensor").unwrap().num_rows(), 6);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_file_outside_io_directory_falls_back_to_client() {
    let io_dir = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();
    let path = write_parquet(data_dir.path(), &readings());
    let server = MemoryServer::new().with_io_directory(io_dir.path());
    let mut session = open(&server, config()).await;

    session.vertex("sensor", path.as_path(), "sensor").await.unwrap();
    assert_eq!(server.stats().server_loads, 0);
    assert_eq!(server.stats().inserts, 1);

    let report = session.load("sensor", path.as_path()).await.unwrap();
    assert_eq!(report.path, LoadPath::ClientSide);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_both_paths_produce_identical_frames() {
    let io_dir = tempfile::tempdir().unwrap();
    let inside = write_parquet(io_dir.path(), &readings());
    let elsewhere = tempfile::tempdir().unwrap();
    let outside = write_parquet(elsewhere.path(), &readings());

    let server = MemoryServer::new().with_io_directory(io_dir.path());
    let mut session = open(&server, config()).await;
    let a = session.vertex("server_side", inside.as_path(), "sensor").await.unwrap();
    let b = session.vertex("client_side", outside.as_path(), "sensor").await.unwrap();

    assert_eq!(a.schema, b.schema);
    assert_eq!(a.num_rows, b.num_rows);
    assert_eq!(
        server.frame_rows("ada", "server_side").unwrap(),
        server.frame_rows("ada", "client_side").unwrap()
    );
    assert_eq!(server.stats().server_loads, 1);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_no_io_directory_skips_server_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_parquet(dir.path(), &readings());
    let server = MemoryServer::new();
    let mut session = open(&server, config()).await;
    assert_eq!(session.io_directory(), None);

    session.vertex("sensor", path.as_path(), "sensor").await.unwrap();
    let rows = server.frame_rows("ada", "sensor").unwrap();
    assert_eq!(
        rows[1],
        vec![Value::Int(11), Value::from("south"), Value::Float(1.5)]
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_server_load_still_running_is_not_loaded_twice() {
    let io_dir = tempfile::tempdir().unwrap();
    let path = write_parquet(io_dir.path(), &readings());
    let server = MemoryServer::new().with_io_directory(io_dir.path());
    let impatient = SessionConfig::default()
        .with_userid("ada")
        .with_poll(Duration::from_millis(1), 1);
    let mut session = open(&server, impatient).await;

    let err = session.vertex("sensor", path.as_path(), "sensor").await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(server.stats().inserts, 0);

    // The load job is the first job on this server.
    session.wait(JobId(1)).await.unwrap();
    assert_eq!(server.frame_rows("ada", "sensor").unwrap().len(), 3);
    assert_eq!(server.stats().server_loads, 1);
    session.close().await.unwrap();
}

// ============================================================================
// 2. client transfer modes
// ============================================================================

#[tokio::test]
async fn test_bulk_writer_transfer() {
    let server = MemoryServer::new();
    let mut session = open(&server, config().with_client_transfer(ClientTransfer::BulkWriter)).await;

    session.vertex("sensor", readings(), "sensor").await.unwrap();
    let df = DataFrame::new([("sensor", DType::Int64), ("site", DType::String)])
        .with_row([Value::Int(20), Value::from("west")]);
    let site = session.vertex("station", df, "sensor").await.unwrap();

    assert_eq!(site.num_rows, 1);
    assert_eq!(server.stats().writer_transfers, 2);
    assert_eq!(server.stats().inserts, 0);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_insert_and_bulk_writer_agree() {
    let server = MemoryServer::new();
    let mut inserting = open(&server, config()).await;
    inserting.vertex("sensor", readings(), "sensor").await.unwrap();
    let by_insert = server.frame_rows("ada", "sensor").unwrap();
    inserting.close().await.unwrap();

    let mut writing = open(&server, config().with_client_transfer(ClientTransfer::BulkWriter)).await;
    writing.vertex("sensor", readings(), "sensor").await.unwrap();
    assert_eq!(server.frame_rows("ada", "sensor").unwrap(), by_insert);
    writing.close().await.unwrap();
}

// ============================================================================
// 3. load into existing frames
// ============================================================================

#[tokio::test]
async fn test_load_appends_to_registered_frame() {
    let server = MemoryServer::new();
    let mut session = open(&server, config()).await;
    session.vertex("sensor", readings(), "sensor").await.unwrap();

    let more = DataFrame::new([("sensor", DType::Int64), ("site", DType::String), ("value", DType::Float64)])
        .with_row([Value::Int(13), Value::from("west"), Value::Float(9.0)]);
    let report = session.load("sensor", more).await.unwrap();
    assert_eq!(report, graph_session::LoadReport { path: LoadPath::ClientSide, rows: 1 });
    assert_eq!(session.frame("sensor").unwrap().num_rows(), 4);

    assert!(matches!(session.load("nobody", readings()).await, Err(Error::NotFound(_))));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_object_columns_are_stored_as_text() {
    for transfer in [ClientTransfer::Insert, ClientTransfer::BulkWriter] {
        let server = MemoryServer::new();
        let mut session = open(&server, config().with_client_transfer(transfer)).await;
        let df = DataFrame::new([("id", DType::Int64), ("blob", DType::Object)])
            .with_row([Value::Int(1), Value::Int(5)])
            .with_row([Value::Int(2), Value::from("raw")]);

        let thing = session.vertex("thing", df, "id").await.unwrap();
        assert_eq!(thing.num_rows, 2);
        assert_eq!(
            server.frame_rows("ada", "thing").unwrap(),
            vec![
                vec![Value::Int(1), Value::from("5")],
                vec![Value::Int(2), Value::from("raw")],
            ]
        );
        session.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_rows_that_do_not_fit_the_frame_are_rejected() {
    let server = MemoryServer::new();
    let mut session = open(&server, config()).await;
    session.vertex("sensor", readings(), "sensor").await.unwrap();

    let wrong = DataFrame::new([("sensor", DType::String), ("site", DType::String), ("value", DType::Float64)])
        .with_row([Value::from("ten"), Value::from("west"), Value::Float(9.0)]);
    let err = session.load("sensor", wrong).await.unwrap_err();
    assert!(matches!(err, Error::TypeError { .. }));
    assert_eq!(session.frame("sensor").unwrap().num_rows(), 3);
    session.close().await.unwrap();
}
