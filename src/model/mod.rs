//! # Frame Model
//!
//! Plain data that crosses every boundary: session ↔ registry ↔ loader ↔ store.
//!
//! Arrow appears here only at the conversion edges (`schema`, `table`);
//! everything the store sees is `Schema`, `Row` and `Value`.
//! This module is pure data: no I/O, no state, no async.

pub mod value;
pub mod property_map;
pub mod schema;
pub mod frame;
pub mod source;
pub mod table;

pub use value::Value;
pub use property_map::{PropertyMap, params};
pub use schema::{Column, LogicalType, Schema};
pub use frame::{EdgeFrame, Frame, FrameKind, TableFrame, VertexFrame};
pub use source::{DType, DataFrame, DataSource};
pub use table::{Row, TableData, batch_to_rows, conform_rows, rows_to_batch};
