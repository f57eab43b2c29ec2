//! Core abstractions shared by the copier and the drivers.
//!
//! - [`schema`]: column metadata
//! - [`value`]: rows, values and batches
//! - [`traits`]: source/target seams implemented by the drivers

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::ColumnInfo;
pub use traits::{InsertSession, RowCursor, SourceReader, TargetWriter};
pub use value::{Batch, OpaqueValue, Row, SqlNullType, SqlValue, TimestampZone};
