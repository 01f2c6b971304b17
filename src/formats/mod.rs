//! Table model, block parsing and table output formats

pub mod delimited;
pub mod parquet;
pub mod schema;
pub mod table;

pub use delimited::{BlockParser, DelimitedConfig, FieldLayout};
pub use schema::ColumnType;
pub use table::{Column, ParsedTable, Table, Value};
