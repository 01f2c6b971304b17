//! Parquet output for typed tables.
//!
//! - Mapping from inferred column types to Arrow types
//! - Conversion from tables to Arrow RecordBatches
//! - A Snappy compressed ArrowWriter front end

mod conversion;
mod writer;

pub use conversion::{arrow_type, table_to_record_batch};
pub use writer::write_parquet;
