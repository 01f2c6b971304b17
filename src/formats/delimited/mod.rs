//! Delimited text: block parsing and table output

pub mod parser;
pub mod writer;

pub use parser::{BlockParser, DelimitedConfig, FieldLayout};
pub use writer::{to_csv_string, write_delimited};
