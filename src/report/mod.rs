//! Statistics and plots over a finished summary

pub mod counts;
pub mod plot;

pub use counts::column_value_counts;
pub use plot::{PlotOptions, PlotOptionsBuilder, numeric_pairs, scatter_columns, scatter_plot};
