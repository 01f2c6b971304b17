// Public API - the runner and the types it is configured with
pub mod config;
pub mod coordination;
pub mod error;
pub mod runner;

// Internal modules - organized by subsystem
mod formats;
mod io;
mod report;
mod sink;
mod telemetry;
