//! Input/output helpers.
//!
//! - CSV snapshot ingest + validation (`ingest`)
//! - prediction exports (CSV) (`export`)
//! - comparison report JSON (`report_file`)

pub mod export;
pub mod ingest;
pub mod report_file;

pub use export::*;
pub use ingest::*;
pub use report_file::*;
