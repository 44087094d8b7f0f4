//! Data sources.
//!
//! - `source`: cached snapshot, optional remote fetcher seam, cache fallback
//! - `synthetic`: seeded simulated snapshots with a known truth

pub mod source;
pub mod synthetic;

pub use source::*;
pub use synthetic::*;
