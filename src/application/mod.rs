//! Application services: the engine itself and the hybrid query planner.

pub mod context;
pub mod planner;

pub use context::{Context, IndexOptions, ProgressCallback, SearchOptions};
