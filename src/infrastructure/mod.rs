//! Infrastructure: path identity, persistent state, file synchronization,
//! and telemetry bootstrap.

pub mod fingerprint;
pub mod snapshot;
pub mod sync;
pub mod telemetry;
