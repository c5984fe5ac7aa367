//! Core domain model: entities, capability ports, error taxonomy, and the
//! chunking implementations.

pub mod chunking;
pub mod error;
pub mod ports;
pub mod types;
