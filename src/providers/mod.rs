//! Concrete provider implementations behind the domain ports.

pub mod embedding;
pub mod vector_store;
