//! Core data types and I/O operations.

pub mod catalog;
pub mod stats;
pub mod writers;

pub use catalog::{load_catalog, Catalog, LoaderError};
pub use writers::{load_probabilities, write_members, write_probabilities, WriteError};
