//! # gz-optimizer
//!
//! Hyperparameter grids for Gazer.
//!
//! Provides grid descriptors (literal value lists or sampled ranges) and the
//! per-algorithm grid library that the ensembler expands into candidates.

mod library;
mod search;

pub use library::{default_library, AlgorithmSpec, GridEntry, LibraryConfig};
pub use search::{Category, GridDescriptor, Prior};
