//! Error classification against the curated catalog of known remote error
//! signatures.

pub mod classifier;
pub mod seed;

pub use classifier::{Classification, ErrorClassifier};
