//! TRACK correlation: tokens returned by a producing webservice call are
//! recorded here and handed to later, dependent calls in the same filing
//! chain with strict ordering and all-or-nothing consumption.

pub mod tracker;

pub use tracker::{CorrelationError, DomainLinkage, TrackTracker};
