//! Filing engine: orchestrates one customs filing end to end and runs the
//! periodic retry/cleanup passes. Payload construction and the SOAP wire
//! format live behind the collaborator traits in [`types`].

pub mod dispatcher;
pub mod scheduler;
pub mod types;

pub use dispatcher::FilingDispatcher;
pub use scheduler::{MaintenanceScheduler, RetryTickSummary, SweepSummary};
pub use types::{
    EngineError, FilingOutcome, FilingRequest, Notifier, ParsedResponse, RequestBuilder,
    ResponseParser, Transport, WireResponse,
};
