#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Aduana Core
//!
//! Integration engine for filing river and maritime cargo manifests with the
//! customs webservices of Argentina (AFIP) and Paraguay (DNA).
//!
//! ## Overview
//!
//! Sending a manifest to a customs authority is a multi-call conversation:
//! authenticate, register shipment titles, register the MIC/DTA, register the
//! convoy, each call consuming correlation tokens (TRACKs) produced by the
//! previous one. This crate owns the reliability layer of that conversation:
//! cached authentication sessions, a persisted per-attempt state machine with
//! bounded retries, all-or-nothing TRACK consumption, a pattern-matched error
//! catalog, and a voyage-level status aggregate that downstream consumers can
//! read without understanding individual attempts.
//!
//! Payload construction and the SOAP wire format are deliberately outside the
//! engine; hosts plug them in through the collaborator traits in [`engine`].
//!
//! ## Module Organization
//!
//! - [`engine`] - Filing dispatcher, maintenance scheduler, collaborator traits
//! - [`session`] - WSAA-style credential cache, one active session per identity
//! - [`state_machine`] - Transaction lifecycle with guarded transitions
//! - [`correlation`] - TRACK token chains with strict consumption ordering
//! - [`catalog`] - Wildcard-pattern error catalog, classification, alerting
//! - [`aggregator`] - One status per (voyage, country, webservice-type)
//! - [`models`] - Data layer over PostgreSQL via SQLx
//! - [`events`] - In-process broadcast of lifecycle events
//! - [`database`] - Pool construction and embedded migrations
//! - [`config`] - Engine tuning knobs, environment-variable overrides
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aduana_core::config::EngineConfig;
//! use aduana_core::database::DatabaseConnection;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_env();
//! let db = DatabaseConnection::new().await?;
//! aduana_core::database::run_migrations(db.pool()).await?;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod correlation;
pub mod database;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod session;
pub mod state_machine;

pub use aggregator::VoyageStatusAggregator;
pub use catalog::{Classification, ErrorClassifier};
pub use config::EngineConfig;
pub use constants::{Country, ErrorCategory, ProcessStep, Severity, WebserviceType};
pub use correlation::{CorrelationError, TrackTracker};
pub use database::DatabaseConnection;
pub use engine::{
    EngineError, FilingDispatcher, FilingOutcome, FilingRequest, MaintenanceScheduler,
};
pub use error::{AduanaError, Result};
pub use events::{AlertEvent, EventPublisher, PublishedEvent};
pub use models::{FilingTransaction, SessionCredential, VoyageWebserviceStatus};
pub use session::{Authenticator, SessionCache, SessionError};
pub use state_machine::{FilingEvent, TransactionState, TransactionStateMachine};
