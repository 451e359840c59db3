//! Data layer: one module per persisted table, `FromRow` structs with
//! `New*` companions and async query methods taking `&PgPool`.

pub mod correlation_token;
pub mod error_catalog;
pub mod filing_transaction;
pub mod session_credential;
pub mod transaction_event;
pub mod voyage_status;

pub use correlation_token::{CorrelationToken, NewCorrelationToken};
pub use error_catalog::{ErrorCatalogEntry, NewErrorCatalogEntry};
pub use filing_transaction::{FilingTransaction, NewFilingTransaction};
pub use session_credential::{NewSessionCredential, SessionCredential, SessionIdentity};
pub use transaction_event::{NewTransactionEvent, TransactionEvent};
pub use voyage_status::VoyageWebserviceStatus;
