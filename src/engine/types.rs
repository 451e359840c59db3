//! Collaborator traits and exchange types at the engine boundary. Payload
//! construction, the wire protocol, and response parsing are external; the
//! engine owns orchestration, state, and retry/caching policy only.

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::Classification;
use crate::constants::{Country, ProcessStep, WebserviceType};
use crate::correlation::CorrelationError;
use crate::models::{FilingTransaction, SessionCredential};
use crate::session::SessionError;
use crate::state_machine::{StateMachineError, TransactionState};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Voyage {voyage_id} {country}/{webservice_type} is not sendable: {reason}")]
    NotSendable {
        voyage_id: i64,
        country: Country,
        webservice_type: WebserviceType,
        reason: String,
    },

    #[error("Request build failed: {0}")]
    Build(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Remote call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Response parse failed: {0}")]
    Parse(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    #[error(transparent)]
    Core(#[from] crate::error::AduanaError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(uuid::Uuid),
}

/// Intent to send one filing for a voyage.
#[derive(Debug, Clone)]
pub struct FilingRequest {
    pub organization_id: i64,
    pub initiated_by: Option<String>,
    pub voyage_id: i64,
    pub shipment_id: Option<i64>,
    pub country: Country,
    pub webservice_type: WebserviceType,
    pub environment: String,
    pub target_url: String,
    /// Chain call this attempt performs, when the filing participates in a
    /// TRACK chain.
    pub process_step: Option<ProcessStep>,
    /// TRACK values the call depends on; consumed on success.
    pub consume_tokens: Vec<String>,
}

/// Raw response handed back by the transport collaborator.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub body: Vec<u8>,
    pub http_status: u16,
    pub headers: Vec<(String, String)>,
}

/// Structured interpretation of a response, produced by the parser
/// collaborator.
#[derive(Debug, Clone)]
pub enum ParsedResponse {
    Accepted {
        confirmation_number: Option<String>,
        external_reference: Option<String>,
        tracks: Vec<String>,
    },
    Rejected {
        error_code: Option<String>,
        message: String,
    },
}

/// Builds a ready-to-send payload for a filing. Wire-level XML is out of
/// engine scope.
#[async_trait]
pub trait RequestBuilder: Send + Sync {
    async fn build_request(&self, request: &FilingRequest) -> Result<Vec<u8>, EngineError>;
}

/// Performs the network call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        action: &str,
        payload: &[u8],
        credential: &SessionCredential,
    ) -> Result<WireResponse, EngineError>;
}

/// Extracts confirmation numbers, TRACKs, and error indicators from raw
/// response bytes.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, raw: &WireResponse) -> Result<ParsedResponse, EngineError>;
}

/// Out-of-band alert delivery (email, messaging).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &crate::events::AlertEvent) -> Result<(), EngineError>;
}

/// Summary of one driven filing attempt.
#[derive(Debug)]
pub struct FilingOutcome {
    pub transaction: FilingTransaction,
    pub state: TransactionState,
    pub confirmation_number: Option<String>,
    pub tracks_recorded: Vec<String>,
    /// Present when the attempt failed and was classified.
    pub classification: Option<Classification>,
}

impl FilingOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == TransactionState::Success
    }
}
