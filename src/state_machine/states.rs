use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a single filing attempt against a customs webservice.
///
/// `pending → validating → sending → sent → success | error`, with
/// `error → retry → sending` forming the retry cycle. `cancelled` and
/// `expired` are externally-triggered terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// Initial state at send-intent time
    Pending,
    /// Local checks before any remote call
    Validating,
    /// Outbound payload is being prepared/dispatched
    Sending,
    /// Payload handed to the transport, awaiting response handling
    Sent,
    /// Remote authority accepted the filing
    Success,
    /// Remote or transport failure, classified against the catalog
    Error,
    /// Scheduled for a later attempt
    Retry,
    /// Cancelled by an operator
    Cancelled,
    /// Abandoned after its validity window lapsed
    Expired,
}

impl TransactionState {
    /// Unconditionally terminal states. `Error` is terminal only once the
    /// retry budget is exhausted or the error is blocking, which the guard
    /// logic decides with transaction data in hand.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Cancelled | Self::Expired)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// States from which a retry may legally be scheduled or re-driven.
    pub fn is_retry_eligible(&self) -> bool {
        matches!(self, Self::Error | Self::Retry)
    }
}

impl Default for TransactionState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Validating => write!(f, "validating"),
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Retry => write!(f, "retry"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for TransactionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "validating" => Ok(Self::Validating),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "retry" => Ok(Self::Retry),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid transaction state: {s}")),
        }
    }
}

/// Aggregate state of one (voyage, country, webservice-type) filing,
/// decoupled from the possibly-many underlying transaction attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoyageFilingState {
    Pending,
    Sending,
    Sent,
    Approved,
    Error,
    Retry,
    Cancelled,
    Expired,
}

impl VoyageFilingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Cancelled | Self::Expired)
    }
}

impl Default for VoyageFilingState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for VoyageFilingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Approved => write!(f, "approved"),
            Self::Error => write!(f, "error"),
            Self::Retry => write!(f, "retry"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for VoyageFilingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "approved" => Ok(Self::Approved),
            "error" => Ok(Self::Error),
            "retry" => Ok(Self::Retry),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid voyage filing state: {s}")),
        }
    }
}

/// Lifecycle states of a correlation token (TRACK).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Returned by a producing call, not yet consumed
    Generated,
    /// Consumed by at least one dependent call
    Consumed,
    /// Consumed by the final step of the chain
    Completed,
    /// Aged past the freshness window without full consumption
    Expired,
    /// Invalidated after a remote-side inconsistency
    Error,
}

impl TokenState {
    /// Whether a dependent call may still consume this token.
    pub fn is_consumable(&self) -> bool {
        matches!(self, Self::Generated | Self::Consumed)
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated => write!(f, "generated"),
            Self::Consumed => write!(f, "consumed"),
            Self::Completed => write!(f, "completed"),
            Self::Expired => write!(f, "expired"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for TokenState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(Self::Generated),
            "consumed" => Ok(Self::Consumed),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid token state: {s}")),
        }
    }
}

/// Lifecycle states of a cached session credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Active,
    Expired,
    Revoked,
    Error,
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::Revoked => write!(f, "revoked"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for CredentialState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid credential state: {s}")),
        }
    }
}
