use serde::{Deserialize, Serialize};

/// Events that drive a filing transaction through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FilingEvent {
    /// Begin local checks before any remote call
    Validate,
    /// Local checks passed, start preparing the outbound call
    Dispatch,
    /// Outbound payload handed to the transport
    MarkSent,
    /// Remote authority accepted the filing
    Succeed,
    /// Remote or transport failure with the raw message
    Fail { reason: String },
    /// Queue another attempt after backoff
    ScheduleRetry,
    /// Scheduler re-drives a due retry
    Resend,
    /// Operator cancellation
    Cancel,
    /// Validity window lapsed
    Expire,
}

impl FilingEvent {
    /// Event name recorded in the transaction log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validate => "transaction.validate",
            Self::Dispatch => "transaction.dispatch",
            Self::MarkSent => "transaction.sent",
            Self::Succeed => "transaction.success",
            Self::Fail { .. } => "transaction.error",
            Self::ScheduleRetry => "transaction.retry_scheduled",
            Self::Resend => "transaction.resend",
            Self::Cancel => "transaction.cancelled",
            Self::Expire => "transaction.expired",
        }
    }
}
