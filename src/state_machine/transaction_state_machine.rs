use chrono::{NaiveDateTime, Utc};
use serde_json::json;
use sqlx::PgPool;

use super::errors::{StateMachineError, StateMachineResult};
use super::events::FilingEvent;
use super::states::TransactionState;
use crate::config::EngineConfig;
use crate::constants::Severity;
use crate::events::EventPublisher;
use crate::models::{FilingTransaction, NewTransactionEvent, TransactionEvent};

/// State machine for a single filing transaction.
///
/// Owns the legality of status changes and the audit trail; payload and
/// classification columns are written by the dispatcher through the model's
/// `record_*` methods, so a transition never carries data it does not govern.
pub struct TransactionStateMachine {
    transaction: FilingTransaction,
    pool: PgPool,
    config: EngineConfig,
    publisher: EventPublisher,
}

impl TransactionStateMachine {
    pub fn new(
        transaction: FilingTransaction,
        pool: PgPool,
        config: EngineConfig,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            transaction,
            pool,
            config,
            publisher,
        }
    }

    pub fn transaction(&self) -> &FilingTransaction {
        &self.transaction
    }

    pub fn transaction_mut(&mut self) -> &mut FilingTransaction {
        &mut self.transaction
    }

    pub fn into_transaction(self) -> FilingTransaction {
        self.transaction
    }

    pub fn current_state(&self) -> TransactionState {
        self.transaction.state()
    }

    /// Re-read the transaction row, picking up changes made by other workers.
    pub async fn reload(&mut self) -> StateMachineResult<()> {
        let fresh = FilingTransaction::find_by_id(&self.pool, self.transaction.id)
            .await?
            .ok_or_else(|| {
                StateMachineError::Internal(format!(
                    "Transaction {} disappeared",
                    self.transaction.id
                ))
            })?;
        self.transaction = fresh;
        Ok(())
    }

    /// Attempt a transition. Computes the target state, checks guards,
    /// persists the status change, appends the audit event, and publishes.
    pub async fn transition(&mut self, event: FilingEvent) -> StateMachineResult<TransactionState> {
        let now = Utc::now().naive_utc();
        let current = self.current_state();
        let target = target_state(current, &event)?;

        check_guards(&self.transaction, &event, now)?;

        // Retry bookkeeping is part of the transition itself; everything else
        // the dispatcher records through the model.
        match &event {
            FilingEvent::ScheduleRetry => {
                let delay = self.config.backoff_for_attempt(self.transaction.retry_count as u32);
                let next_retry_at = now + chrono::Duration::from_std(delay).map_err(|e| {
                    StateMachineError::Internal(format!("Backoff overflow: {e}"))
                })?;
                self.transaction
                    .record_retry_schedule(&self.pool, next_retry_at)
                    .await?;
            }
            FilingEvent::Resend => {
                self.transaction.clear_retry_schedule(&self.pool).await?;
            }
            _ => {}
        }

        self.transaction.update_state(&self.pool, target).await?;

        let severity = match &event {
            FilingEvent::Fail { .. } => Severity::Error,
            FilingEvent::Cancel | FilingEvent::Expire => Severity::Warning,
            _ => Severity::Info,
        };

        let context = json!({
            "from": current.to_string(),
            "to": target.to_string(),
            "event": event,
            "retry_count": self.transaction.retry_count,
            "next_retry_at": self.transaction.next_retry_at,
        });

        TransactionEvent::append(
            &self.pool,
            NewTransactionEvent {
                transaction_id: self.transaction.id,
                event_name: event.name().to_string(),
                severity,
                context: Some(context.clone()),
            },
        )
        .await?;

        let _ = self.publisher.publish(event.name(), context).await;

        tracing::debug!(
            transaction_id = %self.transaction.id,
            from = %current,
            to = %target,
            "transaction state transition"
        );

        Ok(target)
    }
}

/// Target state for a (state, event) pair. Anything not listed here is an
/// invalid transition.
pub fn target_state(
    current: TransactionState,
    event: &FilingEvent,
) -> StateMachineResult<TransactionState> {
    use FilingEvent as E;
    use TransactionState as S;

    let target = match (current, event) {
        (S::Pending, E::Validate) => S::Validating,
        (S::Validating, E::Dispatch) => S::Sending,
        (S::Sending, E::MarkSent) => S::Sent,
        (S::Sent, E::Succeed) => S::Success,

        // Failures may surface during local checks, while dispatching, or
        // from the remote response.
        (S::Validating, E::Fail { .. }) => S::Error,
        (S::Sending, E::Fail { .. }) => S::Error,
        (S::Sent, E::Fail { .. }) => S::Error,

        (S::Error, E::ScheduleRetry) => S::Retry,
        (S::Retry, E::Resend) => S::Sending,

        (state, E::Cancel) if !state.is_terminal() => S::Cancelled,
        (state, E::Expire) if !state.is_terminal() => S::Expired,

        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.name().to_string(),
            })
        }
    };

    Ok(target)
}

/// Guard conditions checked with the transaction row in hand.
pub fn check_guards(
    transaction: &FilingTransaction,
    event: &FilingEvent,
    now: NaiveDateTime,
) -> StateMachineResult<()> {
    match event {
        FilingEvent::ScheduleRetry => {
            if transaction.is_blocking_error {
                return Err(StateMachineError::BlockingError);
            }
            if !transaction.retries_remaining() {
                return Err(StateMachineError::RetriesExhausted {
                    retry_count: transaction.retry_count,
                    max_retries: transaction.max_retries,
                });
            }
        }
        FilingEvent::Resend => match transaction.next_retry_at {
            Some(due) if due <= now => {}
            Some(due) => {
                return Err(StateMachineError::GuardFailed {
                    reason: format!("retry not due until {due}"),
                })
            }
            None => {
                return Err(StateMachineError::GuardFailed {
                    reason: "no retry scheduled".to_string(),
                })
            }
        },
        _ => {}
    }

    Ok(())
}
