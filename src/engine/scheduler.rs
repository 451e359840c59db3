//! Periodic maintenance: re-driving due retries and sweeping stale session
//! credentials and correlation tokens. The host application owns the timer;
//! each tick is a single bounded pass.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::dispatcher::FilingDispatcher;
use super::types::EngineError;
use crate::models::FilingTransaction;

/// Outcome of one retry pass.
#[derive(Debug, Default)]
pub struct RetryTickSummary {
    pub picked_up: usize,
    pub succeeded: usize,
    pub rescheduled: usize,
    pub settled_error: usize,
    /// Transactions whose re-drive itself failed, with the failure text.
    pub failures: Vec<(Uuid, String)>,
}

/// Outcome of one cleanup pass.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub expired_credentials: u64,
    pub stale_tokens: u64,
}

pub struct MaintenanceScheduler {
    pool: PgPool,
    dispatcher: Arc<FilingDispatcher>,
    retry_batch_size: i64,
}

impl MaintenanceScheduler {
    pub fn new(pool: PgPool, dispatcher: Arc<FilingDispatcher>, retry_batch_size: i64) -> Self {
        Self {
            pool,
            dispatcher,
            retry_batch_size,
        }
    }

    /// Pick up transactions whose scheduled retry is due and re-drive them.
    /// A failure while re-driving one transaction is recorded in the summary
    /// and does not stop the pass.
    pub async fn tick_retries(&self, now: NaiveDateTime) -> Result<RetryTickSummary, EngineError> {
        let due = FilingTransaction::due_retries(&self.pool, now, self.retry_batch_size).await?;

        let mut summary = RetryTickSummary {
            picked_up: due.len(),
            ..RetryTickSummary::default()
        };

        for transaction in due {
            let id = transaction.id;
            match self.dispatcher.resend(transaction).await {
                Ok(outcome) if outcome.succeeded() => summary.succeeded += 1,
                Ok(outcome) => {
                    use crate::state_machine::TransactionState as S;
                    match outcome.state {
                        S::Retry => summary.rescheduled += 1,
                        _ => summary.settled_error += 1,
                    }
                }
                Err(err) => {
                    tracing::error!(transaction_id = %id, error = %err, "retry re-drive failed");
                    summary.failures.push((id, err.to_string()));
                }
            }
        }

        if summary.picked_up > 0 {
            tracing::info!(
                picked_up = summary.picked_up,
                succeeded = summary.succeeded,
                rescheduled = summary.rescheduled,
                settled_error = summary.settled_error,
                failed = summary.failures.len(),
                "retry tick"
            );
        }

        Ok(summary)
    }

    /// Expire stale session credentials and correlation tokens.
    pub async fn sweep(&self, now: NaiveDateTime) -> Result<SweepSummary, EngineError> {
        let expired_credentials = self.dispatcher.session_cache().sweep_expired(now).await?;
        let stale_tokens = self.dispatcher.tracker().sweep_stale(now).await?;

        Ok(SweepSummary {
            expired_credentials,
            stale_tokens,
        })
    }

    /// Convenience wrapper for hosts that tick on wall-clock time.
    pub async fn run_once(&self) -> Result<(RetryTickSummary, SweepSummary), EngineError> {
        let now = Utc::now().naive_utc();
        let retries = self.tick_retries(now).await?;
        let sweep = self.sweep(now).await?;
        Ok((retries, sweep))
    }
}
