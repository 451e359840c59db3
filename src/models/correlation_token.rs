//! Correlation tokens (TRACKs) returned by producing webservice calls and
//! consumed by later calls in the same filing chain.
//! Maps to `aduana_correlation_tokens`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::constants::ProcessStep;
use crate::state_machine::states::TokenState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CorrelationToken {
    pub id: i64,
    pub token_value: String,
    pub transaction_id: Uuid,
    pub shipment_id: Option<i64>,
    pub container_id: Option<i64>,
    pub bill_of_lading_id: Option<i64>,
    pub produced_by: String,
    pub status: String,
    pub applied_steps: serde_json::Value,
    pub generated_at: NaiveDateTime,
    pub consumed_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCorrelationToken {
    pub token_value: String,
    pub transaction_id: Uuid,
    pub shipment_id: Option<i64>,
    pub container_id: Option<i64>,
    pub bill_of_lading_id: Option<i64>,
    pub produced_by: ProcessStep,
}

const COLUMNS: &str = "id, token_value, transaction_id, shipment_id, container_id, \
                       bill_of_lading_id, produced_by, status, applied_steps, generated_at, \
                       consumed_at, completed_at, created_at, updated_at";

impl CorrelationToken {
    pub fn state(&self) -> TokenState {
        self.status.parse().unwrap_or(TokenState::Error)
    }

    /// Ordered list of consuming steps already applied to this token.
    pub fn applied_steps(&self) -> Vec<ProcessStep> {
        self.applied_steps
            .as_array()
            .map(|steps| {
                steps
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Implicit expiry: a token older than the freshness window must not be
    /// reused even if the sweep has not flipped its status yet.
    pub fn is_stale_at(&self, cutoff: NaiveDateTime) -> bool {
        self.generated_at < cutoff
    }

    pub async fn create(
        pool: &PgPool,
        new: NewCorrelationToken,
    ) -> Result<CorrelationToken, sqlx::Error> {
        sqlx::query_as::<_, CorrelationToken>(&format!(
            "INSERT INTO aduana_correlation_tokens
             (token_value, transaction_id, shipment_id, container_id, bill_of_lading_id,
              produced_by, status)
             VALUES ($1, $2, $3, $4, $5, $6, 'generated')
             RETURNING {COLUMNS}"
        ))
        .bind(&new.token_value)
        .bind(new.transaction_id)
        .bind(new.shipment_id)
        .bind(new.container_id)
        .bind(new.bill_of_lading_id)
        .bind(new.produced_by.to_string())
        .fetch_one(pool)
        .await
    }

    /// Fetch tokens by value, locking the rows when called inside a database
    /// transaction so concurrent consumers serialize.
    pub async fn find_by_values_for_update<'e, E>(
        executor: E,
        values: &[String],
    ) -> Result<Vec<CorrelationToken>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, CorrelationToken>(&format!(
            "SELECT {COLUMNS}
             FROM aduana_correlation_tokens
             WHERE token_value = ANY($1)
             ORDER BY id
             FOR UPDATE"
        ))
        .bind(values)
        .fetch_all(executor)
        .await
    }

    pub async fn find_by_value(
        pool: &PgPool,
        value: &str,
    ) -> Result<Option<CorrelationToken>, sqlx::Error> {
        sqlx::query_as::<_, CorrelationToken>(&format!(
            "SELECT {COLUMNS} FROM aduana_correlation_tokens WHERE token_value = $1"
        ))
        .bind(value)
        .fetch_optional(pool)
        .await
    }

    /// Advance one token after a successful consuming call. Appends the step
    /// to the applied history and completes the token on the chain's final
    /// step. Runs on the caller's executor so it can join an outer
    /// transaction.
    pub async fn mark_consumed<'e, E>(
        executor: E,
        id: i64,
        step: ProcessStep,
        now: NaiveDateTime,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let new_status = if step.is_final() {
            TokenState::Completed
        } else {
            TokenState::Consumed
        };

        sqlx::query(
            "UPDATE aduana_correlation_tokens
             SET status = $2,
                 applied_steps = applied_steps || to_jsonb($3::text),
                 consumed_at = COALESCE(consumed_at, $4),
                 completed_at = CASE WHEN $2 = 'completed' THEN $4 ELSE completed_at END,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(new_status.to_string())
        .bind(step.to_string())
        .bind(now)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Generated tokens still inside the freshness window, optionally scoped
    /// to specific shipments.
    pub async fn available(
        pool: &PgPool,
        shipment_ids: &[i64],
        freshness_cutoff: NaiveDateTime,
    ) -> Result<Vec<CorrelationToken>, sqlx::Error> {
        if shipment_ids.is_empty() {
            sqlx::query_as::<_, CorrelationToken>(&format!(
                "SELECT {COLUMNS}
                 FROM aduana_correlation_tokens
                 WHERE status = 'generated' AND generated_at >= $1
                 ORDER BY id"
            ))
            .bind(freshness_cutoff)
            .fetch_all(pool)
            .await
        } else {
            sqlx::query_as::<_, CorrelationToken>(&format!(
                "SELECT {COLUMNS}
                 FROM aduana_correlation_tokens
                 WHERE status = 'generated' AND generated_at >= $1
                   AND shipment_id = ANY($2)
                 ORDER BY id"
            ))
            .bind(freshness_cutoff)
            .bind(shipment_ids)
            .fetch_all(pool)
            .await
        }
    }

    /// Flip stale generated tokens to `expired`. Run by the cleanup job.
    pub async fn sweep_stale(
        pool: &PgPool,
        freshness_cutoff: NaiveDateTime,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE aduana_correlation_tokens
             SET status = 'expired', updated_at = NOW()
             WHERE status = 'generated' AND generated_at < $1",
        )
        .bind(freshness_cutoff)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_for_transaction(
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> Result<Vec<CorrelationToken>, sqlx::Error> {
        sqlx::query_as::<_, CorrelationToken>(&format!(
            "SELECT {COLUMNS}
             FROM aduana_correlation_tokens
             WHERE transaction_id = $1
             ORDER BY id"
        ))
        .bind(transaction_id)
        .fetch_all(pool)
        .await
    }
}
