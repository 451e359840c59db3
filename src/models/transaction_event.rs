//! Append-only event stream per transaction, for audit and alerting.
//! Rows are never updated or deleted. Maps to `aduana_transaction_events`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::constants::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TransactionEvent {
    pub id: i64,
    pub transaction_id: Uuid,
    pub event_name: String,
    pub severity: String,
    pub context: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransactionEvent {
    pub transaction_id: Uuid,
    pub event_name: String,
    pub severity: Severity,
    pub context: Option<serde_json::Value>,
}

impl TransactionEvent {
    pub async fn append(
        pool: &PgPool,
        new: NewTransactionEvent,
    ) -> Result<TransactionEvent, sqlx::Error> {
        sqlx::query_as::<_, TransactionEvent>(
            "INSERT INTO aduana_transaction_events (transaction_id, event_name, severity, context)
             VALUES ($1, $2, $3, $4)
             RETURNING id, transaction_id, event_name, severity, context, created_at",
        )
        .bind(new.transaction_id)
        .bind(&new.event_name)
        .bind(new.severity.to_string())
        .bind(&new.context)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_transaction(
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> Result<Vec<TransactionEvent>, sqlx::Error> {
        sqlx::query_as::<_, TransactionEvent>(
            "SELECT id, transaction_id, event_name, severity, context, created_at
             FROM aduana_transaction_events
             WHERE transaction_id = $1
             ORDER BY id",
        )
        .bind(transaction_id)
        .fetch_all(pool)
        .await
    }
}
