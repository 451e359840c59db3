//! One filing attempt against a customs webservice. Created at send-intent
//! time, mutated through its lifecycle, archived but never deleted.
//! Maps to `aduana_filing_transactions`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::constants::{Country, ProcessStep, WebserviceType};
use crate::state_machine::states::TransactionState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FilingTransaction {
    pub id: Uuid,
    pub organization_id: i64,
    pub initiated_by: Option<String>,
    pub shipment_id: Option<i64>,
    pub voyage_id: Option<i64>,
    pub country: String,
    pub webservice_type: String,
    pub environment: String,
    pub target_url: String,
    pub process_step: Option<String>,
    pub consumes_tokens: serde_json::Value,
    pub status: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_retry_at: Option<NaiveDateTime>,
    pub request_payload: Option<String>,
    pub response_payload: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Option<serde_json::Value>,
    pub is_blocking_error: bool,
    pub confirmation_number: Option<String>,
    pub external_reference: Option<String>,
    pub sent_at: Option<NaiveDateTime>,
    pub response_at: Option<NaiveDateTime>,
    pub response_time_ms: Option<i64>,
    pub requires_manual_review: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFilingTransaction {
    pub organization_id: i64,
    pub initiated_by: Option<String>,
    pub shipment_id: Option<i64>,
    pub voyage_id: Option<i64>,
    pub country: Country,
    pub webservice_type: WebserviceType,
    pub environment: String,
    pub target_url: String,
    pub process_step: Option<ProcessStep>,
    pub consumes_tokens: Vec<String>,
    pub max_retries: i32,
}

const COLUMNS: &str = "id, organization_id, initiated_by, shipment_id, voyage_id, country, \
                       webservice_type, environment, target_url, process_step, consumes_tokens, \
                       status, retry_count, max_retries, \
                       next_retry_at, request_payload, response_payload, error_code, \
                       error_message, error_details, is_blocking_error, confirmation_number, \
                       external_reference, sent_at, response_at, response_time_ms, \
                       requires_manual_review, created_at, updated_at";

impl FilingTransaction {
    pub fn state(&self) -> TransactionState {
        self.status.parse().unwrap_or_default()
    }

    pub fn retries_remaining(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn country_code(&self) -> Option<Country> {
        self.country.parse().ok()
    }

    pub fn webservice(&self) -> Option<WebserviceType> {
        self.webservice_type.parse().ok()
    }

    pub fn step(&self) -> Option<ProcessStep> {
        self.process_step.as_deref().and_then(|s| s.parse().ok())
    }

    /// TRACK values this attempt must consume, as recorded at intent time.
    pub fn tokens_to_consume(&self) -> Vec<String> {
        self.consumes_tokens
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn create(
        pool: &PgPool,
        new: NewFilingTransaction,
    ) -> Result<FilingTransaction, sqlx::Error> {
        sqlx::query_as::<_, FilingTransaction>(&format!(
            "INSERT INTO aduana_filing_transactions
             (id, organization_id, initiated_by, shipment_id, voyage_id, country,
              webservice_type, environment, target_url, process_step, consumes_tokens,
              status, max_retries)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending', $12)
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.organization_id)
        .bind(&new.initiated_by)
        .bind(new.shipment_id)
        .bind(new.voyage_id)
        .bind(new.country.code())
        .bind(new.webservice_type.to_string())
        .bind(&new.environment)
        .bind(&new.target_url)
        .bind(new.process_step.map(|s| s.to_string()))
        .bind(serde_json::json!(new.consumes_tokens))
        .bind(new.max_retries)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<FilingTransaction>, sqlx::Error> {
        sqlx::query_as::<_, FilingTransaction>(&format!(
            "SELECT {COLUMNS} FROM aduana_filing_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_state(
        &mut self,
        pool: &PgPool,
        state: TransactionState,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_filing_transactions
             SET status = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(state.to_string())
        .execute(pool)
        .await?;

        self.status = state.to_string();
        Ok(())
    }

    /// Capture the outbound payload and send timestamp.
    pub async fn record_dispatch(
        &mut self,
        pool: &PgPool,
        payload: &str,
        sent_at: NaiveDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_filing_transactions
             SET request_payload = $2, sent_at = $3, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(payload)
        .bind(sent_at)
        .execute(pool)
        .await?;

        self.request_payload = Some(payload.to_string());
        self.sent_at = Some(sent_at);
        Ok(())
    }

    /// Capture the structured success outcome.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_success(
        &mut self,
        pool: &PgPool,
        response_payload: &str,
        confirmation_number: Option<&str>,
        external_reference: Option<&str>,
        response_at: NaiveDateTime,
        response_time_ms: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_filing_transactions
             SET response_payload = $2, confirmation_number = $3, external_reference = $4,
                 response_at = $5, response_time_ms = $6, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(response_payload)
        .bind(confirmation_number)
        .bind(external_reference)
        .bind(response_at)
        .bind(response_time_ms)
        .execute(pool)
        .await?;

        self.response_payload = Some(response_payload.to_string());
        self.confirmation_number = confirmation_number.map(str::to_string);
        self.external_reference = external_reference.map(str::to_string);
        self.response_at = Some(response_at);
        self.response_time_ms = Some(response_time_ms);
        Ok(())
    }

    /// Capture a classified failure.
    pub async fn record_error(
        &mut self,
        pool: &PgPool,
        error_code: Option<&str>,
        error_message: &str,
        error_details: Option<serde_json::Value>,
        is_blocking: bool,
        requires_manual_review: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_filing_transactions
             SET error_code = $2, error_message = $3, error_details = $4,
                 is_blocking_error = $5, requires_manual_review = $6, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(error_code)
        .bind(error_message)
        .bind(&error_details)
        .bind(is_blocking)
        .bind(requires_manual_review)
        .execute(pool)
        .await?;

        self.error_code = error_code.map(str::to_string);
        self.error_message = Some(error_message.to_string());
        self.error_details = error_details;
        self.is_blocking_error = is_blocking;
        self.requires_manual_review = requires_manual_review;
        Ok(())
    }

    /// Set the retry bookkeeping for the next scheduled attempt.
    pub async fn record_retry_schedule(
        &mut self,
        pool: &PgPool,
        next_retry_at: NaiveDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_filing_transactions
             SET retry_count = retry_count + 1, next_retry_at = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(next_retry_at)
        .execute(pool)
        .await?;

        self.retry_count += 1;
        self.next_retry_at = Some(next_retry_at);
        Ok(())
    }

    /// Clear the schedule once a retry is picked up.
    pub async fn clear_retry_schedule(&mut self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_filing_transactions
             SET next_retry_at = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .execute(pool)
        .await?;

        self.next_retry_at = None;
        Ok(())
    }

    /// Transactions whose scheduled retry is due. Respects the retry budget;
    /// the CHECK constraint is the storage-side backstop.
    pub async fn due_retries(
        pool: &PgPool,
        now: NaiveDateTime,
        limit: i64,
    ) -> Result<Vec<FilingTransaction>, sqlx::Error> {
        sqlx::query_as::<_, FilingTransaction>(&format!(
            "SELECT {COLUMNS}
             FROM aduana_filing_transactions
             WHERE status = 'retry' AND next_retry_at <= $1
               AND retry_count <= max_retries AND NOT is_blocking_error
             ORDER BY next_retry_at ASC
             LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_voyage(
        pool: &PgPool,
        voyage_id: i64,
        country: Country,
        webservice_type: WebserviceType,
    ) -> Result<Vec<FilingTransaction>, sqlx::Error> {
        sqlx::query_as::<_, FilingTransaction>(&format!(
            "SELECT {COLUMNS}
             FROM aduana_filing_transactions
             WHERE voyage_id = $1 AND country = $2 AND webservice_type = $3
             ORDER BY created_at ASC"
        ))
        .bind(voyage_id)
        .bind(country.code())
        .bind(webservice_type.to_string())
        .fetch_all(pool)
        .await
    }
}
