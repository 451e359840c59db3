//! Aggregate filing status per (voyage, country, webservice-type). This is
//! the externally visible "is this filing done" signal, decoupled from the
//! individual transaction attempts underneath it.
//! Maps to `aduana_voyage_webservice_statuses`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::constants::{Country, WebserviceType};
use crate::state_machine::states::VoyageFilingState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VoyageWebserviceStatus {
    pub id: i64,
    pub voyage_id: i64,
    pub country: String,
    pub webservice_type: String,
    pub status: String,
    pub can_send: bool,
    pub is_required: bool,
    pub retry_count: i32,
    pub next_retry_at: Option<NaiveDateTime>,
    pub confirmation_number: Option<String>,
    pub external_voyage_number: Option<String>,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
    pub first_sent_at: Option<NaiveDateTime>,
    pub last_sent_at: Option<NaiveDateTime>,
    pub approved_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

const COLUMNS: &str = "id, voyage_id, country, webservice_type, status, can_send, is_required, \
                       retry_count, next_retry_at, confirmation_number, external_voyage_number, \
                       last_error_code, last_error_message, first_sent_at, last_sent_at, \
                       approved_at, expires_at, created_at, updated_at";

impl VoyageWebserviceStatus {
    pub fn state(&self) -> VoyageFilingState {
        self.status.parse().unwrap_or_default()
    }

    /// Return the status row for the triple, creating it in `pending` with
    /// `can_send = true` when missing. Concurrent creators race safely on the
    /// unique constraint via `ON CONFLICT`.
    pub async fn get_or_create(
        pool: &PgPool,
        voyage_id: i64,
        country: Country,
        webservice_type: WebserviceType,
    ) -> Result<VoyageWebserviceStatus, sqlx::Error> {
        sqlx::query_as::<_, VoyageWebserviceStatus>(&format!(
            "INSERT INTO aduana_voyage_webservice_statuses (voyage_id, country, webservice_type)
             VALUES ($1, $2, $3)
             ON CONFLICT (voyage_id, country, webservice_type)
             DO UPDATE SET updated_at = aduana_voyage_webservice_statuses.updated_at
             RETURNING {COLUMNS}"
        ))
        .bind(voyage_id)
        .bind(country.code())
        .bind(webservice_type.to_string())
        .fetch_one(pool)
        .await
    }

    pub async fn find(
        pool: &PgPool,
        voyage_id: i64,
        country: Country,
        webservice_type: WebserviceType,
    ) -> Result<Option<VoyageWebserviceStatus>, sqlx::Error> {
        sqlx::query_as::<_, VoyageWebserviceStatus>(&format!(
            "SELECT {COLUMNS}
             FROM aduana_voyage_webservice_statuses
             WHERE voyage_id = $1 AND country = $2 AND webservice_type = $3"
        ))
        .bind(voyage_id)
        .bind(country.code())
        .bind(webservice_type.to_string())
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_voyage(
        pool: &PgPool,
        voyage_id: i64,
    ) -> Result<Vec<VoyageWebserviceStatus>, sqlx::Error> {
        sqlx::query_as::<_, VoyageWebserviceStatus>(&format!(
            "SELECT {COLUMNS}
             FROM aduana_voyage_webservice_statuses
             WHERE voyage_id = $1
             ORDER BY country, webservice_type"
        ))
        .bind(voyage_id)
        .fetch_all(pool)
        .await
    }

    pub async fn mark_sending(&mut self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_voyage_webservice_statuses
             SET status = 'sending', updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .execute(pool)
        .await?;

        self.status = VoyageFilingState::Sending.to_string();
        Ok(())
    }

    pub async fn mark_sent(&mut self, pool: &PgPool, now: NaiveDateTime) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_voyage_webservice_statuses
             SET status = 'sent',
                 first_sent_at = COALESCE(first_sent_at, $2),
                 last_sent_at = $2,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(now)
        .execute(pool)
        .await?;

        self.status = VoyageFilingState::Sent.to_string();
        if self.first_sent_at.is_none() {
            self.first_sent_at = Some(now);
        }
        self.last_sent_at = Some(now);
        Ok(())
    }

    pub async fn mark_approved(
        &mut self,
        pool: &PgPool,
        confirmation_number: Option<&str>,
        external_voyage_number: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_voyage_webservice_statuses
             SET status = 'approved', confirmation_number = $2, external_voyage_number = $3,
                 approved_at = $4, last_error_code = NULL, last_error_message = NULL,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(confirmation_number)
        .bind(external_voyage_number)
        .bind(now)
        .execute(pool)
        .await?;

        self.status = VoyageFilingState::Approved.to_string();
        self.confirmation_number = confirmation_number.map(str::to_string);
        self.external_voyage_number = external_voyage_number.map(str::to_string);
        self.approved_at = Some(now);
        self.last_error_code = None;
        self.last_error_message = None;
        Ok(())
    }

    pub async fn mark_error(
        &mut self,
        pool: &PgPool,
        error_code: Option<&str>,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_voyage_webservice_statuses
             SET status = 'error', last_error_code = $2, last_error_message = $3,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(error_code)
        .bind(error_message)
        .execute(pool)
        .await?;

        self.status = VoyageFilingState::Error.to_string();
        self.last_error_code = error_code.map(str::to_string);
        self.last_error_message = Some(error_message.to_string());
        Ok(())
    }

    pub async fn schedule_retry(
        &mut self,
        pool: &PgPool,
        next_retry_at: NaiveDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_voyage_webservice_statuses
             SET status = 'retry', retry_count = retry_count + 1, next_retry_at = $2,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(next_retry_at)
        .execute(pool)
        .await?;

        self.status = VoyageFilingState::Retry.to_string();
        self.retry_count += 1;
        self.next_retry_at = Some(next_retry_at);
        Ok(())
    }

    /// Cancellation suppresses further automatic sends but does not roll
    /// back remote-side effects.
    pub async fn cancel(&mut self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_voyage_webservice_statuses
             SET status = 'cancelled', can_send = FALSE, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .execute(pool)
        .await?;

        self.status = VoyageFilingState::Cancelled.to_string();
        self.can_send = false;
        Ok(())
    }
}
