//! Voyage-level filing status aggregation. A single (voyage, country,
//! webservice-type) pair may see several transaction attempts before a
//! durable outcome; downstream consumers read this aggregate, never the
//! individual attempts.

use chrono::{NaiveDateTime, Utc};
use sqlx::PgPool;

use crate::config::EngineConfig;
use crate::constants::{Country, WebserviceType};
use crate::error::{AduanaError, Result};
use crate::models::VoyageWebserviceStatus;
use crate::state_machine::states::VoyageFilingState;

pub struct VoyageStatusAggregator {
    pool: PgPool,
    config: EngineConfig,
}

impl VoyageStatusAggregator {
    pub fn new(pool: PgPool, config: EngineConfig) -> Self {
        Self { pool, config }
    }

    /// Existing status row for the triple, or a fresh `pending` one with
    /// `can_send = true`.
    pub async fn get_or_create(
        &self,
        voyage_id: i64,
        country: Country,
        webservice_type: WebserviceType,
    ) -> Result<VoyageWebserviceStatus> {
        Ok(VoyageWebserviceStatus::get_or_create(&self.pool, voyage_id, country, webservice_type).await?)
    }

    pub async fn find(
        &self,
        voyage_id: i64,
        country: Country,
        webservice_type: WebserviceType,
    ) -> Result<Option<VoyageWebserviceStatus>> {
        Ok(VoyageWebserviceStatus::find(&self.pool, voyage_id, country, webservice_type).await?)
    }

    pub async fn mark_sending(&self, status: &mut VoyageWebserviceStatus) -> Result<()> {
        Ok(status.mark_sending(&self.pool).await?)
    }

    pub async fn mark_sent(&self, status: &mut VoyageWebserviceStatus) -> Result<()> {
        Ok(status.mark_sent(&self.pool, Utc::now().naive_utc()).await?)
    }

    pub async fn mark_approved(
        &self,
        status: &mut VoyageWebserviceStatus,
        confirmation_number: Option<&str>,
        external_voyage_number: Option<&str>,
    ) -> Result<()> {
        Ok(status
            .mark_approved(
                &self.pool,
                confirmation_number,
                external_voyage_number,
                Utc::now().naive_utc(),
            )
            .await?)
    }

    pub async fn mark_error(
        &self,
        status: &mut VoyageWebserviceStatus,
        error_code: Option<&str>,
        error_message: &str,
    ) -> Result<()> {
        Ok(status.mark_error(&self.pool, error_code, error_message).await?)
    }

    /// Mirror a transaction's retry schedule at voyage granularity.
    pub async fn schedule_retry(
        &self,
        status: &mut VoyageWebserviceStatus,
        next_retry_at: NaiveDateTime,
    ) -> Result<()> {
        Ok(status.schedule_retry(&self.pool, next_retry_at).await?)
    }

    /// Cancel the filing: no further automatic sends, remote effects remain.
    pub async fn cancel(&self, status: &mut VoyageWebserviceStatus) -> Result<()> {
        if status.state().is_terminal() {
            return Err(AduanaError::StateTransition(format!(
                "voyage status {} is terminal and cannot be cancelled",
                status.status
            )));
        }
        Ok(status.cancel(&self.pool).await?)
    }

    /// Whether an automatic send may proceed for this filing.
    pub fn sendable(status: &VoyageWebserviceStatus) -> bool {
        status.can_send && !status.state().is_terminal()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
