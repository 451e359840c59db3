use chrono::{NaiveDateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::ProcessStep;
use crate::models::{CorrelationToken, NewCorrelationToken};
use crate::state_machine::states::TokenState;

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("Token {value} not found")]
    NotFound { value: String },

    #[error("Token {value} is {status} and cannot be consumed")]
    NotConsumable { value: String, status: String },

    #[error("Token {value} already consumed at step {step}")]
    AlreadyConsumed { value: String, step: String },

    #[error("Token {value} cannot skip to step {requested}; next step is {expected}")]
    OutOfOrder {
        value: String,
        requested: String,
        expected: String,
    },

    #[error("Token {value} exceeded the freshness window and is expired")]
    Stale { value: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Optional links from a token back to the domain objects it covers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainLinkage {
    pub shipment_id: Option<i64>,
    pub container_id: Option<i64>,
    pub bill_of_lading_id: Option<i64>,
}

/// Records and advances correlation tokens through the filing chain.
pub struct TrackTracker {
    pool: PgPool,
    config: EngineConfig,
}

impl TrackTracker {
    pub fn new(pool: PgPool, config: EngineConfig) -> Self {
        Self { pool, config }
    }

    fn freshness_cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now - chrono::Duration::from_std(self.config.track_freshness)
            .unwrap_or_else(|_| chrono::Duration::hours(24))
    }

    /// Persist tokens returned by a producing call.
    pub async fn record(
        &self,
        transaction_id: Uuid,
        produced_by: ProcessStep,
        values: &[String],
        linkage: DomainLinkage,
    ) -> Result<Vec<CorrelationToken>, CorrelationError> {
        let mut recorded = Vec::with_capacity(values.len());
        for value in values {
            let token = CorrelationToken::create(
                &self.pool,
                NewCorrelationToken {
                    token_value: value.clone(),
                    transaction_id,
                    shipment_id: linkage.shipment_id,
                    container_id: linkage.container_id,
                    bill_of_lading_id: linkage.bill_of_lading_id,
                    produced_by,
                },
            )
            .await?;
            recorded.push(token);
        }

        tracing::info!(
            transaction_id = %transaction_id,
            produced_by = %produced_by,
            count = recorded.len(),
            "recorded correlation tokens"
        );

        Ok(recorded)
    }

    /// Consume a set of tokens at `step`, all-or-nothing.
    ///
    /// Every token is validated first (present, consumable, fresh, and `step`
    /// is strictly the next consuming step for it); if any fails, nothing is
    /// mutated. Validation and mutation run inside one database transaction
    /// with the rows locked, so concurrent consumers serialize.
    pub async fn consume(
        &self,
        values: &[String],
        step: ProcessStep,
    ) -> Result<Vec<CorrelationToken>, CorrelationError> {
        let now = Utc::now().naive_utc();
        let cutoff = self.freshness_cutoff(now);

        let mut tx = self.pool.begin().await?;
        let tokens = CorrelationToken::find_by_values_for_update(&mut *tx, values).await?;

        for value in values {
            if !tokens.iter().any(|t| &t.token_value == value) {
                return Err(CorrelationError::NotFound {
                    value: value.clone(),
                });
            }
        }

        for token in &tokens {
            validate_consumption(token, step, cutoff)?;
        }

        for token in &tokens {
            CorrelationToken::mark_consumed(&mut *tx, token.id, step, now).await?;
        }
        tx.commit().await?;

        tracing::info!(step = %step, count = tokens.len(), "consumed correlation tokens");

        // Return the advanced rows.
        let mut refreshed = Vec::with_capacity(tokens.len());
        for token in tokens {
            if let Some(current) = CorrelationToken::find_by_value(&self.pool, &token.token_value).await? {
                refreshed.push(current);
            }
        }
        Ok(refreshed)
    }

    /// Tokens in `generated` state ready for consumption at `step`, scoped
    /// to the supplied shipment ids. Tokens past the freshness window are
    /// excluded even when the sweep has not flipped them yet.
    pub async fn available_for(
        &self,
        step: ProcessStep,
        shipment_ids: &[i64],
    ) -> Result<Vec<CorrelationToken>, CorrelationError> {
        let now = Utc::now().naive_utc();
        let candidates =
            CorrelationToken::available(&self.pool, shipment_ids, self.freshness_cutoff(now))
                .await?;
        Ok(candidates
            .into_iter()
            .filter(|token| {
                let producing_order = token
                    .produced_by
                    .parse::<ProcessStep>()
                    .map(|s| s.order())
                    .unwrap_or(0);
                step.order() == producing_order + 1
            })
            .collect())
    }

    /// Flip stale generated tokens to `expired`. Run by the cleanup job.
    pub async fn sweep_stale(&self, now: NaiveDateTime) -> Result<u64, CorrelationError> {
        let swept = CorrelationToken::sweep_stale(&self.pool, self.freshness_cutoff(now)).await?;
        if swept > 0 {
            tracing::info!(swept, "expired stale correlation tokens");
        }
        Ok(swept)
    }
}

/// Validation for consuming one token at `step`. The chain is strictly
/// linear: a token may only advance to the step immediately after the last
/// one applied to it, and never to a step at or before one already applied.
pub fn validate_consumption(
    token: &CorrelationToken,
    step: ProcessStep,
    freshness_cutoff: NaiveDateTime,
) -> Result<(), CorrelationError> {
    if !token.state().is_consumable() {
        return Err(CorrelationError::NotConsumable {
            value: token.token_value.clone(),
            status: token.status.clone(),
        });
    }

    if token.status.parse::<TokenState>() == Ok(TokenState::Generated)
        && token.is_stale_at(freshness_cutoff)
    {
        return Err(CorrelationError::Stale {
            value: token.token_value.clone(),
        });
    }

    let applied = token.applied_steps();
    if let Some(last) = applied.last() {
        if step.order() <= last.order() {
            return Err(CorrelationError::AlreadyConsumed {
                value: token.token_value.clone(),
                step: step.to_string(),
            });
        }
    }

    let producing_order = token
        .produced_by
        .parse::<ProcessStep>()
        .map(|s| s.order())
        .unwrap_or(0);
    let expected_order = applied.last().map(|s| s.order() + 1).unwrap_or(producing_order + 1);

    if step.order() != expected_order {
        let expected = match expected_order {
            1 => ProcessStep::RegistrarMicDta,
            2 => ProcessStep::RegistrarConvoy,
            _ => ProcessStep::RegistrarTitEnvios,
        };
        return Err(CorrelationError::OutOfOrder {
            value: token.token_value.clone(),
            requested: step.to_string(),
            expected: expected.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn token(status: &str, applied: serde_json::Value, age_hours: i64) -> CorrelationToken {
        let now = Utc::now().naive_utc();
        CorrelationToken {
            id: 1,
            token_value: "T1".to_string(),
            transaction_id: Uuid::new_v4(),
            shipment_id: Some(5),
            container_id: None,
            bill_of_lading_id: None,
            produced_by: "registrar_tit_envios".to_string(),
            status: status.to_string(),
            applied_steps: applied,
            generated_at: now - Duration::hours(age_hours),
            consumed_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn cutoff() -> NaiveDateTime {
        Utc::now().naive_utc() - Duration::hours(24)
    }

    #[test]
    fn test_fresh_generated_token_consumable_at_next_step() {
        let t = token("generated", json!([]), 1);
        assert!(validate_consumption(&t, ProcessStep::RegistrarMicDta, cutoff()).is_ok());
    }

    #[test]
    fn test_cannot_skip_an_intermediate_step() {
        let t = token("generated", json!([]), 1);
        let err = validate_consumption(&t, ProcessStep::RegistrarConvoy, cutoff()).unwrap_err();
        assert!(matches!(err, CorrelationError::OutOfOrder { .. }));
    }

    #[test]
    fn test_reconsumption_at_same_step_rejected() {
        let t = token("consumed", json!(["registrar_micdta"]), 1);
        let err = validate_consumption(&t, ProcessStep::RegistrarMicDta, cutoff()).unwrap_err();
        assert!(matches!(err, CorrelationError::AlreadyConsumed { .. }));
    }

    #[test]
    fn test_consumed_token_advances_to_following_step() {
        let t = token("consumed", json!(["registrar_micdta"]), 1);
        assert!(validate_consumption(&t, ProcessStep::RegistrarConvoy, cutoff()).is_ok());
    }

    #[test]
    fn test_stale_generated_token_rejected() {
        let t = token("generated", json!([]), 25);
        let err = validate_consumption(&t, ProcessStep::RegistrarMicDta, cutoff()).unwrap_err();
        assert!(matches!(err, CorrelationError::Stale { .. }));
    }

    #[test]
    fn test_terminal_statuses_not_consumable() {
        for status in ["completed", "expired", "error"] {
            let t = token(status, json!([]), 1);
            let err = validate_consumption(&t, ProcessStep::RegistrarMicDta, cutoff()).unwrap_err();
            assert!(matches!(err, CorrelationError::NotConsumable { .. }), "{status}");
        }
    }
}
