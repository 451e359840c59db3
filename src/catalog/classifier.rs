use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::{Country, ErrorCategory, WebserviceType};
use crate::events::{AlertEvent, EventPublisher};
use crate::models::error_catalog::matches_pattern;
use crate::models::{ErrorCatalogEntry, NewTransactionEvent, TransactionEvent};

/// Outcome of classifying a raw remote error message.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Matched catalog entry, if any. `None` means the error is uncataloged
    /// and should be surfaced for curation.
    pub entry: Option<ErrorCatalogEntry>,
    pub raw_message: String,
    /// Alert raised by this match (frequency threshold crossed or the entry
    /// demands immediate notification).
    pub alert: Option<AlertEvent>,
}

impl Classification {
    /// The catalog is the single source of truth for retryability.
    /// Uncataloged errors default to the category's conservative policy.
    pub fn is_retryable(&self) -> bool {
        match &self.entry {
            Some(entry) => entry.is_retryable && !entry.is_blocking,
            None => ErrorCategory::Unknown.default_retryable(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.entry.as_ref().is_some_and(|e| e.is_blocking)
    }

    pub fn category(&self) -> ErrorCategory {
        self.entry
            .as_ref()
            .map(ErrorCatalogEntry::category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    pub fn error_code(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.error_code.as_str())
    }

    /// Structured details stored on the transaction alongside the raw text.
    pub fn details(&self) -> serde_json::Value {
        match &self.entry {
            Some(entry) => json!({
                "catalog_entry_id": entry.id,
                "title": entry.title,
                "category": entry.category,
                "severity": entry.severity,
                "remediation": entry.remediation,
            }),
            None => json!({
                "uncataloged": true,
                "note": "no catalog entry matched; consider adding one",
            }),
        }
    }
}

/// Matches raw remote errors against the catalog, maintains the frequency
/// counters, and raises alert events.
pub struct ErrorClassifier {
    pool: PgPool,
    config: EngineConfig,
    publisher: EventPublisher,
}

impl ErrorClassifier {
    pub fn new(pool: PgPool, config: EngineConfig, publisher: EventPublisher) -> Self {
        Self {
            pool,
            config,
            publisher,
        }
    }

    /// Classify a raw error message. The first active, non-deprecated entry
    /// whose pattern matches (case-insensitively) wins; the match bumps the
    /// entry's frequency and seen timestamps.
    pub async fn classify(
        &self,
        country: Country,
        webservice_type: WebserviceType,
        raw_message: &str,
        transaction_id: Option<Uuid>,
    ) -> Result<Classification, sqlx::Error> {
        let now = Utc::now().naive_utc();
        let candidates = ErrorCatalogEntry::candidates(&self.pool, country, webservice_type).await?;

        let matched = candidates
            .into_iter()
            .find(|entry| matches_pattern(&entry.message_pattern, raw_message));

        let Some(mut entry) = matched else {
            tracing::warn!(
                country = %country,
                webservice_type = %webservice_type,
                raw_message,
                "uncataloged remote error"
            );
            return Ok(Classification {
                entry: None,
                raw_message: raw_message.to_string(),
                alert: None,
            });
        };

        entry.record_occurrence(&self.pool, now).await?;

        let alert = if entry.requires_immediate_alert
            || entry.frequency >= self.config.alert_frequency_threshold
        {
            let alert = AlertEvent {
                transaction_id,
                catalog_entry_id: Some(entry.id),
                severity: entry.severity(),
                message: format!("{}: {}", entry.title, raw_message),
            };
            let context = json!({
                "catalog_entry_id": entry.id,
                "title": entry.title,
                "frequency": entry.frequency,
                "severity": entry.severity,
                "transaction_id": transaction_id,
            });
            let _ = self.publisher.publish("catalog.alert", context.clone()).await;
            // The alert is part of the transaction's durable history, not
            // only the live broadcast stream.
            if let Some(transaction_id) = transaction_id {
                TransactionEvent::append(
                    &self.pool,
                    NewTransactionEvent {
                        transaction_id,
                        event_name: "catalog.alert".to_string(),
                        severity: entry.severity(),
                        context: Some(context),
                    },
                )
                .await?;
            }
            Some(alert)
        } else {
            None
        };

        tracing::debug!(
            catalog_entry_id = entry.id,
            title = %entry.title,
            frequency = entry.frequency,
            "classified remote error"
        );

        Ok(Classification {
            entry: Some(entry),
            raw_message: raw_message.to_string(),
            alert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(category: ErrorCategory, is_blocking: bool, is_retryable: bool) -> ErrorCatalogEntry {
        let now = Utc::now().naive_utc();
        ErrorCatalogEntry {
            id: 1,
            country: "AR".to_string(),
            webservice_type: "micdta".to_string(),
            error_code: "E-100".to_string(),
            error_subcode: String::new(),
            title: "Duplicate MIC/DTA".to_string(),
            description: None,
            message_pattern: "%ya existe%".to_string(),
            category: category.to_string(),
            subcategory: None,
            severity: "error".to_string(),
            is_blocking,
            is_retryable,
            suggested_max_retries: None,
            remediation: Some("Check for a prior filing".to_string()),
            frequency: 0,
            first_seen_at: None,
            last_seen_at: None,
            requires_immediate_alert: false,
            active: true,
            deprecated: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_blocking_entry_is_never_retryable() {
        let c = Classification {
            entry: Some(entry(ErrorCategory::BusinessRule, true, true)),
            raw_message: "ya existe".to_string(),
            alert: None,
        };
        assert!(!c.is_retryable());
        assert!(c.is_blocking());
    }

    #[test]
    fn test_retryable_entry() {
        let c = Classification {
            entry: Some(entry(ErrorCategory::SystemUnavailable, false, true)),
            raw_message: "servicio no disponible".to_string(),
            alert: None,
        };
        assert!(c.is_retryable());
        assert_eq!(c.category(), ErrorCategory::SystemUnavailable);
    }

    #[test]
    fn test_uncataloged_errors_default_to_conservative_retry() {
        let c = Classification {
            entry: None,
            raw_message: "something new".to_string(),
            alert: None,
        };
        assert!(c.is_retryable());
        assert!(!c.is_blocking());
        assert_eq!(c.category(), ErrorCategory::Unknown);
        assert!(c.details()["uncataloged"].as_bool().unwrap());
    }
}
