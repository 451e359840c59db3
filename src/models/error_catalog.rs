//! Curated catalog of known remote error signatures. Operators maintain the
//! titles and remediation text; the engine maintains the frequency counters.
//! Maps to `aduana_error_catalog_entries`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::constants::{Country, ErrorCategory, Severity, WebserviceType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ErrorCatalogEntry {
    pub id: i64,
    pub country: String,
    pub webservice_type: String,
    pub error_code: String,
    pub error_subcode: String,
    pub title: String,
    pub description: Option<String>,
    pub message_pattern: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub severity: String,
    pub is_blocking: bool,
    pub is_retryable: bool,
    pub suggested_max_retries: Option<i32>,
    pub remediation: Option<String>,
    pub frequency: i64,
    pub first_seen_at: Option<NaiveDateTime>,
    pub last_seen_at: Option<NaiveDateTime>,
    pub requires_immediate_alert: bool,
    pub active: bool,
    pub deprecated: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewErrorCatalogEntry {
    pub country: Country,
    pub webservice_type: WebserviceType,
    pub error_code: String,
    pub error_subcode: String,
    pub title: String,
    pub description: Option<String>,
    pub message_pattern: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub is_blocking: bool,
    pub is_retryable: bool,
    pub suggested_max_retries: Option<i32>,
    pub remediation: Option<String>,
    pub requires_immediate_alert: bool,
}

const COLUMNS: &str = "id, country, webservice_type, error_code, error_subcode, title, \
                       description, message_pattern, category, subcategory, severity, \
                       is_blocking, is_retryable, suggested_max_retries, remediation, \
                       frequency, first_seen_at, last_seen_at, requires_immediate_alert, \
                       active, deprecated, created_at, updated_at";

impl ErrorCatalogEntry {
    pub fn category(&self) -> ErrorCategory {
        self.category.parse().unwrap_or(ErrorCategory::Unknown)
    }

    pub fn severity(&self) -> Severity {
        self.severity.parse().unwrap_or(Severity::Error)
    }

    pub async fn create(
        pool: &PgPool,
        new: NewErrorCatalogEntry,
    ) -> Result<ErrorCatalogEntry, sqlx::Error> {
        sqlx::query_as::<_, ErrorCatalogEntry>(&format!(
            "INSERT INTO aduana_error_catalog_entries
             (country, webservice_type, error_code, error_subcode, title, description,
              message_pattern, category, severity, is_blocking, is_retryable,
              suggested_max_retries, remediation, requires_immediate_alert)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING {COLUMNS}"
        ))
        .bind(new.country.code())
        .bind(new.webservice_type.to_string())
        .bind(&new.error_code)
        .bind(&new.error_subcode)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.message_pattern)
        .bind(new.category.to_string())
        .bind(new.severity.to_string())
        .bind(new.is_blocking)
        .bind(new.is_retryable)
        .bind(new.suggested_max_retries)
        .bind(&new.remediation)
        .bind(new.requires_immediate_alert)
        .fetch_one(pool)
        .await
    }

    /// Active, non-deprecated entries for a (country, webservice) pair, in
    /// insertion order. Pattern matching happens in the classifier; first
    /// match wins.
    pub async fn candidates(
        pool: &PgPool,
        country: Country,
        webservice_type: WebserviceType,
    ) -> Result<Vec<ErrorCatalogEntry>, sqlx::Error> {
        sqlx::query_as::<_, ErrorCatalogEntry>(&format!(
            "SELECT {COLUMNS}
             FROM aduana_error_catalog_entries
             WHERE country = $1 AND webservice_type = $2
               AND active AND NOT deprecated
             ORDER BY id"
        ))
        .bind(country.code())
        .bind(webservice_type.to_string())
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<ErrorCatalogEntry>, sqlx::Error> {
        sqlx::query_as::<_, ErrorCatalogEntry>(&format!(
            "SELECT {COLUMNS} FROM aduana_error_catalog_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Bump the frequency counter and seen timestamps after a match.
    /// `first_seen_at` is only ever set once.
    pub async fn record_occurrence(
        &mut self,
        pool: &PgPool,
        now: NaiveDateTime,
    ) -> Result<(), sqlx::Error> {
        let updated = sqlx::query_as::<_, ErrorCatalogEntry>(&format!(
            "UPDATE aduana_error_catalog_entries
             SET frequency = frequency + 1,
                 first_seen_at = COALESCE(first_seen_at, $2),
                 last_seen_at = $2,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        ))
        .bind(self.id)
        .bind(now)
        .fetch_one(pool)
        .await?;

        *self = updated;
        Ok(())
    }
}

/// Case-insensitive wildcard match. `%` in the pattern matches any run of
/// characters; all literal segments must appear in order, and patterns
/// without a leading/trailing `%` anchor at the respective end.
pub fn matches_pattern(pattern: &str, message: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let message = message.to_lowercase();

    let segments: Vec<&str> = pattern.split('%').collect();
    if segments.len() == 1 {
        return pattern == message;
    }

    let mut pos = 0usize;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        match message[pos..].find(segment) {
            Some(found) => {
                // The first segment anchors at the start unless the pattern
                // opened with a wildcard.
                if i == 0 && found != 0 {
                    return false;
                }
                pos += found + segment.len();
            }
            None => return false,
        }
    }

    // The last segment anchors at the end unless the pattern closed with `%`.
    if let Some(last) = segments.last() {
        if !last.is_empty() && !message.ends_with(last) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern_without_wildcards() {
        assert!(matches_pattern("ya existe un micdta", "Ya existe un MICDTA"));
        assert!(!matches_pattern("ya existe un micdta", "ya existe un micdta previo"));
    }

    #[test]
    fn test_wildcard_segments_in_order() {
        let pattern = "%el identificador%ya existe%";
        assert!(matches_pattern(pattern, "Error: el identificador MIC-123 ya existe."));
        assert!(!matches_pattern(pattern, "ya existe el identificador MIC-123"));
    }

    #[test]
    fn test_anchoring() {
        assert!(matches_pattern("ticket%", "Ticket expirado"));
        assert!(!matches_pattern("ticket%", "el ticket expirado"));
        assert!(matches_pattern("%expirado", "el ticket ha expirado"));
        assert!(!matches_pattern("%expirado", "expirado el ticket"));
    }

    #[test]
    fn test_case_insensitive_matching() {
        assert!(matches_pattern("%SERVICIO NO DISPONIBLE%", "servicio no disponible por mantenimiento"));
    }

    #[test]
    fn test_repeated_segment_consumes_forward() {
        // Each segment match advances the scan position.
        assert!(matches_pattern("%abc%abc%", "xx abc yy abc zz"));
        assert!(!matches_pattern("%abc%abc%", "xx abc yy"));
    }
}
