//! Seed entries for well-known AFIP/DNA error signatures. Operators extend
//! the catalog at runtime; this baseline covers the failures every
//! deployment encounters.

use sqlx::PgPool;

use crate::constants::{Country, ErrorCategory, Severity, WebserviceType};
use crate::models::NewErrorCatalogEntry;

fn baseline_entries() -> Vec<NewErrorCatalogEntry> {
    vec![
        NewErrorCatalogEntry {
            country: Country::Ar,
            webservice_type: WebserviceType::Micdta,
            error_code: "AR-MICDTA-DUP".to_string(),
            error_subcode: String::new(),
            title: "MIC/DTA already registered".to_string(),
            description: Some("The authority already holds a MIC/DTA for this voyage".to_string()),
            message_pattern: "%ya existe un micdta%".to_string(),
            category: ErrorCategory::BusinessRule,
            severity: Severity::Error,
            is_blocking: true,
            is_retryable: false,
            suggested_max_retries: None,
            remediation: Some(
                "Locate the prior filing and link its confirmation number instead of resending"
                    .to_string(),
            ),
            requires_immediate_alert: false,
        },
        NewErrorCatalogEntry {
            country: Country::Ar,
            webservice_type: WebserviceType::Micdta,
            error_code: "AR-AUTH-EXPIRED".to_string(),
            error_subcode: String::new(),
            title: "Authentication ticket expired".to_string(),
            description: None,
            message_pattern: "%ticket%expirado%".to_string(),
            category: ErrorCategory::Authentication,
            severity: Severity::Warning,
            is_blocking: false,
            is_retryable: true,
            suggested_max_retries: Some(1),
            remediation: Some("A fresh session is acquired automatically".to_string()),
            requires_immediate_alert: false,
        },
        NewErrorCatalogEntry {
            country: Country::Ar,
            webservice_type: WebserviceType::Micdta,
            error_code: "AR-WS-DOWN".to_string(),
            error_subcode: String::new(),
            title: "AFIP service unavailable".to_string(),
            description: Some("Scheduled maintenance window or outage".to_string()),
            message_pattern: "%servicio no disponible%".to_string(),
            category: ErrorCategory::SystemUnavailable,
            severity: Severity::Warning,
            is_blocking: false,
            is_retryable: true,
            suggested_max_retries: Some(5),
            remediation: Some("Retries back off automatically; no action needed".to_string()),
            requires_immediate_alert: false,
        },
        NewErrorCatalogEntry {
            country: Country::Ar,
            webservice_type: WebserviceType::Micdta,
            error_code: "AR-CERT-INVALID".to_string(),
            error_subcode: String::new(),
            title: "Invalid certificate".to_string(),
            description: None,
            message_pattern: "%certificado%invalido%".to_string(),
            category: ErrorCategory::Authentication,
            severity: Severity::Critical,
            is_blocking: true,
            is_retryable: false,
            suggested_max_retries: None,
            remediation: Some("Renew the organization's AFIP certificate".to_string()),
            requires_immediate_alert: true,
        },
        NewErrorCatalogEntry {
            country: Country::Py,
            webservice_type: WebserviceType::Manifiesto,
            error_code: "PY-MAN-DUP".to_string(),
            error_subcode: String::new(),
            title: "Manifest already filed".to_string(),
            description: None,
            message_pattern: "%manifiesto%ya%registrado%".to_string(),
            category: ErrorCategory::BusinessRule,
            severity: Severity::Error,
            is_blocking: true,
            is_retryable: false,
            suggested_max_retries: None,
            remediation: Some("Verify the prior DNA filing before resubmitting".to_string()),
            requires_immediate_alert: false,
        },
    ]
}

/// Insert the baseline catalog, skipping signatures that already exist.
pub async fn seed_catalog(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for entry in baseline_entries() {
        let result = sqlx::query(
            "INSERT INTO aduana_error_catalog_entries
             (country, webservice_type, error_code, error_subcode, title, description,
              message_pattern, category, severity, is_blocking, is_retryable,
              suggested_max_retries, remediation, requires_immediate_alert)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (country, webservice_type, error_code, error_subcode) DO NOTHING",
        )
        .bind(entry.country.code())
        .bind(entry.webservice_type.to_string())
        .bind(&entry.error_code)
        .bind(&entry.error_subcode)
        .bind(&entry.title)
        .bind(&entry.description)
        .bind(&entry.message_pattern)
        .bind(entry.category.to_string())
        .bind(entry.severity.to_string())
        .bind(entry.is_blocking)
        .bind(entry.is_retryable)
        .bind(entry.suggested_max_retries)
        .bind(&entry.remediation)
        .bind(entry.requires_immediate_alert)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error_catalog::matches_pattern;

    #[test]
    fn test_baseline_patterns_match_their_signatures() {
        let entries = baseline_entries();
        let duplicate = &entries[0];
        assert!(matches_pattern(
            &duplicate.message_pattern,
            "Error 100: Ya existe un MICDTA registrado para el viaje"
        ));

        let ticket = &entries[1];
        assert!(matches_pattern(
            &ticket.message_pattern,
            "El ticket de acceso ha expirado"
        ));
    }

    #[test]
    fn test_blocking_entries_are_not_retryable() {
        for entry in baseline_entries() {
            if entry.is_blocking {
                assert!(!entry.is_retryable, "{} blocks but retries", entry.error_code);
            }
        }
    }
}
