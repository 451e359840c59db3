//! Cached authentication credentials for customs webservices.
//!
//! The remote authorities reject a login while a prior session is still
//! valid, so credentials are cached per (organization, service, environment)
//! and reused until expiry. Maps to `aduana_session_credentials`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::state_machine::states::CredentialState;

/// Identity triple a credential is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub organization_id: i64,
    pub service_name: String,
    pub environment: String,
}

impl SessionIdentity {
    pub fn new(organization_id: i64, service_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            organization_id,
            service_name: service_name.into(),
            environment: environment.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SessionCredential {
    pub id: i64,
    pub organization_id: i64,
    pub service_name: String,
    pub environment: String,
    pub token: String,
    pub signature: String,
    pub status: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub usage_count: i32,
    pub last_used_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionCredential {
    pub identity: SessionIdentity,
    pub token: String,
    pub signature: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

const COLUMNS: &str = "id, organization_id, service_name, environment, token, signature, \
                       status, issued_at, expires_at, usage_count, last_used_at, \
                       created_at, updated_at";

impl SessionCredential {
    pub fn state(&self) -> CredentialState {
        self.status.parse().unwrap_or(CredentialState::Error)
    }

    /// Computed expiry predicate, independent of the persisted status.
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        now > self.expires_at
    }

    /// Flip logically-expired `active` rows for this identity to `expired`.
    /// Run before every active-credential lookup so readers never observe a
    /// stale row as active.
    pub async fn sweep_expired_for(
        pool: &PgPool,
        identity: &SessionIdentity,
        now: NaiveDateTime,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE aduana_session_credentials
             SET status = 'expired', updated_at = NOW()
             WHERE organization_id = $1 AND service_name = $2 AND environment = $3
               AND status = 'active' AND expires_at <= $4",
        )
        .bind(identity.organization_id)
        .bind(&identity.service_name)
        .bind(&identity.environment)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Sweep across all identities, used by the periodic cleanup job.
    pub async fn sweep_expired_all(pool: &PgPool, now: NaiveDateTime) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE aduana_session_credentials
             SET status = 'expired', updated_at = NOW()
             WHERE status = 'active' AND expires_at <= $1",
        )
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_active(
        pool: &PgPool,
        identity: &SessionIdentity,
        now: NaiveDateTime,
    ) -> Result<Option<SessionCredential>, sqlx::Error> {
        sqlx::query_as::<_, SessionCredential>(&format!(
            "SELECT {COLUMNS}
             FROM aduana_session_credentials
             WHERE organization_id = $1 AND service_name = $2 AND environment = $3
               AND status = 'active' AND expires_at > $4
             LIMIT 1"
        ))
        .bind(identity.organization_id)
        .bind(&identity.service_name)
        .bind(&identity.environment)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    /// Insert a fresh `active` credential, replacing any lingering active
    /// row for the same identity. Delete-then-insert runs inside one
    /// transaction: the partial unique index would reject two active rows,
    /// and soft-expiring the old one would leave ambiguity.
    pub async fn create(
        pool: &PgPool,
        new: NewSessionCredential,
    ) -> Result<SessionCredential, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "DELETE FROM aduana_session_credentials
             WHERE organization_id = $1 AND service_name = $2 AND environment = $3
               AND status = 'active'",
        )
        .bind(new.identity.organization_id)
        .bind(&new.identity.service_name)
        .bind(&new.identity.environment)
        .execute(&mut *tx)
        .await?;

        let credential = sqlx::query_as::<_, SessionCredential>(&format!(
            "INSERT INTO aduana_session_credentials
             (organization_id, service_name, environment, token, signature, status, issued_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, 'active', $6, $7)
             RETURNING {COLUMNS}"
        ))
        .bind(new.identity.organization_id)
        .bind(&new.identity.service_name)
        .bind(&new.identity.environment)
        .bind(&new.token)
        .bind(&new.signature)
        .bind(new.issued_at)
        .bind(new.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(credential)
    }

    /// Record one reuse of the credential.
    pub async fn touch(&mut self, pool: &PgPool, now: NaiveDateTime) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_session_credentials
             SET usage_count = usage_count + 1, last_used_at = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(now)
        .execute(pool)
        .await?;

        self.usage_count += 1;
        self.last_used_at = Some(now);
        Ok(())
    }

    /// Explicit invalidation, used when the remote rejects the credential.
    pub async fn revoke(&mut self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE aduana_session_credentials
             SET status = 'revoked', updated_at = NOW()
             WHERE id = $1",
        )
        .bind(self.id)
        .execute(pool)
        .await?;

        self.status = CredentialState::Revoked.to_string();
        Ok(())
    }

    /// Purge non-active rows past their retention window. Expired rows are
    /// kept longer than revoked/errored ones for audit.
    pub async fn purge_stale(
        pool: &PgPool,
        expired_cutoff: NaiveDateTime,
        revoked_cutoff: NaiveDateTime,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM aduana_session_credentials
             WHERE (status = 'expired' AND updated_at < $1)
                OR (status IN ('revoked', 'error') AND updated_at < $2)",
        )
        .bind(expired_cutoff)
        .bind(revoked_cutoff)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn credential(expires_in_secs: i64) -> SessionCredential {
        let now = Utc::now().naive_utc();
        SessionCredential {
            id: 1,
            organization_id: 10,
            service_name: "wgesregsintia2".to_string(),
            environment: "production".to_string(),
            token: "tok".to_string(),
            signature: "sig".to_string(),
            status: "active".to_string(),
            issued_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
            usage_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_expiry_predicate() {
        let cred = credential(600);
        let now = Utc::now().naive_utc();
        assert!(!cred.is_expired_at(now));
        assert!(cred.is_expired_at(now + Duration::seconds(700)));
    }

    #[test]
    fn test_state_parsing_falls_back_to_error() {
        let mut cred = credential(600);
        assert_eq!(cred.state(), CredentialState::Active);
        cred.status = "garbage".to_string();
        assert_eq!(cred.state(), CredentialState::Error);
    }
}
