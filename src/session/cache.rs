use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::models::{NewSessionCredential, SessionCredential, SessionIdentity};

/// Token/signature pair issued by the remote authentication flow
/// (WSAA-style login) together with its validity window.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub token: String,
    pub signature: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

/// Remote authentication collaborator. The engine never builds or parses the
/// login exchange itself.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        identity: &SessionIdentity,
    ) -> Result<IssuedCredential, SessionError>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Remote authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Cache of active credentials keyed by (organization, service, environment).
///
/// The at-most-one-active invariant is enforced with delete-then-insert
/// inside one database transaction, backstopped by the partial unique index
/// on the identity triple.
pub struct SessionCache {
    pool: PgPool,
    config: EngineConfig,
}

impl SessionCache {
    pub fn new(pool: PgPool, config: EngineConfig) -> Self {
        Self { pool, config }
    }

    /// Return the active, unexpired credential for the identity, issuing a
    /// fresh one through `authenticator` when none is usable.
    ///
    /// Every acquisition first sweeps logically-expired `active` rows to
    /// `expired`, so a reader never observes a stale row as active. On a
    /// cache hit the record is returned unmodified; callers account for usage
    /// with [`SessionCredential::touch`]. On a miss, rows past retention are
    /// purged, any lingering `active` row is hard-deleted, and the freshly
    /// issued credential is inserted as `active`. If the remote
    /// authentication call fails nothing is persisted.
    pub async fn acquire(
        &self,
        identity: &SessionIdentity,
        authenticator: &dyn Authenticator,
    ) -> Result<SessionCredential, SessionError> {
        let now = Utc::now().naive_utc();

        SessionCredential::sweep_expired_for(&self.pool, identity, now).await?;

        if let Some(existing) = SessionCredential::find_active(&self.pool, identity, now).await? {
            tracing::debug!(
                organization_id = identity.organization_id,
                service = %identity.service_name,
                environment = %identity.environment,
                credential_id = existing.id,
                "session cache hit"
            );
            return Ok(existing);
        }

        self.purge_stale(now).await?;

        // The remote call happens before any write, so a failed login leaves
        // no partial credential behind.
        let issued = authenticator.authenticate(identity).await?;

        let credential =
            SessionCredential::create(&self.pool, NewSessionCredential::from((identity, issued)))
                .await?;

        tracing::info!(
            organization_id = identity.organization_id,
            service = %identity.service_name,
            environment = %identity.environment,
            credential_id = credential.id,
            expires_at = %credential.expires_at,
            "issued fresh session credential"
        );

        Ok(credential)
    }

    /// Explicitly invalidate a credential; the next acquisition will issue a
    /// fresh one. Used after the remote rejects the credential mid-session.
    pub async fn invalidate(&self, credential: &mut SessionCredential) -> Result<(), SessionError> {
        credential.revoke(&self.pool).await?;
        tracing::warn!(credential_id = credential.id, "session credential revoked");
        Ok(())
    }

    /// Flip stale actives across all identities and purge records past their
    /// retention windows. Invoked by the periodic cleanup job.
    pub async fn sweep_expired(&self, now: NaiveDateTime) -> Result<u64, SessionError> {
        let swept = SessionCredential::sweep_expired_all(&self.pool, now).await?;
        let purged = self.purge_stale(now).await?;
        if swept > 0 || purged > 0 {
            tracing::info!(swept, purged, "session credential sweep");
        }
        Ok(swept)
    }

    async fn purge_stale(&self, now: NaiveDateTime) -> Result<u64, SessionError> {
        let expired_cutoff = now
            - chrono::Duration::from_std(self.config.expired_credential_retention)
                .unwrap_or_else(|_| chrono::Duration::days(7));
        let revoked_cutoff = now
            - chrono::Duration::from_std(self.config.revoked_credential_retention)
                .unwrap_or_else(|_| chrono::Duration::days(1));

        Ok(SessionCredential::purge_stale(&self.pool, expired_cutoff, revoked_cutoff).await?)
    }
}

/// Test double issuing deterministic credentials, also used by the
/// integration suite.
pub struct StaticAuthenticator {
    pub ttl_secs: i64,
    counter: std::sync::atomic::AtomicU64,
}

impl StaticAuthenticator {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn issued_count(&self) -> u64 {
        self.counter.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(
        &self,
        identity: &SessionIdentity,
    ) -> Result<IssuedCredential, SessionError> {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let now = Utc::now().naive_utc();
        Ok(IssuedCredential {
            token: format!("token-{}-{}-{n}", identity.organization_id, identity.service_name),
            signature: format!("sig-{n}"),
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(self.ttl_secs),
        })
    }
}

impl From<(&SessionIdentity, IssuedCredential)> for NewSessionCredential {
    fn from((identity, issued): (&SessionIdentity, IssuedCredential)) -> Self {
        Self {
            identity: identity.clone(),
            token: issued.token,
            signature: issued.signature,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_authenticator_issues_distinct_tokens() {
        let auth = StaticAuthenticator::new(600);
        let identity = SessionIdentity::new(1, "wgesregsintia2", "production");

        let a = auth.authenticate(&identity).await.unwrap();
        let b = auth.authenticate(&identity).await.unwrap();

        assert_ne!(a.token, b.token);
        assert_eq!(auth.issued_count(), 2);
        assert!(a.expires_at > a.issued_at);
    }
}
