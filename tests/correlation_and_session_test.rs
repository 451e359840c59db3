//! Database-backed scenarios for TRACK chain enforcement, session reuse,
//! and the maintenance scheduler.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use aduana_core::config::EngineConfig;
use aduana_core::correlation::{CorrelationError, DomainLinkage, TrackTracker};
use aduana_core::engine::{FilingDispatcher, MaintenanceScheduler};
use aduana_core::models::{CorrelationToken, NewSessionCredential, SessionCredential, SessionIdentity};
use aduana_core::session::{Authenticator, SessionCache, StaticAuthenticator};
use aduana_core::{ProcessStep, TransactionState};

use common::{accepted, filing_request, transport_down, JsonParser, RecordingNotifier, ScriptedTransport, StaticBuilder};

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_consume_is_all_or_nothing() {
    let pool = common::test_pool().await;
    let tracker = TrackTracker::new(pool.clone(), EngineConfig::default());
    let transaction_id = common::seed_transaction(&pool, 500, ProcessStep::RegistrarTitEnvios).await;

    tracker
        .record(
            transaction_id,
            ProcessStep::RegistrarTitEnvios,
            &["AON-1".to_string(), "AON-2".to_string()],
            DomainLinkage {
                shipment_id: Some(500),
                ..DomainLinkage::default()
            },
        )
        .await
        .expect("Recording failed");

    // One of the requested values was never produced.
    let err = tracker
        .consume(
            &["AON-1".to_string(), "AON-MISSING".to_string()],
            ProcessStep::RegistrarMicDta,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CorrelationError::NotFound { .. }));

    // The present token must be untouched.
    let untouched = CorrelationToken::find_by_value(&pool, "AON-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.status, "generated");
    assert!(untouched.consumed_at.is_none());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_consume_rejects_steps_out_of_chain_order() {
    let pool = common::test_pool().await;
    let tracker = TrackTracker::new(pool.clone(), EngineConfig::default());
    let transaction_id = common::seed_transaction(&pool, 501, ProcessStep::RegistrarTitEnvios).await;

    tracker
        .record(
            transaction_id,
            ProcessStep::RegistrarTitEnvios,
            &["ORD-1".to_string()],
            DomainLinkage::default(),
        )
        .await
        .expect("Recording failed");

    // Skipping RegistrarMicDta is not allowed.
    let err = tracker
        .consume(&["ORD-1".to_string()], ProcessStep::RegistrarConvoy)
        .await
        .unwrap_err();
    assert!(matches!(err, CorrelationError::OutOfOrder { .. }));

    // In-order consumption then walks the chain to completion.
    tracker
        .consume(&["ORD-1".to_string()], ProcessStep::RegistrarMicDta)
        .await
        .expect("In-order consumption failed");
    tracker
        .consume(&["ORD-1".to_string()], ProcessStep::RegistrarConvoy)
        .await
        .expect("Final step consumption failed");

    let token = CorrelationToken::find_by_value(&pool, "ORD-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.status, "completed");
    assert_eq!(
        token.applied_steps(),
        vec![ProcessStep::RegistrarMicDta, ProcessStep::RegistrarConvoy]
    );
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_session_is_reused_until_it_expires() {
    let pool = common::test_pool().await;
    let cache = SessionCache::new(pool.clone(), EngineConfig::default());
    let identity = SessionIdentity::new(7, "wgesregsintia2", "testing");

    let long_lived = StaticAuthenticator::new(3600);
    let first = cache.acquire(&identity, &long_lived).await.expect("Acquire failed");
    let second = cache.acquire(&identity, &long_lived).await.expect("Acquire failed");
    assert_eq!(long_lived.issued_count(), 1);
    assert_eq!(first.id, second.id);
    assert_eq!(first.token, second.token);

    // Expire the cached row; the next acquisition must reissue.
    sqlx::query("UPDATE aduana_session_credentials SET expires_at = $1 WHERE id = $2")
        .bind(Utc::now().naive_utc() - Duration::minutes(1))
        .bind(first.id)
        .execute(&pool)
        .await
        .expect("Failed to backdate expiry");

    let third = cache.acquire(&identity, &long_lived).await.expect("Acquire failed");
    assert_eq!(long_lived.issued_count(), 2);
    assert_ne!(second.token, third.token);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_fresh_credential_replaces_the_lingering_active_row() {
    let pool = common::test_pool().await;
    let identity = SessionIdentity::new(9, "wgesregsintia2", "testing");
    let authenticator = StaticAuthenticator::new(3600);

    let issued = authenticator.authenticate(&identity).await.unwrap();
    let first = SessionCredential::create(&pool, NewSessionCredential::from((&identity, issued)))
        .await
        .expect("First insert failed");

    // A second active insert for the same identity must displace the first,
    // not trip the partial unique index.
    let reissued = authenticator.authenticate(&identity).await.unwrap();
    let second =
        SessionCredential::create(&pool, NewSessionCredential::from((&identity, reissued)))
            .await
            .expect("Replacement insert failed");
    assert_ne!(first.id, second.id);

    let active: Vec<SessionCredential> = sqlx::query_as(
        "SELECT id, organization_id, service_name, environment, token, signature,
                status, issued_at, expires_at, usage_count, last_used_at,
                created_at, updated_at
         FROM aduana_session_credentials WHERE status = 'active'",
    )
    .fetch_all(&pool)
    .await
    .expect("Credential query failed");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);
    assert_eq!(active[0].token, second.token);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_distinct_identities_hold_distinct_sessions() {
    let pool = common::test_pool().await;
    let cache = SessionCache::new(pool.clone(), EngineConfig::default());
    let authenticator = StaticAuthenticator::new(3600);

    let production = SessionIdentity::new(7, "wgesregsintia2", "production");
    let testing = SessionIdentity::new(7, "wgesregsintia2", "testing");

    let a = cache.acquire(&production, &authenticator).await.expect("Acquire failed");
    let b = cache.acquire(&testing, &authenticator).await.expect("Acquire failed");

    assert_eq!(authenticator.issued_count(), 2);
    assert_ne!(a.token, b.token);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_scheduler_picks_up_due_retries() {
    let pool = common::test_pool().await;
    let transport = Arc::new(ScriptedTransport::new(vec![
        transport_down(),
        accepted("CONF-TICK", &[]),
    ]));
    let dispatcher = Arc::new(FilingDispatcher::new(
        pool.clone(),
        EngineConfig::default(),
        Arc::new(StaticBuilder),
        transport.clone(),
        Arc::new(JsonParser),
        Arc::new(StaticAuthenticator::new(3600)),
        Arc::new(RecordingNotifier::default()),
    ));

    let outcome = dispatcher
        .send_filing(filing_request(80, ProcessStep::RegistrarTitEnvios, vec![]))
        .await
        .expect("Dispatch failed");
    assert_eq!(outcome.state, TransactionState::Retry);

    sqlx::query("UPDATE aduana_filing_transactions SET next_retry_at = $2 WHERE id = $1")
        .bind(outcome.transaction.id)
        .bind(Utc::now().naive_utc() - Duration::minutes(1))
        .execute(&pool)
        .await
        .expect("Failed to backdate retry schedule");

    let scheduler = MaintenanceScheduler::new(pool.clone(), dispatcher, 50);
    let summary = scheduler
        .tick_retries(Utc::now().naive_utc())
        .await
        .expect("Tick failed");

    assert_eq!(summary.picked_up, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(summary.failures.is_empty());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_scheduler_sweep_expires_stale_tokens_and_credentials() {
    let pool = common::test_pool().await;
    let transport = Arc::new(ScriptedTransport::new(vec![accepted(
        "CONF-SWEEP",
        &["SWP-1", "SWP-2"],
    )]));
    let dispatcher = Arc::new(FilingDispatcher::new(
        pool.clone(),
        EngineConfig::default(),
        Arc::new(StaticBuilder),
        transport,
        Arc::new(JsonParser),
        Arc::new(StaticAuthenticator::new(3600)),
        Arc::new(RecordingNotifier::default()),
    ));

    let outcome = dispatcher
        .send_filing(filing_request(90, ProcessStep::RegistrarTitEnvios, vec![]))
        .await
        .expect("Dispatch failed");
    assert!(outcome.succeeded());

    // Age the filing's artifacts past their windows: tokens past the
    // freshness cutoff, the credential past its validity.
    let backdated = Utc::now().naive_utc() - Duration::hours(25);
    sqlx::query("UPDATE aduana_correlation_tokens SET generated_at = $1")
        .bind(backdated)
        .execute(&pool)
        .await
        .expect("Failed to backdate tokens");
    sqlx::query("UPDATE aduana_session_credentials SET expires_at = $1")
        .bind(backdated)
        .execute(&pool)
        .await
        .expect("Failed to backdate credential");

    let scheduler = MaintenanceScheduler::new(pool.clone(), dispatcher, 50);
    let summary = scheduler
        .sweep(Utc::now().naive_utc())
        .await
        .expect("Sweep failed");

    assert_eq!(summary.stale_tokens, 2);
    assert_eq!(summary.expired_credentials, 1);

    for value in ["SWP-1", "SWP-2"] {
        let token = CorrelationToken::find_by_value(&pool, value)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.status, "expired", "token {value} not swept");
    }

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM aduana_session_credentials WHERE status = 'active'",
    )
    .fetch_one(&pool)
    .await
    .expect("Credential count failed");
    assert_eq!(active, 0);

    // Swept tokens can no longer be consumed.
    let tracker = TrackTracker::new(pool.clone(), EngineConfig::default());
    let err = tracker
        .consume(&["SWP-1".to_string()], ProcessStep::RegistrarMicDta)
        .await
        .unwrap_err();
    assert!(matches!(err, CorrelationError::NotConsumable { .. }));
}
