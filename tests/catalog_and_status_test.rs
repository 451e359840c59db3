//! Database-backed checks for catalog bookkeeping and voyage status
//! independence.

mod common;

use aduana_core::catalog::seed::seed_catalog;
use aduana_core::catalog::ErrorClassifier;
use aduana_core::config::EngineConfig;
use aduana_core::events::EventPublisher;
use aduana_core::models::ErrorCatalogEntry;
use aduana_core::state_machine::VoyageFilingState;
use aduana_core::{Country, VoyageStatusAggregator, WebserviceType};

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_each_match_bumps_frequency_and_keeps_first_seen() {
    let pool = common::test_pool().await;
    seed_catalog(&pool).await.expect("Seed failed");

    let classifier = ErrorClassifier::new(
        pool.clone(),
        EngineConfig::default(),
        EventPublisher::default(),
    );

    let raw = "Ya existe un MICDTA registrado para el viaje 123";
    let first = classifier
        .classify(Country::Ar, WebserviceType::Micdta, raw, None)
        .await
        .expect("Classification failed");
    let entry_id = first.entry.as_ref().expect("No catalog match").id;

    let after_first = ErrorCatalogEntry::find_by_id(&pool, entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_first.frequency, 1);
    let first_seen = after_first.first_seen_at.expect("first_seen_at not set");

    classifier
        .classify(Country::Ar, WebserviceType::Micdta, raw, None)
        .await
        .expect("Classification failed");

    let after_second = ErrorCatalogEntry::find_by_id(&pool, entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_second.frequency, 2);
    assert_eq!(after_second.first_seen_at, Some(first_seen));
    assert!(after_second.last_seen_at >= after_first.last_seen_at);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_uncataloged_errors_carry_no_classification() {
    let pool = common::test_pool().await;

    let classifier = ErrorClassifier::new(
        pool.clone(),
        EngineConfig::default(),
        EventPublisher::default(),
    );

    let classification = classifier
        .classify(
            Country::Py,
            WebserviceType::Manifiesto,
            "error nunca visto 0x99",
            None,
        )
        .await
        .expect("Classification failed");

    assert!(classification.entry.is_none());
    // Uncataloged errors default to retryable.
    assert!(classification.is_retryable());
    assert!(!classification.is_blocking());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database"]
async fn test_voyage_statuses_per_webservice_are_independent() {
    let pool = common::test_pool().await;
    let aggregator = VoyageStatusAggregator::new(pool.clone(), EngineConfig::default());

    let voyage_id = 90;
    let mut ar = aggregator
        .get_or_create(voyage_id, Country::Ar, WebserviceType::Micdta)
        .await
        .expect("get_or_create failed");
    let py = aggregator
        .get_or_create(voyage_id, Country::Py, WebserviceType::Manifiesto)
        .await
        .expect("get_or_create failed");

    assert_eq!(ar.state(), VoyageFilingState::Pending);
    assert_eq!(py.state(), VoyageFilingState::Pending);

    aggregator
        .mark_approved(&mut ar, Some("CONF-AR"), Some("EXT-AR"))
        .await
        .expect("Approval failed");

    let ar_reloaded = aggregator
        .find(voyage_id, Country::Ar, WebserviceType::Micdta)
        .await
        .unwrap()
        .unwrap();
    let py_reloaded = aggregator
        .find(voyage_id, Country::Py, WebserviceType::Manifiesto)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ar_reloaded.state(), VoyageFilingState::Approved);
    assert_eq!(py_reloaded.state(), VoyageFilingState::Pending);
    assert!(py_reloaded.can_send);

    // get_or_create is idempotent for the same triple.
    let ar_again = aggregator
        .get_or_create(voyage_id, Country::Ar, WebserviceType::Micdta)
        .await
        .unwrap();
    assert_eq!(ar_again.id, ar_reloaded.id);
}
