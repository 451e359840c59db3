//! Shared harness for the database-backed integration suite. Tests that use
//! it are `#[ignore]`d by default and run against the database named by
//! `DATABASE_URL`. The suite shares one database, so run it with
//! `--test-threads=1`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;

use aduana_core::engine::{
    EngineError, FilingRequest, Notifier, ParsedResponse, RequestBuilder, ResponseParser,
    Transport, WireResponse,
};
use aduana_core::events::AlertEvent;
use aduana_core::models::{FilingTransaction, NewFilingTransaction, SessionCredential};
use aduana_core::{Country, ProcessStep, WebserviceType};

/// Connect to the test database, apply the schema, and clear engine tables.
pub async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/aduana_test".to_string());
    let pool = PgPool::connect(&url)
        .await
        .expect("Failed to connect to test database");

    aduana_core::database::run_migrations(&pool)
        .await
        .expect("Failed to apply schema");

    sqlx::raw_sql(
        "TRUNCATE aduana_transaction_events, aduana_correlation_tokens,
                  aduana_filing_transactions, aduana_voyage_webservice_statuses,
                  aduana_error_catalog_entries, aduana_session_credentials",
    )
    .execute(&pool)
    .await
    .expect("Failed to truncate engine tables");

    pool
}

/// Insert a filing transaction row so records that reference a transaction id
/// satisfy the foreign key on `aduana_correlation_tokens`.
pub async fn seed_transaction(pool: &PgPool, voyage_id: i64, step: ProcessStep) -> uuid::Uuid {
    FilingTransaction::create(
        pool,
        NewFilingTransaction {
            organization_id: 7,
            initiated_by: Some("integration-suite".to_string()),
            shipment_id: Some(100 + voyage_id),
            voyage_id: Some(voyage_id),
            country: Country::Ar,
            webservice_type: WebserviceType::Micdta,
            environment: "testing".to_string(),
            target_url: "https://wsaduhomoext.test.afip.gob.ar/diav2/wgesregsintia2".to_string(),
            process_step: Some(step),
            consumes_tokens: vec![],
            max_retries: 3,
        },
    )
    .await
    .expect("Failed to seed filing transaction")
    .id
}

pub fn filing_request(voyage_id: i64, step: ProcessStep, consume: Vec<String>) -> FilingRequest {
    FilingRequest {
        organization_id: 7,
        initiated_by: Some("integration-suite".to_string()),
        voyage_id,
        shipment_id: Some(100 + voyage_id),
        country: Country::Ar,
        webservice_type: WebserviceType::Micdta,
        environment: "testing".to_string(),
        target_url: "https://wsaduhomoext.test.afip.gob.ar/diav2/wgesregsintia2".to_string(),
        process_step: Some(step),
        consume_tokens: consume,
    }
}

/// Builder that renders a fixed placeholder payload.
pub struct StaticBuilder;

#[async_trait]
impl RequestBuilder for StaticBuilder {
    async fn build_request(&self, request: &FilingRequest) -> Result<Vec<u8>, EngineError> {
        Ok(format!(
            "<envelope voyage=\"{}\" ws=\"{}\"/>",
            request.voyage_id, request.webservice_type
        )
        .into_bytes())
    }
}

/// Builder that always rejects, for exercising the local validation path.
pub struct RejectingBuilder;

#[async_trait]
impl RequestBuilder for RejectingBuilder {
    async fn build_request(&self, _request: &FilingRequest) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::Build("manifest is missing vessel data".to_string()))
    }
}

/// Transport that replays a scripted sequence of responses and counts calls.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<WireResponse, EngineError>>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<WireResponse, EngineError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        _url: &str,
        _action: &str,
        _payload: &[u8],
        _credential: &SessionCredential,
    ) -> Result<WireResponse, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::Transport("script exhausted".to_string())))
    }
}

/// Parser over the JSON bodies the scripted transport emits.
pub struct JsonParser;

impl ResponseParser for JsonParser {
    fn parse(&self, raw: &WireResponse) -> Result<ParsedResponse, EngineError> {
        let value: serde_json::Value = serde_json::from_slice(&raw.body)
            .map_err(|e| EngineError::Parse(e.to_string()))?;

        if value["ok"].as_bool().unwrap_or(false) {
            Ok(ParsedResponse::Accepted {
                confirmation_number: value["confirmation"].as_str().map(str::to_string),
                external_reference: value["external_reference"].as_str().map(str::to_string),
                tracks: value["tracks"]
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
        } else {
            Ok(ParsedResponse::Rejected {
                error_code: value["code"].as_str().map(str::to_string),
                message: value["message"].as_str().unwrap_or_default().to_string(),
            })
        }
    }
}

pub fn accepted(confirmation: &str, tracks: &[&str]) -> Result<WireResponse, EngineError> {
    Ok(WireResponse {
        body: json!({ "ok": true, "confirmation": confirmation, "tracks": tracks })
            .to_string()
            .into_bytes(),
        http_status: 200,
        headers: Vec::new(),
    })
}

pub fn rejected(code: &str, message: &str) -> Result<WireResponse, EngineError> {
    Ok(WireResponse {
        body: json!({ "ok": false, "code": code, "message": message })
            .to_string()
            .into_bytes(),
        http_status: 200,
        headers: Vec::new(),
    })
}

pub fn transport_down() -> Result<WireResponse, EngineError> {
    Err(EngineError::Transport("connection refused".to_string()))
}

/// Notifier that records every alert it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<AlertEvent>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts.lock().expect("alerts mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &AlertEvent) -> Result<(), EngineError> {
        self.alerts
            .lock()
            .expect("alerts mutex poisoned")
            .push(alert.clone());
        Ok(())
    }
}
