//! Drives a filing attempt end to end: voyage status gate, session
//! acquisition, dispatch, response handling, classification, and retry
//! scheduling.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::types::{
    EngineError, FilingOutcome, FilingRequest, Notifier, ParsedResponse, RequestBuilder,
    ResponseParser, Transport,
};
use crate::aggregator::VoyageStatusAggregator;
use crate::catalog::{Classification, ErrorClassifier};
use crate::config::EngineConfig;
use crate::constants::{Country, ErrorCategory, ProcessStep, Severity, WebserviceType};
use crate::correlation::{DomainLinkage, TrackTracker};
use crate::events::{AlertEvent, EventPublisher};
use crate::models::{
    FilingTransaction, NewFilingTransaction, NewTransactionEvent, SessionIdentity,
    TransactionEvent, VoyageWebserviceStatus,
};
use crate::session::{Authenticator, SessionCache};
use crate::state_machine::{FilingEvent, TransactionStateMachine};

pub struct FilingDispatcher {
    pool: PgPool,
    config: EngineConfig,
    publisher: EventPublisher,
    session_cache: SessionCache,
    classifier: ErrorClassifier,
    tracker: TrackTracker,
    aggregator: VoyageStatusAggregator,
    builder: Arc<dyn RequestBuilder>,
    transport: Arc<dyn Transport>,
    parser: Arc<dyn ResponseParser>,
    authenticator: Arc<dyn Authenticator>,
    notifier: Arc<dyn Notifier>,
}

impl FilingDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        config: EngineConfig,
        builder: Arc<dyn RequestBuilder>,
        transport: Arc<dyn Transport>,
        parser: Arc<dyn ResponseParser>,
        authenticator: Arc<dyn Authenticator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let publisher = EventPublisher::new(config.event_channel_capacity);
        Self {
            session_cache: SessionCache::new(pool.clone(), config.clone()),
            classifier: ErrorClassifier::new(pool.clone(), config.clone(), publisher.clone()),
            tracker: TrackTracker::new(pool.clone(), config.clone()),
            aggregator: VoyageStatusAggregator::new(pool.clone(), config.clone()),
            pool,
            config,
            publisher,
            builder,
            transport,
            parser,
            authenticator,
            notifier,
        }
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn tracker(&self) -> &TrackTracker {
        &self.tracker
    }

    pub fn aggregator(&self) -> &VoyageStatusAggregator {
        &self.aggregator
    }

    pub fn session_cache(&self) -> &SessionCache {
        &self.session_cache
    }

    /// Send one filing for a voyage. Creates the transaction, drives it
    /// through the state machine, and mirrors the outcome onto the voyage
    /// status row.
    pub async fn send_filing(&self, request: FilingRequest) -> Result<FilingOutcome, EngineError> {
        let mut status = self
            .aggregator
            .get_or_create(request.voyage_id, request.country, request.webservice_type)
            .await?;

        if !VoyageStatusAggregator::sendable(&status) {
            return Err(EngineError::NotSendable {
                voyage_id: request.voyage_id,
                country: request.country,
                webservice_type: request.webservice_type,
                reason: format!("status is {} with can_send={}", status.status, status.can_send),
            });
        }

        let transaction = FilingTransaction::create(
            &self.pool,
            NewFilingTransaction {
                organization_id: request.organization_id,
                initiated_by: request.initiated_by.clone(),
                shipment_id: request.shipment_id,
                voyage_id: Some(request.voyage_id),
                country: request.country,
                webservice_type: request.webservice_type,
                environment: request.environment.clone(),
                target_url: request.target_url.clone(),
                process_step: request.process_step,
                consumes_tokens: request.consume_tokens.clone(),
                max_retries: self.config.default_max_retries as i32,
            },
        )
        .await?;

        let mut sm = TransactionStateMachine::new(
            transaction,
            self.pool.clone(),
            self.config.clone(),
            self.publisher.clone(),
        );

        sm.transition(FilingEvent::Validate).await?;
        sm.transition(FilingEvent::Dispatch).await?;
        self.aggregator
            .mark_sending(&mut status)
            .await?;

        self.drive_attempt(&mut sm, &mut status, &request).await
    }

    /// Re-drive a transaction whose scheduled retry is due. Invoked by the
    /// scheduler; the resend guard rejects attempts picked up early.
    pub async fn resend(&self, transaction: FilingTransaction) -> Result<FilingOutcome, EngineError> {
        let request = rebuild_request(&transaction)?;

        let mut status = self
            .aggregator
            .get_or_create(request.voyage_id, request.country, request.webservice_type)
            .await?;

        let mut sm = TransactionStateMachine::new(
            transaction,
            self.pool.clone(),
            self.config.clone(),
            self.publisher.clone(),
        );

        // A cancelled filing suppresses further automatic attempts.
        if !VoyageStatusAggregator::sendable(&status) {
            sm.transition(FilingEvent::Cancel).await?;
            let transaction = sm.into_transaction();
            let state = transaction.state();
            return Ok(FilingOutcome {
                transaction,
                state,
                confirmation_number: None,
                tracks_recorded: Vec::new(),
                classification: None,
            });
        }

        sm.transition(FilingEvent::Resend).await?;
        self.aggregator
            .mark_sending(&mut status)
            .await?;

        self.drive_attempt(&mut sm, &mut status, &request).await
    }

    /// Cancel a filing for a voyage: the status row stops accepting sends
    /// and every in-flight transaction is cancelled. Remote effects of
    /// already-accepted calls are untouched.
    pub async fn cancel_filing(
        &self,
        voyage_id: i64,
        country: Country,
        webservice_type: WebserviceType,
    ) -> Result<VoyageWebserviceStatus, EngineError> {
        let mut status = self
            .aggregator
            .get_or_create(voyage_id, country, webservice_type)
            .await?;
        self.aggregator.cancel(&mut status).await?;

        for transaction in
            FilingTransaction::list_for_voyage(&self.pool, voyage_id, country, webservice_type)
                .await?
        {
            if !transaction.state().is_terminal() {
                let mut sm = TransactionStateMachine::new(
                    transaction,
                    self.pool.clone(),
                    self.config.clone(),
                    self.publisher.clone(),
                );
                sm.transition(FilingEvent::Cancel).await?;
            }
        }

        Ok(status)
    }

    /// Cancel a transaction at any non-terminal state.
    pub async fn cancel_transaction(&self, id: Uuid) -> Result<FilingTransaction, EngineError> {
        let transaction = FilingTransaction::find_by_id(&self.pool, id)
            .await?
            .ok_or(EngineError::TransactionNotFound(id))?;

        let mut sm = TransactionStateMachine::new(
            transaction,
            self.pool.clone(),
            self.config.clone(),
            self.publisher.clone(),
        );
        sm.transition(FilingEvent::Cancel).await?;
        Ok(sm.into_transaction())
    }

    /// One remote attempt: acquire a session, build, send, interpret. An
    /// authentication rejection forces a session refresh plus one immediate
    /// retry that does not touch the backoff budget.
    async fn drive_attempt(
        &self,
        sm: &mut TransactionStateMachine,
        status: &mut VoyageWebserviceStatus,
        request: &FilingRequest,
    ) -> Result<FilingOutcome, EngineError> {
        let identity = SessionIdentity::new(
            request.organization_id,
            request.webservice_type.service_name(),
            request.environment.clone(),
        );
        let action = request
            .process_step
            .map(|s| s.to_string())
            .unwrap_or_else(|| request.webservice_type.to_string());

        let mut auth_refresh_available = true;
        let mut sent_marked = false;

        loop {
            let mut credential = match self
                .session_cache
                .acquire(&identity, self.authenticator.as_ref())
                .await
            {
                Ok(credential) => credential,
                Err(err) => {
                    let raw = format!("session acquisition failed: {err}");
                    return self.handle_failure(sm, status, request, &raw).await;
                }
            };
            credential
                .touch(&self.pool, Utc::now().naive_utc())
                .await?;

            let payload = match self.builder.build_request(request).await {
                Ok(payload) => payload,
                Err(err) => {
                    // Malformed outbound payload: local, never retryable.
                    return self.fail_validation(sm, status, &err.to_string()).await;
                }
            };

            let now = Utc::now().naive_utc();
            let payload_text = String::from_utf8_lossy(&payload).into_owned();
            {
                let tx = sm.transaction_mut();
                tx.record_dispatch(&self.pool, &payload_text, now).await?;
            }

            if !sent_marked {
                sm.transition(FilingEvent::MarkSent).await?;
                self.aggregator
                    .mark_sent(status)
                    .await?;
                sent_marked = true;
            }

            let call = self
                .transport
                .send(&request.target_url, &action, &payload, &credential);
            let wire = match tokio::time::timeout(self.config.call_timeout, call).await {
                Err(_) => {
                    let raw = format!(
                        "transport timeout after {}s",
                        self.config.call_timeout.as_secs()
                    );
                    return self.handle_failure(sm, status, request, &raw).await;
                }
                Ok(Err(err)) => {
                    let raw = format!("transport failure: {err}");
                    return self.handle_failure(sm, status, request, &raw).await;
                }
                Ok(Ok(wire)) => wire,
            };

            let parsed = match self.parser.parse(&wire) {
                Ok(parsed) => parsed,
                Err(err) => {
                    let raw = format!("response parse failed: {err}");
                    return self.handle_failure(sm, status, request, &raw).await;
                }
            };

            match parsed {
                ParsedResponse::Accepted {
                    confirmation_number,
                    external_reference,
                    tracks,
                } => {
                    return self
                        .finalize_success(
                            sm,
                            status,
                            request,
                            &wire.body,
                            confirmation_number,
                            external_reference,
                            tracks,
                        )
                        .await;
                }
                ParsedResponse::Rejected { error_code, message } => {
                    // Probe the catalog before committing to a failure path:
                    // an authentication rejection gets one uncounted retry
                    // with a fresh session.
                    let probe = self
                        .classifier
                        .classify(
                            request.country,
                            request.webservice_type,
                            &message,
                            Some(sm.transaction().id),
                        )
                        .await?;

                    if probe.category() == ErrorCategory::Authentication
                        && !probe.is_blocking()
                        && auth_refresh_available
                    {
                        // The refresh swallows the failure path, but not
                        // the alert the classification may have raised.
                        self.deliver_alert(probe.alert.as_ref()).await;
                        auth_refresh_available = false;
                        self.session_cache.invalidate(&mut credential).await?;
                        self.log_auth_refresh(sm.transaction().id, &message).await?;
                        continue;
                    }

                    let code_hint = error_code.as_deref();
                    return self
                        .conclude_failure(sm, status, probe, code_hint, &message)
                        .await;
                }
            }
        }
    }

    /// Local validation failure: blocking, manual review, no catalog match.
    async fn fail_validation(
        &self,
        sm: &mut TransactionStateMachine,
        status: &mut VoyageWebserviceStatus,
        raw_message: &str,
    ) -> Result<FilingOutcome, EngineError> {
        {
            let tx = sm.transaction_mut();
            tx.record_error(
                &self.pool,
                Some("VALIDATION"),
                raw_message,
                Some(json!({"category": ErrorCategory::Validation.to_string()})),
                true,
                true,
            )
            .await?;
        }
        sm.transition(FilingEvent::Fail {
            reason: raw_message.to_string(),
        })
        .await?;
        self.aggregator
            .mark_error(status, Some("VALIDATION"), raw_message)
            .await?;

        let state = sm.current_state();
        Ok(FilingOutcome {
            transaction: sm.transaction().clone(),
            state,
            confirmation_number: None,
            tracks_recorded: Vec::new(),
            classification: None,
        })
    }

    /// Failure with a raw message that has not been classified yet
    /// (transport errors, timeouts, parse failures, session failures).
    async fn handle_failure(
        &self,
        sm: &mut TransactionStateMachine,
        status: &mut VoyageWebserviceStatus,
        request: &FilingRequest,
        raw_message: &str,
    ) -> Result<FilingOutcome, EngineError> {
        let classification = self
            .classifier
            .classify(
                request.country,
                request.webservice_type,
                raw_message,
                Some(sm.transaction().id),
            )
            .await?;
        self.conclude_failure(sm, status, classification, None, raw_message)
            .await
    }

    /// Persist a classified failure and either schedule a retry or settle
    /// into a terminal error.
    async fn conclude_failure(
        &self,
        sm: &mut TransactionStateMachine,
        status: &mut VoyageWebserviceStatus,
        classification: Classification,
        code_hint: Option<&str>,
        raw_message: &str,
    ) -> Result<FilingOutcome, EngineError> {
        let blocking = classification.is_blocking();
        let retryable = classification.is_retryable();
        let retries_remaining = sm.transaction().retries_remaining();
        let will_retry = retryable && !blocking && retries_remaining;
        let manual_review = !will_retry;

        let error_code = classification.error_code().or(code_hint).map(str::to_string);

        {
            let tx = sm.transaction_mut();
            tx.record_error(
                &self.pool,
                error_code.as_deref(),
                raw_message,
                Some(classification.details()),
                blocking,
                manual_review,
            )
            .await?;
        }

        sm.transition(FilingEvent::Fail {
            reason: raw_message.to_string(),
        })
        .await?;

        self.deliver_alert(classification.alert.as_ref()).await;

        if will_retry {
            sm.transition(FilingEvent::ScheduleRetry).await?;
            if let Some(next_retry_at) = sm.transaction().next_retry_at {
                self.aggregator
                    .schedule_retry(status, next_retry_at)
                    .await?;
            }
        } else {
            self.aggregator
                .mark_error(status, error_code.as_deref(), raw_message)
                .await?;
        }

        let state = sm.current_state();
        Ok(FilingOutcome {
            transaction: sm.transaction().clone(),
            state,
            confirmation_number: None,
            tracks_recorded: Vec::new(),
            classification: Some(classification),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize_success(
        &self,
        sm: &mut TransactionStateMachine,
        status: &mut VoyageWebserviceStatus,
        request: &FilingRequest,
        response_body: &[u8],
        confirmation_number: Option<String>,
        external_reference: Option<String>,
        tracks: Vec<String>,
    ) -> Result<FilingOutcome, EngineError> {
        let response_at = Utc::now().naive_utc();
        let response_time_ms = sm
            .transaction()
            .sent_at
            .map(|sent| (response_at - sent).num_milliseconds())
            .unwrap_or_default();

        let response_text = String::from_utf8_lossy(response_body).into_owned();
        {
            let tx = sm.transaction_mut();
            tx.record_success(
                &self.pool,
                &response_text,
                confirmation_number.as_deref(),
                external_reference.as_deref(),
                response_at,
                response_time_ms,
            )
            .await?;
        }
        sm.transition(FilingEvent::Succeed).await?;

        let mut tracks_recorded = Vec::new();
        if !tracks.is_empty() {
            let producing_step = request.process_step.unwrap_or(ProcessStep::RegistrarTitEnvios);
            let recorded = self
                .tracker
                .record(
                    sm.transaction().id,
                    producing_step,
                    &tracks,
                    DomainLinkage {
                        shipment_id: request.shipment_id,
                        ..DomainLinkage::default()
                    },
                )
                .await?;
            tracks_recorded = recorded.into_iter().map(|t| t.token_value).collect();
        }

        if !request.consume_tokens.is_empty() {
            if let Some(step) = request.process_step {
                // The remote side already accepted the call; a consumption
                // failure here is an ordering bug worth surfacing loudly,
                // not a reason to unwind the filing.
                if let Err(err) = self.tracker.consume(&request.consume_tokens, step).await {
                    tracing::error!(
                        transaction_id = %sm.transaction().id,
                        step = %step,
                        error = %err,
                        "token consumption failed after successful filing"
                    );
                    TransactionEvent::append(
                        &self.pool,
                        NewTransactionEvent {
                            transaction_id: sm.transaction().id,
                            event_name: "correlation.consume_failed".to_string(),
                            severity: Severity::Critical,
                            context: Some(json!({
                                "step": step.to_string(),
                                "tokens": request.consume_tokens,
                                "error": err.to_string(),
                            })),
                        },
                    )
                    .await?;
                }
            }
        }

        self.aggregator
            .mark_approved(
                status,
                confirmation_number.as_deref(),
                external_reference.as_deref(),
            )
            .await?;

        let state = sm.current_state();
        Ok(FilingOutcome {
            transaction: sm.transaction().clone(),
            state,
            confirmation_number,
            tracks_recorded,
            classification: None,
        })
    }

    /// Hand an alert to the notification collaborator. Delivery failures are
    /// logged, never propagated: the filing outcome does not depend on the
    /// notification channel.
    async fn deliver_alert(&self, alert: Option<&AlertEvent>) {
        if let Some(alert) = alert {
            if let Err(err) = self.notifier.notify(alert).await {
                tracing::error!(error = %err, "alert notification failed");
            }
        }
    }

    async fn log_auth_refresh(&self, transaction_id: Uuid, raw: &str) -> Result<(), EngineError> {
        tracing::warn!(
            transaction_id = %transaction_id,
            "authentication rejected, refreshing session for one immediate retry"
        );
        TransactionEvent::append(
            &self.pool,
            NewTransactionEvent {
                transaction_id,
                event_name: "session.forced_refresh".to_string(),
                severity: Severity::Warning,
                context: Some(json!({ "raw_message": raw })),
            },
        )
        .await?;
        let _ = self
            .publisher
            .publish(
                "session.forced_refresh",
                json!({ "transaction_id": transaction_id }),
            )
            .await;
        Ok(())
    }
}

/// Rebuild the filing request for a retry from what the transaction row
/// recorded at intent time.
fn rebuild_request(transaction: &FilingTransaction) -> Result<FilingRequest, EngineError> {
    let voyage_id = transaction.voyage_id.ok_or_else(|| {
        EngineError::Build(format!(
            "transaction {} has no voyage and cannot be re-driven",
            transaction.id
        ))
    })?;
    let country = transaction.country_code().ok_or_else(|| {
        EngineError::Build(format!("transaction {} has invalid country", transaction.id))
    })?;
    let webservice_type = transaction.webservice().ok_or_else(|| {
        EngineError::Build(format!(
            "transaction {} has invalid webservice type",
            transaction.id
        ))
    })?;

    Ok(FilingRequest {
        organization_id: transaction.organization_id,
        initiated_by: transaction.initiated_by.clone(),
        voyage_id,
        shipment_id: transaction.shipment_id,
        country,
        webservice_type,
        environment: transaction.environment.clone(),
        target_url: transaction.target_url.clone(),
        process_step: transaction.step(),
        consume_tokens: transaction.tokens_to_consume(),
    })
}
