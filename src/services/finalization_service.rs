use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::events::{publish_best_effort, EventProducer, FraudMismatchEvent, OrderFinalizedEvent};
use crate::gateway::{GatewayVerification, PaymentGateway, WebhookEvent, WebhookVerifier};
use crate::idempotency::{IdempotencyGuard, Resolution};
use crate::models::{
    FinalizationTrigger, FinalizedOrder, FraudReview, Order, OrderMetadata, ReviewKind,
};
use crate::observability::{get_metrics, mask_email};
use crate::repositories::OrderStore;
use crate::services::{CommitOutcome, FraudCheck, FraudValidator, OrderAssembler, PersistenceCoordinator};

const MAX_REFERENCE_LEN: usize = 100;
const DEFAULT_TICKETS_PER_ORDER: u32 = 100;

/// Successful end states of a finalization request.
#[derive(Debug, Clone)]
pub enum FinalizationOutcome {
    /// This request created the order and its tickets.
    Finalized(FinalizedOrder),
    /// The reference was already finalized; nothing was written.
    AlreadyFinalized(FinalizedOrder),
    /// Another finalizer is still issuing tickets for the reference.
    InProgress(Order),
}

impl FinalizationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizationOutcome::Finalized(_) => "finalized",
            FinalizationOutcome::AlreadyFinalized(_) => "already_finalized",
            FinalizationOutcome::InProgress(_) => "in_progress",
        }
    }

    pub fn order(&self) -> &Order {
        match self {
            FinalizationOutcome::Finalized(f) | FinalizationOutcome::AlreadyFinalized(f) => &f.order,
            FinalizationOutcome::InProgress(order) => order,
        }
    }
}

/// Body returned to the gateway for every authenticated webhook delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub event: Option<String>,
    pub reference: Option<String>,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookAck {
    fn new(event: Option<&WebhookEvent>, outcome: &str, message: Option<String>) -> Self {
        Self {
            received: true,
            event: event.map(|e| e.event.clone()),
            reference: event.map(|e| e.reference().to_string()),
            outcome: outcome.to_string(),
            message,
        }
    }
}

enum Preflight {
    Done(FinalizationOutcome),
    /// Carries the stored row, if any, which anchors the fraud check.
    Proceed(Option<Order>),
}

/// Rejects references the gateway could never have issued.
pub fn validate_reference(reference: &str) -> Result<()> {
    if reference.is_empty() || reference.len() > MAX_REFERENCE_LEN {
        return Err(AppError::Validation(format!(
            "reference must be 1 to {} characters",
            MAX_REFERENCE_LEN
        )));
    }
    if !reference
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '='))
    {
        return Err(AppError::Validation(
            "reference contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Converts verified payments into orders with tickets, from either entry
/// point.
pub struct FinalizationService {
    store: Arc<dyn OrderStore>,
    guard: Arc<IdempotencyGuard>,
    coordinator: Arc<PersistenceCoordinator>,
    assembler: OrderAssembler,
    validator: FraudValidator,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
    gateway_timeout: Duration,
    max_tickets_per_order: u32,
    producer: Option<Arc<EventProducer>>,
}

impl FinalizationService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        guard: Arc<IdempotencyGuard>,
        coordinator: Arc<PersistenceCoordinator>,
        assembler: OrderAssembler,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            guard,
            coordinator,
            assembler,
            validator: FraudValidator::new(),
            gateway,
            verifier,
            gateway_timeout,
            max_tickets_per_order: DEFAULT_TICKETS_PER_ORDER,
            producer: None,
        }
    }

    /// Caps the tickets a single order may carry, summed over its items.
    pub fn with_ticket_limit(mut self, max_tickets_per_order: u32) -> Self {
        self.max_tickets_per_order = max_tickets_per_order;
        self
    }

    pub fn with_producer(mut self, producer: Arc<EventProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn provider(&self) -> &'static str {
        self.gateway.provider()
    }

    /// Metric label for a webhook path segment. Anything other than the
    /// configured gateway collapses to one label.
    fn provider_label(&self, provider: &str) -> &'static str {
        if provider == self.gateway.provider() {
            self.gateway.provider()
        } else {
            "unknown"
        }
    }

    /// Records a `PENDING` order at checkout. Calling it again for the same
    /// reference returns the stored row unchanged.
    pub async fn register_pending(&self, reference: &str, metadata: &OrderMetadata) -> Result<Order> {
        validate_reference(reference)?;
        metadata.validate()?;
        metadata.check_ticket_limit(self.max_tickets_per_order)?;

        let order = self.store.insert_pending(&Order::pending(reference, metadata)?).await?;
        tracing::info!(
            reference = %reference,
            order_id = %order.id,
            status = order.status.as_str(),
            customer = %mask_email(&order.customer.email),
            "Pending order registered"
        );
        Ok(order)
    }

    /// Client poll: verifies the reference with the gateway and finalizes it.
    pub async fn verify_and_finalize(&self, reference: &str) -> Result<FinalizationOutcome> {
        let trigger = FinalizationTrigger::ClientPoll;
        let result = self.poll_inner(reference).await;
        record_outcome(trigger, &result);
        result
    }

    async fn poll_inner(&self, reference: &str) -> Result<FinalizationOutcome> {
        validate_reference(reference)?;

        let stored = match self.preflight(reference).await? {
            Preflight::Done(outcome) => return Ok(outcome),
            Preflight::Proceed(stored) => stored,
        };

        let verification = self.gateway.verify(reference, self.gateway_timeout).await?;
        self.finalize_verified(verification, FinalizationTrigger::ClientPoll, stored)
            .await
    }

    /// Webhook delivery. Authentication failures are the only errors; every
    /// other problem is reported inside the acknowledgement.
    pub async fn handle_webhook(
        &self,
        provider: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck> {
        let label = self.provider_label(provider);
        if provider != self.gateway.provider() {
            get_metrics().record_webhook(label, "unknown_provider");
            return Err(AppError::InvalidSignature(format!("unknown provider '{}'", provider)));
        }

        let signature = signature.ok_or_else(|| {
            get_metrics().record_webhook(label, "unauthenticated");
            AppError::InvalidSignature("missing signature header".to_string())
        })?;
        if let Err(e) = self.verifier.verify(body, signature) {
            get_metrics().record_webhook(label, "unauthenticated");
            tracing::warn!(provider = %label, "Rejected webhook with bad signature");
            return Err(e);
        }

        let ack = self.webhook_inner(body).await;
        get_metrics().record_webhook(label, &ack.outcome);
        Ok(ack)
    }

    async fn webhook_inner(&self, body: &[u8]) -> WebhookAck {
        let event = match WebhookEvent::parse(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Malformed webhook body: {}", e);
                return WebhookAck::new(None, "malformed", Some(e.to_string()));
            }
        };

        if !event.is_charge_success() {
            tracing::debug!(event = %event.event, "Ignoring webhook event");
            return WebhookAck::new(Some(&event), "ignored", None);
        }

        let trigger = FinalizationTrigger::Webhook;
        let result = self.webhook_finalize(&event).await;
        record_outcome(trigger, &result);

        match result {
            Ok(outcome) => WebhookAck::new(Some(&event), outcome.as_str(), None),
            Err(e) => {
                tracing::warn!(
                    reference = %event.reference(),
                    code = e.code(),
                    "Webhook finalization did not complete: {}",
                    e
                );
                WebhookAck::new(Some(&event), "not_finalized", Some(e.code().to_string()))
            }
        }
    }

    async fn webhook_finalize(&self, event: &WebhookEvent) -> Result<FinalizationOutcome> {
        validate_reference(event.reference())?;

        match self.preflight(event.reference()).await? {
            Preflight::Done(outcome) => Ok(outcome),
            Preflight::Proceed(stored) => {
                self.finalize_verified(event.data.clone(), FinalizationTrigger::Webhook, stored)
                    .await
            }
        }
    }

    /// Short-circuits references that are already settled or being settled.
    async fn preflight(&self, reference: &str) -> Result<Preflight> {
        let resolution = match self.guard.resolve(reference).await? {
            Resolution::InProgress(_) => self.guard.await_settled(reference).await?,
            other => other,
        };

        Ok(match resolution {
            Resolution::AlreadyFinalized(finalized) => {
                Preflight::Done(FinalizationOutcome::AlreadyFinalized(finalized))
            }
            Resolution::InProgress(order) => Preflight::Done(FinalizationOutcome::InProgress(order)),
            Resolution::Pending(order) | Resolution::Failed(order) => Preflight::Proceed(Some(order)),
            Resolution::NotFound => Preflight::Proceed(None),
        })
    }

    async fn finalize_verified(
        &self,
        verification: GatewayVerification,
        trigger: FinalizationTrigger,
        stored: Option<Order>,
    ) -> Result<FinalizationOutcome> {
        let reference = verification.reference.clone();

        if !verification.is_successful() {
            if verification.status.is_definitive_failure() {
                let reason = format!("gateway status: {}", verification.status.as_str());
                if let Some(failed) = self.store.mark_failed(&reference, &reason).await? {
                    tracing::info!(reference = %reference, order_id = %failed.id, "Order marked failed");
                }
            }
            return Err(AppError::PaymentNotConfirmed {
                reference,
                status: verification.status.as_str().to_string(),
            });
        }

        let (candidate, tickets) = match stored {
            Some(row) => {
                self.check_amount(&verification, row.expected_amount, trigger).await?;
                let mut candidate = row;
                candidate.amount_charged = Some(verification.amount);
                let tickets = self.assembler.tickets_for(&candidate)?;
                (candidate, tickets)
            }
            None => {
                let metadata = OrderMetadata::from_gateway_value(&verification.metadata)?;
                metadata.check_ticket_limit(self.max_tickets_per_order)?;
                self.check_amount(&verification, metadata.expected_amount, trigger).await?;
                self.assembler.assemble(&verification, &metadata)?
            }
        };

        match self.coordinator.commit(candidate, tickets).await? {
            CommitOutcome::Finalized(finalized) => {
                publish_best_effort(
                    self.producer.as_deref(),
                    OrderFinalizedEvent::from_finalized(&finalized, trigger),
                )
                .await;
                Ok(FinalizationOutcome::Finalized(finalized))
            }
            CommitOutcome::AlreadyFinalized(finalized) => {
                get_metrics().record_lost_race(trigger.as_str());
                Ok(FinalizationOutcome::AlreadyFinalized(finalized))
            }
            CommitOutcome::InProgress(order) => {
                get_metrics().record_lost_race(trigger.as_str());
                Ok(FinalizationOutcome::InProgress(order))
            }
            CommitOutcome::Failed(order) => {
                self.send_to_review(
                    &verification,
                    ReviewKind::SucceededAfterFailure,
                    order.expected_amount,
                    trigger,
                )
                .await?;
                Err(AppError::PaymentNotConfirmed {
                    reference,
                    status: "failed_order_under_review".to_string(),
                })
            }
        }
    }

    async fn check_amount(
        &self,
        verification: &GatewayVerification,
        expected: i64,
        trigger: FinalizationTrigger,
    ) -> Result<()> {
        match self.validator.validate(expected, verification.amount) {
            FraudCheck::Ok => Ok(()),
            FraudCheck::Mismatch { expected, charged } => {
                get_metrics().record_fraud_mismatch(trigger.as_str());
                tracing::error!(
                    reference = %verification.reference,
                    expected_amount = expected,
                    charged_amount = charged,
                    currency = %verification.currency,
                    trigger = trigger.as_str(),
                    "Charged amount does not match expected amount, payment held for review"
                );
                self.send_to_review(verification, ReviewKind::AmountMismatch, expected, trigger)
                    .await?;
                Err(AppError::FraudMismatch {
                    reference: verification.reference.clone(),
                    expected,
                    charged,
                })
            }
        }
    }

    async fn send_to_review(
        &self,
        verification: &GatewayVerification,
        kind: ReviewKind,
        expected: i64,
        trigger: FinalizationTrigger,
    ) -> Result<()> {
        let payload = serde_json::to_value(verification).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("review payload encoding failed: {}", e))
        })?;
        let review = self
            .store
            .record_fraud_review(&FraudReview::new(
                verification.reference.clone(),
                kind,
                expected,
                verification.amount,
                trigger,
                payload,
            ))
            .await?;

        if kind == ReviewKind::SucceededAfterFailure {
            tracing::error!(
                reference = %review.reference,
                review_id = %review.id,
                "Gateway reports success for an order already marked failed"
            );
        }

        publish_best_effort(self.producer.as_deref(), FraudMismatchEvent::from(&review)).await;
        Ok(())
    }

    /// Unresolved manual reviews, oldest first.
    pub async fn open_reviews(&self, limit: i64) -> Result<Vec<FraudReview>> {
        self.store.open_fraud_reviews(limit).await
    }
}

fn record_outcome(trigger: FinalizationTrigger, result: &Result<FinalizationOutcome>) {
    let outcome = match result {
        Ok(outcome) => outcome.as_str(),
        Err(AppError::FraudMismatch { .. }) | Err(AppError::PaymentNotConfirmed { .. }) => "rejected",
        Err(_) => "error",
    };
    get_metrics().record_finalization(trigger.as_str(), outcome);
}
