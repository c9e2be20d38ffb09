use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FinalizationTrigger, FinalizedOrder, FraudReview, ReviewKind};

/// Topic names, relative to the configured prefix.
pub mod topics {
    pub const ORDERS_FINALIZED: &str = "orders.finalized";
    pub const FRAUD_REVIEWS: &str = "fraud.reviews";
    pub const TICKETS_REPAIRED: &str = "tickets.repaired";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    OrderFinalized,
    FraudMismatchDetected,
    TicketsRepaired,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderFinalized => "ORDER_FINALIZED",
            EventType::FraudMismatchDetected => "FRAUD_MISMATCH_DETECTED",
            EventType::TicketsRepaired => "TICKETS_REPAIRED",
        }
    }
}

/// A payload that knows where it is published.
pub trait DomainEvent: Serialize {
    const EVENT_TYPE: EventType;

    fn topic() -> &'static str;

    /// Partition key; every event of one order shares it.
    fn key(&self) -> &str;
}

/// Envelope wrapping all events with common metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub payload: T,
}

impl<T: DomainEvent> EventEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: T::EVENT_TYPE,
            timestamp: Utc::now(),
            source: "finalization-engine".to_string(),
            payload,
        }
    }
}

/// Emitted once per order when it reaches `SUCCESS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFinalizedEvent {
    pub order_id: Uuid,
    pub reference: String,
    pub trigger: FinalizationTrigger,
    pub amount_charged: i64,
    pub currency: String,
    pub ticket_codes: Vec<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl OrderFinalizedEvent {
    pub fn from_finalized(finalized: &FinalizedOrder, trigger: FinalizationTrigger) -> Self {
        Self {
            order_id: finalized.order.id,
            reference: finalized.order.reference.clone(),
            trigger,
            amount_charged: finalized.order.amount_charged.unwrap_or_default(),
            currency: finalized.order.currency.clone(),
            ticket_codes: finalized.tickets.iter().map(|t| t.code.clone()).collect(),
            finalized_at: finalized.order.finalized_at,
        }
    }
}

impl DomainEvent for OrderFinalizedEvent {
    const EVENT_TYPE: EventType = EventType::OrderFinalized;

    fn topic() -> &'static str {
        topics::ORDERS_FINALIZED
    }

    fn key(&self) -> &str {
        &self.reference
    }
}

/// Emitted when a payment is routed to manual review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudMismatchEvent {
    pub review_id: Uuid,
    pub reference: String,
    pub kind: ReviewKind,
    pub expected_amount: i64,
    pub charged_amount: i64,
    pub trigger: FinalizationTrigger,
}

impl From<&FraudReview> for FraudMismatchEvent {
    fn from(review: &FraudReview) -> Self {
        Self {
            review_id: review.id,
            reference: review.reference.clone(),
            kind: review.kind,
            expected_amount: review.expected_amount,
            charged_amount: review.charged_amount,
            trigger: review.trigger,
        }
    }
}

impl DomainEvent for FraudMismatchEvent {
    const EVENT_TYPE: EventType = EventType::FraudMismatchDetected;

    fn topic() -> &'static str {
        topics::FRAUD_REVIEWS
    }

    fn key(&self) -> &str {
        &self.reference
    }
}

/// Emitted by the reconciliation auditor after it inserted tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketsRepairedEvent {
    pub order_id: Uuid,
    pub reference: String,
    pub inserted_indices: Vec<i32>,
    pub ticket_count: i64,
    pub repaired_at: DateTime<Utc>,
}

impl DomainEvent for TicketsRepairedEvent {
    const EVENT_TYPE: EventType = EventType::TicketsRepaired;

    fn topic() -> &'static str {
        topics::TICKETS_REPAIRED
    }

    fn key(&self) -> &str {
        &self.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_carries_event_type() {
        let envelope = EventEnvelope::new(TicketsRepairedEvent {
            order_id: Uuid::new_v4(),
            reference: "TIX_ABC".to_string(),
            inserted_indices: vec![2, 3],
            ticket_count: 3,
            repaired_at: Utc::now(),
        });

        assert_eq!(envelope.event_type, EventType::TicketsRepaired);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["event_type"], "TICKETS_REPAIRED");
        assert_eq!(json["payload"]["inserted_indices"], serde_json::json!([2, 3]));
    }

    #[test]
    fn test_fraud_event_from_review() {
        let review = FraudReview::new(
            "TIX_ABC",
            ReviewKind::AmountMismatch,
            500000,
            450000,
            FinalizationTrigger::Webhook,
            serde_json::Value::Null,
        );
        let event = FraudMismatchEvent::from(&review);
        assert_eq!(event.key(), "TIX_ABC");
        assert_eq!(FraudMismatchEvent::topic(), "fraud.reviews");
    }
}
