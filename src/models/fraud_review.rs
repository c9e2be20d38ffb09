use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Why a payment was routed to manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewKind {
    /// Charged amount differs from the expected amount.
    AmountMismatch,
    /// Gateway reports success for an order already marked failed.
    SucceededAfterFailure,
}

/// Which entry point observed the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalizationTrigger {
    ClientPoll,
    Webhook,
    /// The auditor resumed an order parked in issuing.
    Reconciliation,
}

impl FinalizationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizationTrigger::ClientPoll => "client_poll",
            FinalizationTrigger::Webhook => "webhook",
            FinalizationTrigger::Reconciliation => "reconciliation",
        }
    }
}

/// A payment held back from finalization for a human to inspect.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FraudReview {
    pub id: Uuid,
    pub reference: String,
    pub kind: ReviewKind,
    pub expected_amount: i64,
    pub charged_amount: i64,
    pub trigger: FinalizationTrigger,
    /// Raw gateway payload as received.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl FraudReview {
    pub fn new(
        reference: impl Into<String>,
        kind: ReviewKind,
        expected_amount: i64,
        charged_amount: i64,
        trigger: FinalizationTrigger,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference: reference.into(),
            kind,
            expected_amount,
            charged_amount,
            trigger,
            payload,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}
