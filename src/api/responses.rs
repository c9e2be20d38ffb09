use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FinalizedOrder, LineItem, Order, OrderStatus, Ticket};
use crate::services::FinalizationOutcome;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    /// The same request may succeed if repeated later.
    #[serde(default)]
    pub retryable: bool,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
            details: None,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Validation error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// Order DTO. Line items are returned as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub reference: String,
    pub status: OrderStatus,
    pub currency: String,
    pub expected_amount: i64,
    pub amount_charged: Option<i64>,
    pub total: Decimal,
    pub customer_name: String,
    pub customer_email: String,
    pub items: Vec<LineItem>,
    pub ticket_quantity: i32,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            reference: order.reference,
            status: order.status,
            currency: order.currency,
            expected_amount: order.expected_amount,
            amount_charged: order.amount_charged,
            total: order.totals.total,
            customer_name: order.customer.name,
            customer_email: order.customer.email,
            items: order.items.0,
            ticket_quantity: order.ticket_quantity,
            finalized_at: order.finalized_at,
            created_at: order.created_at,
        }
    }
}

/// Ticket DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResponse {
    pub id: Uuid,
    pub sequence_index: i32,
    pub code: String,
    pub event_id: String,
    pub event_title: String,
    pub tier_name: String,
    pub price: Decimal,
    pub owner_name: String,
    pub used: bool,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            sequence_index: ticket.sequence_index,
            code: ticket.code,
            event_id: ticket.event_id,
            event_title: ticket.event_title,
            tier_name: ticket.tier_name,
            price: ticket.price,
            owner_name: ticket.owner_name,
            used: ticket.used,
        }
    }
}

/// Body of a successful verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationResponse {
    /// `finalized`, `already_finalized` or `in_progress`.
    pub outcome: String,
    pub order: OrderResponse,
    pub tickets: Vec<TicketResponse>,
}

impl FinalizationResponse {
    fn from_finalized(outcome: &str, finalized: FinalizedOrder) -> Self {
        Self {
            outcome: outcome.to_string(),
            order: finalized.order.into(),
            tickets: finalized.tickets.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<FinalizationOutcome> for FinalizationResponse {
    fn from(outcome: FinalizationOutcome) -> Self {
        let label = outcome.as_str();
        match outcome {
            FinalizationOutcome::Finalized(f) | FinalizationOutcome::AlreadyFinalized(f) => {
                Self::from_finalized(label, f)
            }
            FinalizationOutcome::InProgress(order) => Self {
                outcome: label.to_string(),
                order: order.into(),
                tickets: Vec::new(),
            },
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Ids of success orders whose ticket set is incomplete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokenOrdersResponse {
    pub count: usize,
    pub order_ids: Vec<Uuid>,
}
