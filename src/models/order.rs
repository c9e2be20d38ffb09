use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::metadata::{OrderMetadata, MAX_TICKETS_PER_ORDER};
use crate::error::{AppError, Result};

/// Status of an order in its finalization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created at checkout initiation, payment not yet confirmed.
    Pending,
    /// Claimed by a finalizer; ticket issuance attempted but not confirmed.
    TicketsIssuing,
    /// Payment verified and every ticket durably stored.
    Success,
    /// Gateway declared the payment unsuccessful.
    Failed,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    pub fn is_final(&self) -> bool {
        matches!(self, OrderStatus::Success | OrderStatus::Failed)
    }

    /// Returns true if a finalizer currently owns the order.
    pub fn is_issuing(&self) -> bool {
        matches!(self, OrderStatus::TicketsIssuing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::TicketsIssuing => "TICKETS_ISSUING",
            OrderStatus::Success => "SUCCESS",
            OrderStatus::Failed => "FAILED",
        }
    }
}

/// One purchased tier of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub event_id: String,
    pub event_title: String,
    pub tier_name: String,
    pub quantity: u32,
    /// Unit price in major currency units.
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Customer details captured at checkout, denormalized onto tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CustomerSnapshot {
    #[sqlx(rename = "customer_name")]
    pub name: String,
    #[sqlx(rename = "customer_email")]
    pub email: String,
    #[sqlx(rename = "customer_phone")]
    #[serde(default)]
    pub phone: Option<String>,
}

/// Totals the checkout flow computed, in major currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub fee: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
}

/// A ticket order keyed by its gateway reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub reference: String,
    pub status: OrderStatus,
    pub currency: String,
    /// Amount the checkout sealed, in minor units.
    pub expected_amount: i64,
    /// Amount the gateway reports as charged, in minor units.
    pub amount_charged: Option<i64>,
    #[sqlx(flatten)]
    pub totals: OrderTotals,
    #[sqlx(flatten)]
    pub customer: CustomerSnapshot,
    pub items: Json<Vec<LineItem>>,
    /// Tickets owed: sum of quantities across items.
    pub ticket_quantity: i32,
    pub failure_reason: Option<String>,
    pub issuing_started_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order from checkout metadata. Fails when the items
    /// owe more tickets than an order may carry.
    pub fn pending(reference: impl Into<String>, metadata: &OrderMetadata) -> Result<Self> {
        metadata.check_ticket_limit(MAX_TICKETS_PER_ORDER)?;
        let ticket_quantity = i32::try_from(metadata.ticket_count()).map_err(|_| {
            AppError::Validation(format!("ticket count {} out of range", metadata.ticket_count()))
        })?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            reference: reference.into(),
            status: OrderStatus::Pending,
            currency: metadata.currency.clone(),
            expected_amount: metadata.expected_amount,
            amount_charged: None,
            totals: metadata.totals.clone(),
            customer: metadata.customer.clone(),
            items: Json(metadata.items.clone()),
            ticket_quantity,
            failure_reason: None,
            issuing_started_at: None,
            finalized_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.items.0
    }

    /// Moves the order into TICKETS_ISSUING with the verified charge.
    pub fn begin_issuing(&mut self, amount_charged: i64) {
        let now = Utc::now();
        self.status = OrderStatus::TicketsIssuing;
        self.amount_charged = Some(amount_charged);
        self.issuing_started_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_success(&mut self) {
        let now = Utc::now();
        self.status = OrderStatus::Success;
        self.finalized_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = OrderStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Only a pending order can be claimed by a finalizer.
    pub fn can_claim(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn metadata() -> OrderMetadata {
        OrderMetadata {
            customer: CustomerSnapshot {
                name: "Ada Obi".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            items: vec![
                LineItem {
                    event_id: "evt-1".to_string(),
                    event_title: "Lagos Jazz Night".to_string(),
                    tier_name: "Regular".to_string(),
                    quantity: 2,
                    unit_price: dec!(2000),
                },
                LineItem {
                    event_id: "evt-1".to_string(),
                    event_title: "Lagos Jazz Night".to_string(),
                    tier_name: "VIP".to_string(),
                    quantity: 1,
                    unit_price: dec!(1000),
                },
            ],
            totals: OrderTotals {
                subtotal: dec!(5000),
                fee: dec!(0),
                vat: dec!(0),
                total: dec!(5000),
            },
            expected_amount: 500000,
            currency: "NGN".to_string(),
        }
    }

    #[test]
    fn test_pending_order_from_metadata() {
        let order = Order::pending("TIX_ABC", &metadata()).unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.expected_amount, 500000);
        assert_eq!(order.ticket_quantity, 3);
        assert!(order.amount_charged.is_none());
        assert!(order.can_claim());
    }

    #[test]
    fn test_oversized_quantity_never_wraps_ticket_count() {
        let mut metadata = metadata();
        metadata.items[0].quantity = 3_000_000_000;
        let err = Order::pending("TIX_HUGE", &metadata).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        metadata.items[0].quantity = u32::MAX;
        metadata.items[1].quantity = 1;
        assert!(Order::pending("TIX_HUGE", &metadata).is_err());
    }

    #[test]
    fn test_status_lifecycle() {
        let mut order = Order::pending("TIX_ABC", &metadata()).unwrap();

        order.begin_issuing(500000);
        assert!(order.status.is_issuing());
        assert!(!order.can_claim());
        assert_eq!(order.amount_charged, Some(500000));

        order.mark_success();
        assert!(order.status.is_final());
        assert!(order.finalized_at.is_some());
    }

    #[test]
    fn test_status_strings_match_storage() {
        assert_eq!(OrderStatus::TicketsIssuing.as_str(), "TICKETS_ISSUING");
        let json = serde_json::to_string(&OrderStatus::TicketsIssuing).unwrap();
        assert_eq!(json, "\"TICKETS_ISSUING\"");
    }

    #[test]
    fn test_line_total() {
        let item = &metadata().items[0];
        assert_eq!(item.line_total(), dec!(4000));
    }
}
