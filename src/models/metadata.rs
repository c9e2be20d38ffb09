use serde::{Deserialize, Serialize};

use super::order::{CustomerSnapshot, LineItem, OrderTotals};
use crate::error::{AppError, Result};

/// Hard ceiling on tickets per order, whatever the configured limit.
/// Keeps the owed count and every sequence index inside `i32`.
pub const MAX_TICKETS_PER_ORDER: u32 = 10_000;

/// Checkout payload round-tripped through the gateway.
///
/// The gateway's charged amount is trusted over anything the client says; the
/// `expected_amount` sealed here is trusted over a client-supplied total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMetadata {
    pub customer: CustomerSnapshot,
    pub items: Vec<LineItem>,
    pub totals: OrderTotals,
    /// Amount the checkout expects the gateway to charge, in minor units.
    pub expected_amount: i64,
    pub currency: String,
}

impl OrderMetadata {
    /// Decodes metadata from a gateway payload.
    ///
    /// Some gateways echo metadata back as a JSON-encoded string rather than
    /// an object; both forms are accepted.
    pub fn from_gateway_value(value: &serde_json::Value) -> Result<Self> {
        let metadata: OrderMetadata = match value {
            serde_json::Value::String(raw) => serde_json::from_str(raw),
            serde_json::Value::Null => {
                return Err(AppError::Validation(
                    "payment carries no order metadata".to_string(),
                ))
            }
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| AppError::Validation(format!("malformed order metadata: {}", e)))?;

        metadata.validate()?;
        Ok(metadata)
    }

    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(AppError::Validation(
                "order metadata has no line items".to_string(),
            ));
        }
        if let Some(item) = self.items.iter().find(|i| i.quantity == 0) {
            return Err(AppError::Validation(format!(
                "line item '{}' has zero quantity",
                item.tier_name
            )));
        }
        if self.expected_amount <= 0 {
            return Err(AppError::Validation(
                "expected amount must be positive".to_string(),
            ));
        }
        if self.customer.email.trim().is_empty() {
            return Err(AppError::Validation(
                "customer email is required".to_string(),
            ));
        }
        self.check_ticket_limit(MAX_TICKETS_PER_ORDER)
    }

    /// Rejects orders whose line items, alone or together, owe more than
    /// `limit` tickets.
    pub fn check_ticket_limit(&self, limit: u32) -> Result<()> {
        let limit = limit.min(MAX_TICKETS_PER_ORDER);
        if let Some(item) = self.items.iter().find(|i| i.quantity > limit) {
            return Err(AppError::Validation(format!(
                "line item '{}' requests {} tickets, limit is {}",
                item.tier_name, item.quantity, limit
            )));
        }

        let total = self.ticket_count();
        if total > u64::from(limit) {
            return Err(AppError::Validation(format!(
                "order requests {} tickets, limit is {}",
                total, limit
            )));
        }
        Ok(())
    }

    /// Total number of tickets owed across all line items.
    pub fn ticket_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}
