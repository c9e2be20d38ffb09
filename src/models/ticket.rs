use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::order::{LineItem, Order};

/// An admission ticket issued for one paid unit of a line item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub order_id: Uuid,
    /// 1-based position within the order; unique per order.
    pub sequence_index: i32,
    /// Globally unique redemption code.
    pub code: String,
    pub event_id: String,
    pub event_title: String,
    pub tier_name: String,
    pub price: Decimal,
    pub owner_name: String,
    pub owner_email: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Creates an unused ticket for a line item of an order.
    pub fn new(order: &Order, item: &LineItem, sequence_index: i32, code: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            sequence_index,
            code,
            event_id: item.event_id.clone(),
            event_title: item.event_title.clone(),
            tier_name: item.tier_name.clone(),
            price: item.unit_price,
            owner_name: order.customer.name.clone(),
            owner_email: order.customer.email.clone(),
            used: false,
            used_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
