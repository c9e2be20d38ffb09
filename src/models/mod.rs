pub mod fraud_review;
pub mod metadata;
pub mod order;
pub mod ticket;

pub use fraud_review::{FinalizationTrigger, FraudReview, ReviewKind};
pub use metadata::{OrderMetadata, MAX_TICKETS_PER_ORDER};
pub use order::{CustomerSnapshot, LineItem, Order, OrderStatus, OrderTotals};
pub use ticket::Ticket;

use serde::{Deserialize, Serialize};

/// An order together with its issued tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedOrder {
    pub order: Order,
    pub tickets: Vec<Ticket>,
}

impl FinalizedOrder {
    pub fn new(order: Order, mut tickets: Vec<Ticket>) -> Self {
        tickets.sort_by_key(|t| t.sequence_index);
        Self { order, tickets }
    }

    /// Returns true when every paid unit has a stored ticket.
    pub fn is_complete(&self) -> bool {
        self.tickets.len() as i64 >= self.order.ticket_quantity as i64
    }
}
