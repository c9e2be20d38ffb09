use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::gateway::GatewayVerification;
use crate::idempotency::TicketCodeGenerator;
use crate::models::{LineItem, Order, OrderMetadata, Ticket, MAX_TICKETS_PER_ORDER};

/// Maps a verified payment and its checkout metadata onto an order and its
/// tickets.
///
/// Line items are expanded in order, so ticket `k` of an order always belongs
/// to the same item no matter how many times the tickets are regenerated.
#[derive(Debug, Clone, Default)]
pub struct OrderAssembler {
    codes: TicketCodeGenerator,
}

impl OrderAssembler {
    pub fn new(codes: TicketCodeGenerator) -> Self {
        Self { codes }
    }

    /// Builds the candidate order and its full ticket set.
    pub fn assemble(
        &self,
        verification: &GatewayVerification,
        metadata: &OrderMetadata,
    ) -> Result<(Order, Vec<Ticket>)> {
        let mut order = Order::pending(verification.reference.clone(), metadata)?;
        order.amount_charged = Some(verification.amount);
        let tickets = self.tickets_for(&order)?;
        Ok((order, tickets))
    }

    /// Generates every ticket owed for `order`.
    pub fn tickets_for(&self, order: &Order) -> Result<Vec<Ticket>> {
        let plan = Self::index_plan(order)?;
        let mut tickets = Vec::with_capacity(plan.len());

        for (index, item) in plan {
            let code = self.codes.generate(&order.reference, index as u32)?;
            tickets.push(Ticket::new(order, item, index, code));
        }

        Ok(tickets)
    }

    /// Generates only the tickets whose index is not among `stored`.
    pub fn missing_tickets(&self, order: &Order, stored: &[Ticket]) -> Result<Vec<Ticket>> {
        let present: HashSet<i32> = stored.iter().map(|t| t.sequence_index).collect();
        let mut tickets = Vec::new();

        for (index, item) in Self::index_plan(order)? {
            if present.contains(&index) {
                continue;
            }
            let code = self.codes.generate(&order.reference, index as u32)?;
            tickets.push(Ticket::new(order, item, index, code));
        }

        Ok(tickets)
    }

    /// 1-based ticket indices paired with the line item each one belongs to.
    ///
    /// Refuses expansions past [`MAX_TICKETS_PER_ORDER`] before allocating,
    /// including for rows read back from the store.
    pub fn index_plan(order: &Order) -> Result<Vec<(i32, &LineItem)>> {
        let owed: u64 = order.line_items().iter().map(|i| u64::from(i.quantity)).sum();
        if owed > u64::from(MAX_TICKETS_PER_ORDER) {
            return Err(AppError::Validation(format!(
                "order {} expands to {} tickets, limit is {}",
                order.reference, owed, MAX_TICKETS_PER_ORDER
            )));
        }

        Ok(order
            .line_items()
            .iter()
            .flat_map(|item| std::iter::repeat(item).take(item.quantity as usize))
            .enumerate()
            .map(|(i, item)| (i as i32 + 1, item))
            .collect())
    }

    /// Checks the stored line items agree with the owed ticket count.
    pub fn check_consistency(order: &Order) -> Result<()> {
        let planned = Self::index_plan(order)?.len() as i32;
        if planned != order.ticket_quantity {
            return Err(AppError::Validation(format!(
                "order {} owes {} tickets but its items expand to {}",
                order.reference, order.ticket_quantity, planned
            )));
        }
        Ok(())
    }
}
