use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ClaimOutcome, OrderStore};
use crate::error::{AppError, Result};
use crate::models::{FraudReview, Order, OrderStatus, Ticket};

/// A failure to inject into the next `insert_tickets` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketInsertFault {
    /// Store nothing and return an error.
    Fail,
    /// Store the first `n` tickets, then return an error.
    StoreFirst(usize),
}

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    by_reference: HashMap<String, Uuid>,
    tickets: HashMap<(Uuid, i32), Ticket>,
    codes: HashMap<String, (Uuid, i32)>,
    reviews: Vec<FraudReview>,
    faults: VecDeque<TicketInsertFault>,
}

impl Inner {
    fn ticket_count(&self, order_id: Uuid) -> i64 {
        self.tickets.keys().filter(|(id, _)| *id == order_id).count() as i64
    }

    fn insert_ticket(&mut self, ticket: &Ticket) -> u64 {
        let key = (ticket.order_id, ticket.sequence_index);
        if self.tickets.contains_key(&key) || self.codes.contains_key(&ticket.code) {
            return 0;
        }
        self.codes.insert(ticket.code.clone(), key);
        self.tickets.insert(key, ticket.clone());
        1
    }
}

/// Order store held in process memory.
///
/// Each method holds one lock for its whole body, which gives the same
/// per-statement atomicity as the database. Ticket insertion and the success
/// transition are separate calls, so the default non-transactional
/// `commit_issuance` applies. Faults can be queued to exercise the
/// partial-commit path.
#[derive(Default)]
pub struct InMemoryOrderStore {
    inner: Mutex<Inner>,
    ticket_insert_calls: AtomicU64,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fault for an upcoming `insert_tickets` call.
    pub async fn inject_ticket_fault(&self, fault: TicketInsertFault) {
        self.inner.lock().await.faults.push_back(fault);
    }

    /// Writes an order as-is, bypassing every transition guard.
    pub async fn force_insert_order(&self, order: Order) {
        let mut inner = self.inner.lock().await;
        inner.by_reference.insert(order.reference.clone(), order.id);
        inner.orders.insert(order.id, order);
    }

    /// Deletes stored tickets of an order, keeping the first `keep` by index.
    pub async fn delete_tickets(&self, order_id: Uuid, keep: usize) {
        let mut inner = self.inner.lock().await;
        let mut indices: Vec<i32> = inner
            .tickets
            .keys()
            .filter(|(id, _)| *id == order_id)
            .map(|(_, idx)| *idx)
            .collect();
        indices.sort_unstable();

        for idx in indices.into_iter().skip(keep) {
            if let Some(ticket) = inner.tickets.remove(&(order_id, idx)) {
                inner.codes.remove(&ticket.code);
            }
        }
    }

    pub async fn order_count(&self) -> usize {
        self.inner.lock().await.orders.len()
    }

    pub async fn total_ticket_count(&self) -> usize {
        self.inner.lock().await.tickets.len()
    }

    /// Number of `insert_tickets` calls made so far, faulted ones included.
    pub fn ticket_insert_calls(&self) -> u64 {
        self.ticket_insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_pending(&self, order: &Order) -> Result<Order> {
        let mut inner = self.inner.lock().await;

        if let Some(id) = inner.by_reference.get(&order.reference) {
            if let Some(existing) = inner.orders.get(id) {
                return Ok(existing.clone());
            }
        }

        inner.by_reference.insert(order.reference.clone(), order.id);
        inner.orders.insert(order.id, order.clone());
        Ok(order.clone())
    }

    async fn claim_for_issuing(&self, candidate: &Order, amount_charged: i64) -> Result<ClaimOutcome> {
        let mut inner = self.inner.lock().await;

        if let Some(id) = inner.by_reference.get(&candidate.reference).copied() {
            if let Some(existing) = inner.orders.get_mut(&id) {
                if existing.status != OrderStatus::Pending {
                    return Ok(ClaimOutcome::Lost(existing.clone()));
                }
                existing.begin_issuing(amount_charged);
                return Ok(ClaimOutcome::Acquired(existing.clone()));
            }
        }

        let mut claimed = candidate.clone();
        claimed.begin_issuing(amount_charged);
        inner.by_reference.insert(claimed.reference.clone(), claimed.id);
        inner.orders.insert(claimed.id, claimed.clone());
        Ok(ClaimOutcome::Acquired(claimed))
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .by_reference
            .get(reference)
            .and_then(|id| inner.orders.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.inner.lock().await.orders.get(&id).cloned())
    }

    async fn mark_failed(&self, reference: &str, reason: &str) -> Result<Option<Order>> {
        let mut inner = self.inner.lock().await;
        let Some(id) = inner.by_reference.get(reference).copied() else {
            return Ok(None);
        };

        match inner.orders.get_mut(&id) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.mark_failed(reason);
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_tickets(&self, tickets: &[Ticket]) -> Result<u64> {
        self.ticket_insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;

        let (batch, fault) = match inner.faults.pop_front() {
            None => (tickets, None),
            Some(TicketInsertFault::Fail) => (&tickets[..0], Some(TicketInsertFault::Fail)),
            Some(TicketInsertFault::StoreFirst(n)) => {
                (&tickets[..n.min(tickets.len())], Some(TicketInsertFault::StoreFirst(n)))
            }
        };

        let written = batch.iter().map(|t| inner.insert_ticket(t)).sum();

        match fault {
            None => Ok(written),
            Some(fault) => Err(AppError::Internal(anyhow::anyhow!(
                "injected ticket insert fault: {:?}",
                fault
            ))),
        }
    }

    async fn tickets_for_order(&self, order_id: Uuid) -> Result<Vec<Ticket>> {
        let inner = self.inner.lock().await;
        let mut tickets: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.sequence_index);
        Ok(tickets)
    }

    async fn count_tickets(&self, order_id: Uuid) -> Result<i64> {
        Ok(self.inner.lock().await.ticket_count(order_id))
    }

    async fn mark_success(&self, order_id: Uuid) -> Result<Option<Order>> {
        let mut inner = self.inner.lock().await;
        let stored = inner.ticket_count(order_id);

        match inner.orders.get_mut(&order_id) {
            Some(order)
                if order.status == OrderStatus::TicketsIssuing
                    && stored >= order.ticket_quantity as i64 =>
            {
                order.mark_success();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_incomplete_success(&self, limit: i64) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut broken: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::Success
                    && inner.ticket_count(o.id) < o.ticket_quantity as i64
            })
            .cloned()
            .collect();
        broken.sort_by_key(|o| o.updated_at);
        broken.truncate(limit.max(0) as usize);
        Ok(broken)
    }

    async fn find_stale_issuing(&self, claimed_before: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut stale: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::TicketsIssuing
                    && o.issuing_started_at.map_or(false, |t| t < claimed_before)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.issuing_started_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn record_fraud_review(&self, review: &FraudReview) -> Result<FraudReview> {
        self.inner.lock().await.reviews.push(review.clone());
        Ok(review.clone())
    }

    async fn fraud_reviews_for(&self, reference: &str) -> Result<Vec<FraudReview>> {
        Ok(self
            .inner
            .lock()
            .await
            .reviews
            .iter()
            .filter(|r| r.reference == reference)
            .cloned()
            .collect())
    }

    async fn open_fraud_reviews(&self, limit: i64) -> Result<Vec<FraudReview>> {
        Ok(self
            .inner
            .lock()
            .await
            .reviews
            .iter()
            .filter(|r| r.resolved_at.is_none())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
