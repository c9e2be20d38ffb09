pub mod fraud_review_repository;
pub mod memory_store;
pub mod order_repository;
pub mod postgres_store;
pub mod ticket_repository;

pub use fraud_review_repository::FraudReviewRepository;
pub use memory_store::{InMemoryOrderStore, TicketInsertFault};
pub use order_repository::OrderRepository;
pub use postgres_store::PostgresOrderStore;
pub use ticket_repository::TicketRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{FraudReview, Order, OrderStatus, Ticket};

/// Database connection pool type alias.
pub type DbPool = PgPool;

/// Result of the atomic claim on a reference.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// This caller moved the order into `TICKETS_ISSUING`.
    Acquired(Order),
    /// Another caller got there first; carries the order as currently stored.
    Lost(Order),
}

/// The narrow document-store interface the finalization pipeline runs on.
///
/// Every state transition is its own method with a fixed set of fields, and
/// every transition is conditional on the status it leaves. Callers never
/// write arbitrary columns.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a `PENDING` order unless the reference is already known.
    /// Returns the stored row either way.
    async fn insert_pending(&self, order: &Order) -> Result<Order>;

    /// Atomically takes ownership of `candidate.reference`.
    ///
    /// Inserts the candidate directly in `TICKETS_ISSUING` if no row exists, or
    /// moves an existing `PENDING` row to `TICKETS_ISSUING`. Any other existing
    /// row means the claim is lost.
    async fn claim_for_issuing(&self, candidate: &Order, amount_charged: i64) -> Result<ClaimOutcome>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>>;

    /// `PENDING -> FAILED`. Returns `None` if the order was not pending.
    async fn mark_failed(&self, reference: &str, reason: &str) -> Result<Option<Order>>;

    /// Inserts tickets, skipping any `(order_id, sequence_index)` already
    /// stored. Returns the number of rows written.
    async fn insert_tickets(&self, tickets: &[Ticket]) -> Result<u64>;

    async fn tickets_for_order(&self, order_id: Uuid) -> Result<Vec<Ticket>>;

    async fn count_tickets(&self, order_id: Uuid) -> Result<i64>;

    /// `TICKETS_ISSUING -> SUCCESS`, only if every owed ticket is stored.
    /// Returns `None` when either precondition does not hold.
    async fn mark_success(&self, order_id: Uuid) -> Result<Option<Order>>;

    /// `SUCCESS` orders with fewer stored tickets than `ticket_quantity`.
    async fn find_incomplete_success(&self, limit: i64) -> Result<Vec<Order>>;

    /// `TICKETS_ISSUING` orders claimed before `claimed_before`.
    async fn find_stale_issuing(&self, claimed_before: DateTime<Utc>, limit: i64) -> Result<Vec<Order>>;

    async fn record_fraud_review(&self, review: &FraudReview) -> Result<FraudReview>;

    async fn fraud_reviews_for(&self, reference: &str) -> Result<Vec<FraudReview>>;

    /// Unresolved reviews, oldest first.
    async fn open_fraud_reviews(&self, limit: i64) -> Result<Vec<FraudReview>>;

    /// Stores the tickets and advances the order to `SUCCESS`.
    ///
    /// The default runs the two steps separately, relying on the
    /// `TICKETS_ISSUING` marker: a failure between them leaves the order
    /// issuing for the auditor. Stores with transactions override this.
    async fn commit_issuance(&self, order: &Order, tickets: &[Ticket]) -> Result<Order> {
        self.insert_tickets(tickets).await?;

        if let Some(finalized) = self.mark_success(order.id).await? {
            return Ok(finalized);
        }

        settled_or_partial(self, order).await
    }
}

/// Resolves a `mark_success` that did not apply: either a concurrent
/// completer already finished the order, or issuance is short.
pub(crate) async fn settled_or_partial<S: OrderStore + ?Sized>(store: &S, order: &Order) -> Result<Order> {
    let current = store
        .find_by_id(order.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {} vanished during issuance", order.id)))?;

    if current.status == OrderStatus::Success {
        return Ok(current);
    }

    let stored = store.count_tickets(order.id).await?;
    Err(AppError::PartialCommitFailure {
        reference: order.reference.clone(),
        reason: format!(
            "{} of {} tickets stored, order left in {}",
            stored,
            current.ticket_quantity,
            current.status.as_str()
        ),
    })
}
