use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    settled_or_partial, ClaimOutcome, DbPool, FraudReviewRepository, OrderRepository, OrderStore,
    TicketRepository,
};
use crate::error::{AppError, Result};
use crate::models::{FraudReview, Order, Ticket};

/// PostgreSQL-backed order store.
///
/// Ticket insertion and the `SUCCESS` transition share one database
/// transaction, so a crash between them rolls both back and the order stays
/// in `TICKETS_ISSUING`.
pub struct PostgresOrderStore {
    pool: DbPool,
    orders: OrderRepository,
    tickets: TicketRepository,
    reviews: FraudReviewRepository,
}

impl PostgresOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            tickets: TicketRepository::new(pool.clone()),
            reviews: FraudReviewRepository::new(pool.clone()),
            pool,
        }
    }

    /// Applies pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(e.into()))
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert_pending(&self, order: &Order) -> Result<Order> {
        if let Some(inserted) = self.orders.insert_if_absent(order).await? {
            return Ok(inserted);
        }

        self.orders
            .find_by_reference(&order.reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order '{}'", order.reference)))
    }

    async fn claim_for_issuing(&self, candidate: &Order, amount_charged: i64) -> Result<ClaimOutcome> {
        let mut claimed = candidate.clone();
        claimed.begin_issuing(amount_charged);

        if let Some(order) = self.orders.claim(&claimed).await? {
            return Ok(ClaimOutcome::Acquired(order));
        }

        // Lost: the winner's row is committed, read it back instead of retrying.
        let existing = self
            .orders
            .find_by_reference(&candidate.reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order '{}'", candidate.reference)))?;

        Ok(ClaimOutcome::Lost(existing))
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>> {
        self.orders.find_by_reference(reference).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        self.orders.find_by_id(id).await
    }

    async fn mark_failed(&self, reference: &str, reason: &str) -> Result<Option<Order>> {
        self.orders.mark_failed(reference, reason).await
    }

    async fn insert_tickets(&self, tickets: &[Ticket]) -> Result<u64> {
        self.tickets.insert_all(tickets).await
    }

    async fn tickets_for_order(&self, order_id: Uuid) -> Result<Vec<Ticket>> {
        self.tickets.find_by_order(order_id).await
    }

    async fn count_tickets(&self, order_id: Uuid) -> Result<i64> {
        self.tickets.count_by_order(order_id).await
    }

    async fn mark_success(&self, order_id: Uuid) -> Result<Option<Order>> {
        OrderRepository::mark_success(&self.pool, order_id).await
    }

    async fn find_incomplete_success(&self, limit: i64) -> Result<Vec<Order>> {
        self.orders.find_incomplete_success(limit).await
    }

    async fn find_stale_issuing(&self, claimed_before: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
        self.orders.find_stale_issuing(claimed_before, limit).await
    }

    async fn record_fraud_review(&self, review: &FraudReview) -> Result<FraudReview> {
        self.reviews.create(review).await
    }

    async fn fraud_reviews_for(&self, reference: &str) -> Result<Vec<FraudReview>> {
        self.reviews.find_by_reference(reference).await
    }

    async fn open_fraud_reviews(&self, limit: i64) -> Result<Vec<FraudReview>> {
        self.reviews.list_open(limit).await
    }

    async fn commit_issuance(&self, order: &Order, tickets: &[Ticket]) -> Result<Order> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        for ticket in tickets {
            TicketRepository::insert(&mut *tx, ticket).await?;
        }

        match OrderRepository::mark_success(&mut *tx, order.id).await? {
            Some(finalized) => {
                tx.commit().await.map_err(AppError::Database)?;
                Ok(finalized)
            }
            None => {
                tx.rollback().await.map_err(AppError::Database)?;
                settled_or_partial(self, order).await
            }
        }
    }
}
