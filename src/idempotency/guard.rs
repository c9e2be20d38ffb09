use std::sync::Arc;
use std::time::Duration;

use crate::cache::FinalizedOrderCache;
use crate::config::FinalizationSettings;
use crate::error::Result;
use crate::models::{FinalizedOrder, Order, OrderStatus};
use crate::repositories::{ClaimOutcome, OrderStore};

/// What the store currently knows about a reference.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// No row for the reference.
    NotFound,
    /// Registered at checkout, not yet claimed.
    Pending(Order),
    /// A finalizer holds the claim and has not confirmed issuance.
    InProgress(Order),
    /// `SUCCESS`, with whatever tickets are stored.
    AlreadyFinalized(FinalizedOrder),
    /// The gateway declared the payment unsuccessful.
    Failed(Order),
}

impl Resolution {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Resolution::InProgress(_))
    }
}

/// Guards a reference so exactly one caller moves it past `PENDING`.
///
/// There is no process-local locking: `claim` is a single conditional write in
/// the store and a caller that loses reads the winner's row back.
pub struct IdempotencyGuard {
    store: Arc<dyn OrderStore>,
    cache: Option<Arc<FinalizedOrderCache>>,
    settle_timeout: Duration,
    poll_interval: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn OrderStore>, settings: &FinalizationSettings) -> Self {
        Self {
            store,
            cache: None,
            settle_timeout: Duration::from_millis(settings.settle_timeout_ms),
            poll_interval: Duration::from_millis(settings.settle_poll_interval_ms.max(1)),
        }
    }

    pub fn with_cache(mut self, cache: Arc<FinalizedOrderCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn resolve(&self, reference: &str) -> Result<Resolution> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(reference).await {
                return Ok(Resolution::AlreadyFinalized(cached));
            }
        }

        let Some(order) = self.store.find_by_reference(reference).await? else {
            return Ok(Resolution::NotFound);
        };

        Ok(match order.status {
            OrderStatus::Pending => Resolution::Pending(order),
            OrderStatus::TicketsIssuing => Resolution::InProgress(order),
            OrderStatus::Failed => Resolution::Failed(order),
            OrderStatus::Success => Resolution::AlreadyFinalized(self.finalized(order).await?),
        })
    }

    /// Attempts the `PENDING`/absent to `TICKETS_ISSUING` transition.
    pub async fn claim(&self, candidate: &Order, amount_charged: i64) -> Result<ClaimOutcome> {
        let outcome = self.store.claim_for_issuing(candidate, amount_charged).await?;

        match &outcome {
            ClaimOutcome::Acquired(order) => tracing::debug!(
                reference = %order.reference,
                order_id = %order.id,
                "Claim acquired"
            ),
            ClaimOutcome::Lost(order) => tracing::info!(
                reference = %order.reference,
                order_id = %order.id,
                status = order.status.as_str(),
                "Claim lost to concurrent finalizer"
            ),
        }

        Ok(outcome)
    }

    /// Loads the stored tickets of a `SUCCESS` order and caches the result.
    pub async fn finalized(&self, order: Order) -> Result<FinalizedOrder> {
        let tickets = self.store.tickets_for_order(order.id).await?;
        let finalized = FinalizedOrder::new(order, tickets);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&finalized).await {
                tracing::warn!(reference = %finalized.order.reference, "Failed to cache finalized order: {}", e);
            }
        }

        Ok(finalized)
    }

    /// Re-reads the reference until it leaves `TICKETS_ISSUING` or the settle
    /// timeout elapses. On timeout the last `InProgress` is returned.
    pub async fn await_settled(&self, reference: &str) -> Result<Resolution> {
        let deadline = tokio::time::Instant::now() + self.settle_timeout;

        loop {
            let resolution = self.resolve(reference).await?;
            if resolution.is_settled() || tokio::time::Instant::now() >= deadline {
                return Ok(resolution);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
