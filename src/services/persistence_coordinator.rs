use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::idempotency::{IdempotencyGuard, Resolution};
use crate::models::{FinalizedOrder, Order, OrderStatus, Ticket};
use crate::observability::{get_metrics, LatencyTimer};
use crate::repositories::{ClaimOutcome, OrderStore};
use crate::services::OrderAssembler;

/// Result of handing an order to the coordinator.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// This caller won the claim and every ticket is stored.
    Finalized(FinalizedOrder),
    /// Another caller finalized the reference; this is its result.
    AlreadyFinalized(FinalizedOrder),
    /// Another caller holds the claim and had not finished within the settle
    /// timeout.
    InProgress(Order),
    /// The reference is recorded as failed by the gateway.
    Failed(Order),
}

/// Drives an order through `PENDING -> TICKETS_ISSUING -> SUCCESS`.
///
/// `SUCCESS` is only reachable through [`OrderStore::commit_issuance`], which
/// refuses the transition until every owed ticket is stored.
pub struct PersistenceCoordinator {
    store: Arc<dyn OrderStore>,
    guard: Arc<IdempotencyGuard>,
    assembler: OrderAssembler,
}

impl PersistenceCoordinator {
    pub fn new(store: Arc<dyn OrderStore>, guard: Arc<IdempotencyGuard>, assembler: OrderAssembler) -> Self {
        Self {
            store,
            guard,
            assembler,
        }
    }

    /// Claims `order.reference` and issues `tickets` for it.
    ///
    /// If a `PENDING` row already existed, the claimed row keeps its own id and
    /// the tickets are regenerated against it. Losing the claim is not an
    /// error: the winner's result is returned.
    pub async fn commit(&self, order: Order, tickets: Vec<Ticket>) -> Result<CommitOutcome> {
        let amount_charged = order.amount_charged.ok_or_else(|| {
            AppError::Validation(format!("order {} has no charged amount", order.reference))
        })?;

        match self.guard.claim(&order, amount_charged).await? {
            ClaimOutcome::Lost(existing) => self.converge(existing).await,
            ClaimOutcome::Acquired(claimed) => {
                let tickets = if claimed.id == order.id {
                    tickets
                } else {
                    self.assembler.tickets_for(&claimed)?
                };
                let finalized = self.issue(claimed, tickets).await?;
                Ok(CommitOutcome::Finalized(finalized))
            }
        }
    }

    /// Finishes an order parked in `TICKETS_ISSUING`, inserting only the
    /// indices not yet stored. Returns the finalized order and the indices
    /// that were written.
    pub async fn resume(&self, order: &Order) -> Result<(FinalizedOrder, Vec<i32>)> {
        if order.status != OrderStatus::TicketsIssuing {
            return Err(AppError::Validation(format!(
                "order {} is {}, not issuing",
                order.reference,
                order.status.as_str()
            )));
        }

        let stored = self.store.tickets_for_order(order.id).await?;
        let missing = self.assembler.missing_tickets(order, &stored)?;
        let indices: Vec<i32> = missing.iter().map(|t| t.sequence_index).collect();

        let finalized = self.issue(order.clone(), missing).await?;
        Ok((finalized, indices))
    }

    /// Runs the commit on its own task so dropping the caller's future cannot
    /// abandon it halfway.
    async fn issue(&self, claimed: Order, tickets: Vec<Ticket>) -> Result<FinalizedOrder> {
        let timer = LatencyTimer::new();
        let reference = claimed.reference.clone();
        let issued = tickets.len() as u64;

        let store = self.store.clone();
        let task = tokio::spawn(async move {
            let order = store.commit_issuance(&claimed, &tickets).await?;
            let stored = store.tickets_for_order(order.id).await?;
            Ok::<_, AppError>(FinalizedOrder::new(order, stored))
        });

        let result = match task.await {
            Ok(result) => result,
            Err(join_error) => Err(AppError::Internal(anyhow::anyhow!(
                "issuance task aborted: {}",
                join_error
            ))),
        };

        get_metrics().record_commit_latency(timer.elapsed_ms());

        match result {
            Ok(finalized) => {
                get_metrics().record_tickets_issued(issued);
                tracing::info!(
                    reference = %reference,
                    order_id = %finalized.order.id,
                    tickets = finalized.tickets.len(),
                    "Order finalized"
                );
                Ok(finalized)
            }
            Err(err) => {
                get_metrics().record_partial_commit();
                tracing::error!(
                    reference = %reference,
                    error = %err,
                    "Ticket issuance incomplete, order left for the auditor"
                );
                Err(match err {
                    partial @ AppError::PartialCommitFailure { .. } => partial,
                    other => AppError::PartialCommitFailure {
                        reference,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    async fn converge(&self, existing: Order) -> Result<CommitOutcome> {
        let resolution = match existing.status {
            OrderStatus::TicketsIssuing => self.guard.await_settled(&existing.reference).await?,
            OrderStatus::Success => Resolution::AlreadyFinalized(self.guard.finalized(existing).await?),
            OrderStatus::Failed => Resolution::Failed(existing),
            OrderStatus::Pending => Resolution::Pending(existing),
        };

        Ok(match resolution {
            Resolution::AlreadyFinalized(finalized) => CommitOutcome::AlreadyFinalized(finalized),
            Resolution::Failed(order) => CommitOutcome::Failed(order),
            Resolution::InProgress(order) | Resolution::Pending(order) => CommitOutcome::InProgress(order),
            Resolution::NotFound => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "order vanished after losing the claim"
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinalizationSettings;
    use crate::models::{CustomerSnapshot, LineItem, OrderMetadata, OrderTotals};
    use crate::repositories::{InMemoryOrderStore, TicketInsertFault};
    use rust_decimal_macros::dec;

    fn metadata(quantity: u32) -> OrderMetadata {
        OrderMetadata {
            customer: CustomerSnapshot {
                name: "Ada Obi".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            items: vec![LineItem {
                event_id: "evt-1".to_string(),
                event_title: "Jazz Night".to_string(),
                tier_name: "Regular".to_string(),
                quantity,
                unit_price: dec!(1000),
            }],
            totals: OrderTotals {
                subtotal: dec!(1000),
                fee: dec!(0),
                vat: dec!(0),
                total: dec!(1000),
            },
            expected_amount: 100000,
            currency: "NGN".to_string(),
        }
    }

    fn coordinator(store: Arc<InMemoryOrderStore>) -> PersistenceCoordinator {
        let settings = FinalizationSettings {
            settle_timeout_ms: 50,
            settle_poll_interval_ms: 5,
            max_tickets_per_order: 100,
        };
        let guard = Arc::new(IdempotencyGuard::new(store.clone(), &settings));
        PersistenceCoordinator::new(store, guard, OrderAssembler::default())
    }

    fn candidate(reference: &str, quantity: u32) -> (Order, Vec<Ticket>) {
        let mut order = Order::pending(reference, &metadata(quantity)).unwrap();
        order.amount_charged = Some(100000);
        let tickets = OrderAssembler::default().tickets_for(&order).unwrap();
        (order, tickets)
    }

    #[tokio::test]
    async fn test_commit_finalizes_fresh_reference() {
        let store = Arc::new(InMemoryOrderStore::new());
        let (order, tickets) = candidate("TIX_FRESH", 2);

        let outcome = coordinator(store.clone()).commit(order, tickets).await.unwrap();
        let CommitOutcome::Finalized(finalized) = outcome else {
            panic!("expected finalized outcome");
        };

        assert_eq!(finalized.order.status, OrderStatus::Success);
        assert_eq!(finalized.tickets.len(), 2);
        assert_eq!(store.total_ticket_count().await, 2);
    }

    #[tokio::test]
    async fn test_commit_adopts_pending_row_id() {
        let store = Arc::new(InMemoryOrderStore::new());
        let pending = store
            .insert_pending(&Order::pending("TIX_PENDING", &metadata(2)).unwrap())
            .await
            .unwrap();
        let (order, tickets) = candidate("TIX_PENDING", 2);

        let CommitOutcome::Finalized(finalized) =
            coordinator(store.clone()).commit(order, tickets).await.unwrap()
        else {
            panic!("expected finalized outcome");
        };

        assert_eq!(finalized.order.id, pending.id);
        assert!(finalized.tickets.iter().all(|t| t.order_id == pending.id));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_insert_never_reaches_success() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.inject_ticket_fault(TicketInsertFault::StoreFirst(1)).await;
        let (order, tickets) = candidate("TIX_FAULT", 3);

        let err = coordinator(store.clone()).commit(order, tickets).await.unwrap_err();
        assert!(matches!(err, AppError::PartialCommitFailure { .. }));

        let stored = store.find_by_reference("TIX_FAULT").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::TicketsIssuing);
    }

    #[tokio::test]
    async fn test_resume_inserts_only_missing_indices() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.inject_ticket_fault(TicketInsertFault::StoreFirst(1)).await;
        let coordinator = coordinator(store.clone());
        let (order, tickets) = candidate("TIX_RESUME", 3);
        coordinator.commit(order, tickets).await.unwrap_err();

        let parked = store.find_by_reference("TIX_RESUME").await.unwrap().unwrap();
        let (finalized, inserted) = coordinator.resume(&parked).await.unwrap();

        assert_eq!(inserted, vec![2, 3]);
        let indices: Vec<i32> = finalized.tickets.iter().map(|t| t.sequence_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(finalized.order.status, OrderStatus::Success);
    }

    #[tokio::test]
    async fn test_losing_commit_returns_winner() {
        let store = Arc::new(InMemoryOrderStore::new());
        let coordinator = coordinator(store.clone());

        let (first, first_tickets) = candidate("TIX_TWICE", 1);
        let CommitOutcome::Finalized(winner) = coordinator.commit(first, first_tickets).await.unwrap() else {
            panic!("first commit should finalize");
        };

        let (second, second_tickets) = candidate("TIX_TWICE", 1);
        let CommitOutcome::AlreadyFinalized(seen) = coordinator.commit(second, second_tickets).await.unwrap() else {
            panic!("second commit should converge");
        };

        assert_eq!(seen.order.id, winner.order.id);
        assert_eq!(seen.tickets[0].code, winner.tickets[0].code);
        assert_eq!(store.total_ticket_count().await, 1);
    }
}
