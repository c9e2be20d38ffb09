use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::FinalizedOrderCache;
use crate::config::AuditorSettings;
use crate::error::{AppError, Result};
use crate::events::{publish_best_effort, EventProducer, OrderFinalizedEvent, TicketsRepairedEvent};
use crate::models::{FinalizationTrigger, Order, OrderStatus};
use crate::observability::get_metrics;
use crate::repositories::OrderStore;
use crate::services::{OrderAssembler, PersistenceCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairKind {
    /// `SUCCESS` order with missing tickets.
    Repair,
    /// Order parked in `TICKETS_ISSUING` driven to `SUCCESS`.
    Resume,
}

impl RepairKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairKind::Repair => "repair",
            RepairKind::Resume => "resume",
        }
    }
}

/// What one repair changed.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub order_id: Uuid,
    pub reference: String,
    pub kind: RepairKind,
    pub inserted_indices: Vec<i32>,
    pub ticket_count: i64,
    pub ticket_quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairFailure {
    pub order_id: Uuid,
    pub reference: String,
    pub error: String,
}

/// Summary of one auditor pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub broken_found: usize,
    pub repaired: Vec<RepairReport>,
    pub resumed: Vec<RepairReport>,
    pub failures: Vec<RepairFailure>,
}

/// Finds and repairs orders whose ticket set is incomplete.
pub struct ReconciliationAuditor {
    store: Arc<dyn OrderStore>,
    coordinator: Arc<PersistenceCoordinator>,
    assembler: OrderAssembler,
    settings: AuditorSettings,
    producer: Option<Arc<EventProducer>>,
    cache: Option<Arc<FinalizedOrderCache>>,
}

impl ReconciliationAuditor {
    pub fn new(
        store: Arc<dyn OrderStore>,
        coordinator: Arc<PersistenceCoordinator>,
        assembler: OrderAssembler,
        settings: AuditorSettings,
    ) -> Self {
        Self {
            store,
            coordinator,
            assembler,
            settings,
            producer: None,
            cache: None,
        }
    }

    pub fn with_producer(mut self, producer: Arc<EventProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn with_cache(mut self, cache: Arc<FinalizedOrderCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Ids of `SUCCESS` orders with fewer stored tickets than owed.
    pub async fn scan(&self) -> Result<Vec<Uuid>> {
        Ok(self.broken_orders().await?.into_iter().map(|o| o.id).collect())
    }

    async fn broken_orders(&self) -> Result<Vec<Order>> {
        let broken = self
            .store
            .find_incomplete_success(self.settings.batch_limit)
            .await?;

        get_metrics().set_broken_orders(broken.len());
        if !broken.is_empty() {
            tracing::warn!(count = broken.len(), "Found success orders with missing tickets");
        }

        Ok(broken)
    }

    /// Inserts the missing tickets of one order.
    ///
    /// A `SUCCESS` order gets its gaps filled in place; an order still in
    /// `TICKETS_ISSUING` is resumed through the coordinator so it only
    /// reaches `SUCCESS` once complete.
    pub async fn repair(&self, order_id: Uuid) -> Result<RepairReport> {
        let order = self
            .store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order '{}'", order_id)))?;

        OrderAssembler::check_consistency(&order)?;

        let report = match order.status {
            OrderStatus::Success => self.fill_gaps(&order).await?,
            OrderStatus::TicketsIssuing => self.resume(&order).await?,
            other => {
                return Err(AppError::Validation(format!(
                    "order {} is {} and has no tickets owed",
                    order.reference,
                    other.as_str()
                )))
            }
        };

        if let Some(cache) = &self.cache {
            cache.invalidate(&order.reference).await;
        }

        if !report.inserted_indices.is_empty() {
            get_metrics().record_auditor_repair(report.kind.as_str(), report.inserted_indices.len() as u64);
            tracing::warn!(
                reference = %report.reference,
                order_id = %report.order_id,
                kind = report.kind.as_str(),
                inserted = ?report.inserted_indices,
                ticket_count = report.ticket_count,
                ticket_quantity = report.ticket_quantity,
                "Auditor inserted missing tickets"
            );
            publish_best_effort(
                self.producer.as_deref(),
                TicketsRepairedEvent {
                    order_id: report.order_id,
                    reference: report.reference.clone(),
                    inserted_indices: report.inserted_indices.clone(),
                    ticket_count: report.ticket_count,
                    repaired_at: Utc::now(),
                },
            )
            .await;
        }

        Ok(report)
    }

    async fn fill_gaps(&self, order: &Order) -> Result<RepairReport> {
        let stored = self.store.tickets_for_order(order.id).await?;
        let missing = self.assembler.missing_tickets(order, &stored)?;
        let indices: Vec<i32> = missing.iter().map(|t| t.sequence_index).collect();

        if !missing.is_empty() {
            self.store.insert_tickets(&missing).await?;
        }

        let ticket_count = self.store.count_tickets(order.id).await?;
        if ticket_count < order.ticket_quantity as i64 {
            return Err(AppError::PartialCommitFailure {
                reference: order.reference.clone(),
                reason: format!(
                    "repair stored {} of {} tickets",
                    ticket_count, order.ticket_quantity
                ),
            });
        }

        Ok(RepairReport {
            order_id: order.id,
            reference: order.reference.clone(),
            kind: RepairKind::Repair,
            inserted_indices: indices,
            ticket_count,
            ticket_quantity: order.ticket_quantity,
        })
    }

    async fn resume(&self, order: &Order) -> Result<RepairReport> {
        let (finalized, indices) = self.coordinator.resume(order).await?;

        publish_best_effort(
            self.producer.as_deref(),
            OrderFinalizedEvent::from_finalized(&finalized, FinalizationTrigger::Reconciliation),
        )
        .await;

        Ok(RepairReport {
            order_id: finalized.order.id,
            reference: finalized.order.reference.clone(),
            kind: RepairKind::Resume,
            inserted_indices: indices,
            ticket_count: finalized.tickets.len() as i64,
            ticket_quantity: finalized.order.ticket_quantity,
        })
    }

    /// Resumes orders parked in `TICKETS_ISSUING` past the grace period.
    pub async fn sweep_issuing(&self) -> Result<AuditReport> {
        let cutoff = Utc::now() - Duration::seconds(self.settings.grace_period_secs);
        let stale = self
            .store
            .find_stale_issuing(cutoff, self.settings.batch_limit)
            .await?;

        let mut report = AuditReport::default();
        for order in stale {
            match self.repair(order.id).await {
                Ok(repaired) => report.resumed.push(repaired),
                Err(e) => report.failures.push(self.failure(&order, e)),
            }
        }
        Ok(report)
    }

    /// Scans and repairs every broken success order.
    pub async fn repair_all(&self) -> Result<AuditReport> {
        let broken = self.broken_orders().await?;
        let mut report = AuditReport {
            broken_found: broken.len(),
            ..AuditReport::default()
        };

        for order in broken {
            match self.repair(order.id).await {
                Ok(repaired) => report.repaired.push(repaired),
                Err(e) => report.failures.push(self.failure(&order, e)),
            }
        }
        Ok(report)
    }

    /// One full pass: sweep stale issuing orders, then repair success orders.
    pub async fn run_once(&self) -> Result<AuditReport> {
        let swept = self.sweep_issuing().await?;
        let mut report = self.repair_all().await?;
        report.resumed = swept.resumed;
        report.failures.extend(swept.failures);
        Ok(report)
    }

    fn failure(&self, order: &Order, error: AppError) -> RepairFailure {
        tracing::error!(
            reference = %order.reference,
            order_id = %order.id,
            "Auditor repair failed: {}",
            error
        );
        RepairFailure {
            order_id: order.id,
            reference: order.reference.clone(),
            error: error.to_string(),
        }
    }
}

/// Runs the auditor on a fixed interval inside the server.
pub struct ReconciliationJob {
    auditor: Arc<ReconciliationAuditor>,
    interval_seconds: u64,
}

impl ReconciliationJob {
    pub fn new(auditor: Arc<ReconciliationAuditor>, interval_seconds: u64) -> Self {
        Self {
            auditor,
            interval_seconds,
        }
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(self.interval_seconds.max(1)));

            loop {
                interval.tick().await;

                match self.auditor.run_once().await {
                    Ok(report) => {
                        let touched = report.repaired.len() + report.resumed.len();
                        if touched > 0 || !report.failures.is_empty() {
                            tracing::info!(
                                repaired = report.repaired.len(),
                                resumed = report.resumed.len(),
                                failures = report.failures.len(),
                                "Reconciliation pass finished"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!("Reconciliation pass failed: {}", e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinalizationSettings;
    use crate::idempotency::IdempotencyGuard;
    use crate::models::{CustomerSnapshot, LineItem, OrderMetadata, OrderTotals};
    use crate::repositories::InMemoryOrderStore;
    use rust_decimal_macros::dec;

    fn order(reference: &str, quantity: u32) -> Order {
        let metadata = OrderMetadata {
            customer: CustomerSnapshot {
                name: "Ada Obi".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            items: vec![LineItem {
                event_id: "evt-9".to_string(),
                event_title: "Afrobeats Live".to_string(),
                tier_name: "Regular".to_string(),
                quantity,
                unit_price: dec!(500),
            }],
            totals: OrderTotals {
                subtotal: dec!(500) * rust_decimal::Decimal::from(quantity),
                fee: dec!(0),
                vat: dec!(0),
                total: dec!(500) * rust_decimal::Decimal::from(quantity),
            },
            expected_amount: 50000 * quantity as i64,
            currency: "NGN".to_string(),
        };
        let mut order = Order::pending(reference, &metadata).unwrap();
        order.begin_issuing(metadata.expected_amount);
        order
    }

    fn auditor(store: Arc<InMemoryOrderStore>) -> ReconciliationAuditor {
        let guard = Arc::new(IdempotencyGuard::new(store.clone(), &FinalizationSettings::default()));
        let coordinator = Arc::new(PersistenceCoordinator::new(
            store.clone(),
            guard,
            OrderAssembler::default(),
        ));
        ReconciliationAuditor::new(
            store,
            coordinator,
            OrderAssembler::default(),
            AuditorSettings {
                grace_period_secs: 0,
                ..AuditorSettings::default()
            },
        )
    }

    async fn seed_success(store: &InMemoryOrderStore, reference: &str, quantity: u32, keep: usize) -> Order {
        let mut order = order(reference, quantity);
        let tickets = OrderAssembler::default().tickets_for(&order).unwrap();
        order.mark_success();
        store.force_insert_order(order.clone()).await;
        store.insert_tickets(&tickets).await.unwrap();
        store.delete_tickets(order.id, keep).await;
        order
    }

    #[tokio::test]
    async fn test_scan_finds_only_incomplete_orders() {
        let store = Arc::new(InMemoryOrderStore::new());
        let broken = seed_success(&store, "TIX_BROKEN", 4, 1).await;
        seed_success(&store, "TIX_WHOLE", 2, 2).await;

        let found = auditor(store).scan().await.unwrap();
        assert_eq!(found, vec![broken.id]);
    }

    #[tokio::test]
    async fn test_repair_fills_missing_indices_only() {
        let store = Arc::new(InMemoryOrderStore::new());
        let broken = seed_success(&store, "TIX_GAP", 4, 1).await;
        let original = store.tickets_for_order(broken.id).await.unwrap();

        let report = auditor(store.clone()).repair(broken.id).await.unwrap();
        assert_eq!(report.kind, RepairKind::Repair);
        assert_eq!(report.inserted_indices, vec![2, 3, 4]);
        assert_eq!(report.ticket_count, 4);

        let tickets = store.tickets_for_order(broken.id).await.unwrap();
        let indices: Vec<i32> = tickets.iter().map(|t| t.sequence_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert_eq!(tickets[0].code, original[0].code);
    }

    #[tokio::test]
    async fn test_repair_of_complete_order_is_noop() {
        let store = Arc::new(InMemoryOrderStore::new());
        let whole = seed_success(&store, "TIX_DONE", 3, 3).await;

        let report = auditor(store.clone()).repair(whole.id).await.unwrap();
        assert!(report.inserted_indices.is_empty());
        assert_eq!(store.total_ticket_count().await, 3);
    }

    #[tokio::test]
    async fn test_repair_rejects_pending_order() {
        let store = Arc::new(InMemoryOrderStore::new());
        let mut pending = order("TIX_WAIT", 1);
        pending.status = OrderStatus::Pending;
        store.force_insert_order(pending.clone()).await;

        let err = auditor(store).repair(pending.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_run_once_resumes_stale_issuing_order() {
        let store = Arc::new(InMemoryOrderStore::new());
        let parked = order("TIX_PARKED", 3);
        let tickets = OrderAssembler::default().tickets_for(&parked).unwrap();
        store.force_insert_order(parked.clone()).await;
        store.insert_tickets(&tickets[..1]).await.unwrap();

        let report = auditor(store.clone()).run_once().await.unwrap();
        assert_eq!(report.resumed.len(), 1);
        assert_eq!(report.resumed[0].inserted_indices, vec![2, 3]);
        assert!(report.failures.is_empty());

        let stored = store.find_by_id(parked.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Success);
        assert_eq!(store.count_tickets(parked.id).await.unwrap(), 3);
    }
}
