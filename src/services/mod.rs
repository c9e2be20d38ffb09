pub mod finalization_service;
pub mod fraud_validator;
pub mod order_assembler;
pub mod persistence_coordinator;
pub mod reconciliation_auditor;

pub use finalization_service::{validate_reference, FinalizationOutcome, FinalizationService, WebhookAck};
pub use fraud_validator::{FraudCheck, FraudValidator};
pub use order_assembler::OrderAssembler;
pub use persistence_coordinator::{CommitOutcome, PersistenceCoordinator};
pub use reconciliation_auditor::{
    AuditReport, ReconciliationAuditor, ReconciliationJob, RepairFailure, RepairKind, RepairReport,
};

use std::sync::Arc;
use std::time::Duration;

use crate::cache::FinalizedOrderCache;
use crate::config::{AuditorSettings, FinalizationSettings};
use crate::events::EventProducer;
use crate::gateway::{PaymentGateway, WebhookVerifier};
use crate::idempotency::IdempotencyGuard;
use crate::repositories::OrderStore;

/// The finalization service and auditor wired over one store.
pub struct Pipeline {
    pub finalization: Arc<FinalizationService>,
    pub auditor: Arc<ReconciliationAuditor>,
}

/// Assembles a [`Pipeline`]; cache and producer are optional.
pub struct PipelineBuilder {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
    gateway_timeout: Duration,
    finalization: FinalizationSettings,
    auditor: AuditorSettings,
    assembler: OrderAssembler,
    cache: Option<Arc<FinalizedOrderCache>>,
    producer: Option<Arc<EventProducer>>,
}

impl PipelineBuilder {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            verifier,
            gateway_timeout,
            finalization: FinalizationSettings::default(),
            auditor: AuditorSettings::default(),
            assembler: OrderAssembler::default(),
            cache: None,
            producer: None,
        }
    }

    pub fn finalization_settings(mut self, settings: FinalizationSettings) -> Self {
        self.finalization = settings;
        self
    }

    pub fn auditor_settings(mut self, settings: AuditorSettings) -> Self {
        self.auditor = settings;
        self
    }

    pub fn assembler(mut self, assembler: OrderAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn cache(mut self, cache: Option<Arc<FinalizedOrderCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn producer(mut self, producer: Option<Arc<EventProducer>>) -> Self {
        self.producer = producer;
        self
    }

    pub fn build(self) -> Pipeline {
        let mut guard = IdempotencyGuard::new(self.store.clone(), &self.finalization);
        if let Some(cache) = &self.cache {
            guard = guard.with_cache(cache.clone());
        }
        let guard = Arc::new(guard);

        let coordinator = Arc::new(PersistenceCoordinator::new(
            self.store.clone(),
            guard.clone(),
            self.assembler.clone(),
        ));

        let mut finalization = FinalizationService::new(
            self.store.clone(),
            guard,
            coordinator.clone(),
            self.assembler.clone(),
            self.gateway,
            self.verifier,
            self.gateway_timeout,
        )
        .with_ticket_limit(self.finalization.max_tickets_per_order);
        let mut auditor =
            ReconciliationAuditor::new(self.store, coordinator, self.assembler, self.auditor);

        if let Some(producer) = self.producer {
            finalization = finalization.with_producer(producer.clone());
            auditor = auditor.with_producer(producer);
        }
        if let Some(cache) = self.cache {
            auditor = auditor.with_cache(cache);
        }

        Pipeline {
            finalization: Arc::new(finalization),
            auditor: Arc::new(auditor),
        }
    }
}
