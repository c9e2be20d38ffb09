use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::FinalizedOrderCache;
use crate::events::EventProducer;
use crate::services::ReconciliationAuditor;

/// Ordered from best to worst so a report can take the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Check result for one component the pipeline depends on.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub component: &'static str,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    pub fn up(component: &'static str, latency_ms: f64) -> Self {
        Self {
            component,
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            detail: None,
        }
    }

    pub fn degraded(component: &'static str, detail: impl Into<String>) -> Self {
        Self {
            component,
            status: HealthStatus::Degraded,
            latency_ms: None,
            detail: Some(detail.into()),
        }
    }

    pub fn down(component: &'static str, detail: impl Into<String>) -> Self {
        Self {
            component,
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    /// The overall status is the worst component status.
    pub fn new(version: impl Into<String>, uptime_seconds: u64, components: Vec<ComponentHealth>) -> Self {
        let status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            version: version.into(),
            uptime_seconds,
            components,
        }
    }
}

/// Checks the order store, the optional cache and event bus, and the
/// reconciliation backlog.
///
/// Only the order store can make the service unhealthy. Everything else
/// is optional to finalization and at worst degrades it.
pub struct HealthChecker {
    pool: PgPool,
    cache: Option<Arc<FinalizedOrderCache>>,
    producer: Option<Arc<EventProducer>>,
    auditor: Option<Arc<ReconciliationAuditor>>,
    check_timeout: Duration,
    slow_store_ms: f64,
    started: Instant,
}

impl HealthChecker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: None,
            producer: None,
            auditor: None,
            check_timeout: Duration::from_secs(5),
            slow_store_ms: 100.0,
            started: Instant::now(),
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<FinalizedOrderCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_producer(mut self, producer: Option<Arc<EventProducer>>) -> Self {
        self.producer = producer;
        self
    }

    pub fn with_auditor(mut self, auditor: Arc<ReconciliationAuditor>) -> Self {
        self.auditor = Some(auditor);
        self
    }

    pub async fn check_all(&self) -> HealthReport {
        let (store, cache, reconciliation) = tokio::join!(
            self.check_order_store(),
            self.check_cache(),
            self.check_reconciliation(),
        );

        HealthReport::new(
            env!("CARGO_PKG_VERSION"),
            self.uptime_seconds(),
            vec![store, cache, self.check_event_bus(), reconciliation],
        )
    }

    pub async fn check_order_store(&self) -> ComponentHealth {
        let start = Instant::now();
        let query = sqlx::query("SELECT 1").fetch_one(&self.pool);

        match tokio::time::timeout(self.check_timeout, query).await {
            Ok(Ok(_)) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                if latency > self.slow_store_ms {
                    ComponentHealth {
                        detail: Some(format!("slow response: {:.0}ms", latency)),
                        status: HealthStatus::Degraded,
                        ..ComponentHealth::up("order_store", latency)
                    }
                } else {
                    ComponentHealth::up("order_store", latency)
                }
            }
            Ok(Err(e)) => ComponentHealth::down("order_store", format!("query failed: {}", e)),
            Err(_) => ComponentHealth::down("order_store", "query timed out"),
        }
    }

    pub async fn check_cache(&self) -> ComponentHealth {
        let Some(cache) = &self.cache else {
            return ComponentHealth::degraded("finalized_cache", "disabled");
        };

        let start = Instant::now();
        match tokio::time::timeout(self.check_timeout, cache.ping()).await {
            Ok(Ok(())) => ComponentHealth::up("finalized_cache", start.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(e)) => ComponentHealth::degraded("finalized_cache", format!("ping failed: {}", e)),
            Err(_) => ComponentHealth::degraded("finalized_cache", "ping timed out"),
        }
    }

    pub fn check_event_bus(&self) -> ComponentHealth {
        match &self.producer {
            Some(producer) if producer.is_connected() => ComponentHealth::up("event_bus", 0.0),
            Some(_) => ComponentHealth::degraded("event_bus", "not connected"),
            None => ComponentHealth::degraded("event_bus", "disabled"),
        }
    }

    /// Finalized orders still missing tickets degrade the service until the
    /// auditor repairs them.
    pub async fn check_reconciliation(&self) -> ComponentHealth {
        let Some(auditor) = &self.auditor else {
            return ComponentHealth::degraded("reconciliation", "auditor not attached");
        };

        let start = Instant::now();
        match tokio::time::timeout(self.check_timeout, auditor.scan()).await {
            Ok(Ok(broken)) if broken.is_empty() => {
                ComponentHealth::up("reconciliation", start.elapsed().as_secs_f64() * 1000.0)
            }
            Ok(Ok(broken)) => ComponentHealth::degraded(
                "reconciliation",
                format!("{} finalized orders missing tickets", broken.len()),
            ),
            Ok(Err(e)) => ComponentHealth::degraded("reconciliation", format!("scan failed: {}", e)),
            Err(_) => ComponentHealth::degraded("reconciliation", "scan timed out"),
        }
    }

    /// Ready once the order store answers.
    pub async fn is_ready(&self) -> bool {
        self.check_order_store().await.status.is_healthy()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
