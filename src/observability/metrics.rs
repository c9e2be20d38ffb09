use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the finalization pipeline.
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    /// One finalization attempt, labelled by entry point and outcome
    /// (`finalized`, `already_finalized`, `in_progress`, `rejected`, `error`).
    pub fn record_finalization(&self, trigger: &str, outcome: &str) {
        counter!("finalization_attempts_total", "trigger" => trigger.to_string(), "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_lost_race(&self, trigger: &str) {
        counter!("finalization_lost_races_total", "trigger" => trigger.to_string()).increment(1);
    }

    pub fn record_fraud_mismatch(&self, trigger: &str) {
        counter!("finalization_fraud_mismatches_total", "trigger" => trigger.to_string()).increment(1);
    }

    pub fn record_partial_commit(&self) {
        counter!("finalization_partial_commits_total").increment(1);
    }

    pub fn record_commit_latency(&self, duration_ms: f64) {
        histogram!("finalization_commit_duration_ms").record(duration_ms);
    }

    pub fn record_tickets_issued(&self, count: u64) {
        counter!("finalization_tickets_issued_total").increment(count);
    }

    pub fn record_gateway_verify(&self, duration_ms: f64, success: bool) {
        counter!("gateway_verify_total", "success" => success.to_string()).increment(1);
        histogram!("gateway_verify_duration_ms").record(duration_ms);
    }

    pub fn record_webhook(&self, provider: &str, outcome: &str) {
        counter!("webhook_deliveries_total", "provider" => provider.to_string(), "outcome" => outcome.to_string()).increment(1);
    }

    /// `kind` is `repair` for success orders with missing tickets, `resume`
    /// for orders parked in issuing.
    pub fn record_auditor_repair(&self, kind: &str, tickets_inserted: u64) {
        counter!("auditor_repairs_total", "kind" => kind.to_string()).increment(1);
        counter!("auditor_tickets_inserted_total", "kind" => kind.to_string()).increment(tickets_inserted);
    }

    pub fn set_broken_orders(&self, count: usize) {
        gauge!("auditor_broken_orders").set(count as f64);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        counter!("finalized_cache_lookups_total", "hit" => hit.to_string()).increment(1);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }

    pub fn record_kafka_message(&self, topic: &str, success: bool) {
        counter!("kafka_messages_total", "topic" => topic.to_string(), "success" => success.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder once and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    METRICS.get_or_init(Metrics::new);

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

fn describe_metrics() {
    describe_counter!("finalization_attempts_total", Unit::Count, "Finalization attempts by trigger and outcome");
    describe_counter!("finalization_lost_races_total", Unit::Count, "Claims lost to a concurrent finalizer");
    describe_counter!("finalization_fraud_mismatches_total", Unit::Count, "Payments rejected for amount mismatch");
    describe_counter!("finalization_partial_commits_total", Unit::Count, "Ticket issuance attempts left incomplete");
    describe_histogram!("finalization_commit_duration_ms", Unit::Milliseconds, "Ticket issuance commit latency in milliseconds");
    describe_counter!("finalization_tickets_issued_total", Unit::Count, "Tickets durably stored");

    describe_counter!("gateway_verify_total", Unit::Count, "Gateway verification calls");
    describe_histogram!("gateway_verify_duration_ms", Unit::Milliseconds, "Gateway verification latency in milliseconds");
    describe_counter!("webhook_deliveries_total", Unit::Count, "Webhook deliveries by outcome");

    describe_counter!("auditor_repairs_total", Unit::Count, "Orders repaired by the reconciliation auditor");
    describe_counter!("auditor_tickets_inserted_total", Unit::Count, "Tickets inserted by the reconciliation auditor");
    describe_gauge!("auditor_broken_orders", Unit::Count, "Success orders with missing tickets at last scan");

    describe_counter!("finalized_cache_lookups_total", Unit::Count, "Finalized order cache lookups");
    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
    describe_counter!("kafka_messages_total", Unit::Count, "Total Kafka messages");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
