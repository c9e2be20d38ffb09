pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{ComponentHealth, HealthChecker, HealthReport, HealthStatus};
pub use logging::{init_logging, mask_email, mask_sensitive, LogConfig, LogFormat};
pub use metrics::{get_metrics, init_metrics, LatencyTimer, Metrics, METRICS};
