use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub kafka: KafkaSettings,
    pub application: ApplicationSettings,
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub finalization: FinalizationSettings,
    #[serde(default)]
    pub auditor: AuditorSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    #[serde(default)]
    pub enabled: bool,
    pub brokers: String,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub base_url: String,
    pub secret_key: String,
    /// HMAC key for webhook deliveries. Paystack signs with the secret key, so
    /// an empty value falls back to it.
    #[serde(default)]
    pub webhook_secret: String,
    pub timeout_secs: u64,
}

impl GatewaySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn effective_webhook_secret(&self) -> &str {
        if self.webhook_secret.is_empty() {
            &self.secret_key
        } else {
            &self.webhook_secret
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinalizationSettings {
    /// How long a caller that lost the claim waits for the winner to settle.
    pub settle_timeout_ms: u64,
    pub settle_poll_interval_ms: u64,
    /// Orders owing more tickets than this are rejected before any write.
    #[serde(default = "default_max_tickets_per_order")]
    pub max_tickets_per_order: u32,
}

fn default_max_tickets_per_order() -> u32 {
    100
}

impl Default for FinalizationSettings {
    fn default() -> Self {
        Self {
            settle_timeout_ms: 5_000,
            settle_poll_interval_ms: 100,
            max_tickets_per_order: default_max_tickets_per_order(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditorSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Orders parked in TICKETS_ISSUING longer than this are resumed.
    pub grace_period_secs: i64,
    pub batch_limit: i64,
}

impl Default for AuditorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            grace_period_secs: 120,
            batch_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    pub key_prefix: String,
    pub ttl_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "finalization".to_string(),
            ttl_seconds: 3600,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
